//! Reconciliation passes driving an [`ObjectLifecycle`] through create, update and finalize
use crate::{
    client::{ClientError, ObjectClient},
    filter::SharedBlocklist,
    lifecycle::{Capabilities, HookFailure, HookResult, ObjectLifecycle},
};
use futures::{future::BoxFuture, FutureExt};
use lifecycle_core::{Resource, ResourceExt};
use std::{error::Error as StdError, fmt::Debug, sync::Arc};
use thiserror::Error;
use tracing::Instrument;

/// Prefix of the annotation recording that `create` has run, followed by `.<adapter name>`
pub const CREATE_ANNOTATION_PREFIX: &str = "lifecycle.cattle.io/create";
/// Prefix of the finalizer of a namespaced adapter
pub const FINALIZER_PREFIX: &str = "controller.cattle.io/";
/// Prefix of the finalizer of a cluster-scoped adapter
pub const SCOPED_FINALIZER_PREFIX: &str = "clusterscoped.controller.cattle.io/";

const REMOVE_FINALIZER_ATTEMPTS: usize = 3;

/// Errors that end a reconciliation pass
///
/// Hook errors are passed through as [`Error::CreateFailed`], [`Error::UpdatedFailed`]
/// and [`Error::FinalizeFailed`]. The remaining variants are failed writes, named after
/// the bookkeeping the adapter was doing at the time.
#[derive(Debug, Error)]
pub enum Error<HookErr>
where
    HookErr: StdError + 'static,
{
    /// The object cannot be written back because it has no name
    #[error("object has no name")]
    Access,
    /// The create hook failed; the object stays uninitialized
    #[error("failed to create object: {0}")]
    CreateFailed(#[source] HookErr),
    /// The updated hook failed
    #[error("failed to update object: {0}")]
    UpdatedFailed(#[source] HookErr),
    /// The finalize hook failed; the finalizer is kept
    #[error("failed to finalize object: {0}")]
    FinalizeFailed(#[source] HookErr),
    /// Writing a hook's changes failed
    #[error("failed to persist object: {0}")]
    Persist(#[source] ClientError),
    /// Writing the finalizer failed
    #[error("failed to add finalizer: {0}")]
    AddFinalizer(#[source] ClientError),
    /// Writing the initialization annotation failed
    #[error("updating lifecycle annotation {annotation}: {source}")]
    SetInitialized {
        /// The annotation being written
        annotation: String,
        /// The failed write
        #[source]
        source: ClientError,
    },
    /// Reading the object back after a failed finalizer release failed
    #[error("failed to refetch object while removing finalizer: {0}")]
    Refetch(#[source] ClientError),
    /// Every attempt to release the finalizer failed
    #[error("failed to remove finalizer on {finalizer}: {source}")]
    ExhaustedRetries {
        /// The finalizer that is still present
        finalizer: String,
        /// The failed write of the last attempt
        #[source]
        source: ClientError,
    },
}

impl<HookErr: StdError + 'static> Error<HookErr> {
    /// Whether the pass failed because the object changed in the store underneath it
    ///
    /// Such passes can be retried as soon as the newer object has been observed.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Persist(err) | Self::AddFinalizer(err) | Self::Refetch(err) => err.is_conflict(),
            Self::SetInitialized { source, .. } | Self::ExhaustedRetries { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Hook {
    Create,
    Updated,
    Finalize,
}

impl Hook {
    fn failed<E: StdError + 'static>(self, err: E) -> Error<E> {
        match self {
            Self::Create => Error::CreateFailed(err),
            Self::Updated => Error::UpdatedFailed(err),
            Self::Finalize => Error::FinalizeFailed(err),
        }
    }
}

/// Where a phase leaves the pass
enum Step<K> {
    /// Carry on with the next phase using this object
    Continue(Arc<K>),
    /// The pass is over
    Done(Option<Arc<K>>),
}

/// Runs an [`ObjectLifecycle`] against each observed version of an object
///
/// Every pass walks the same phases, halting at the first one that has work to do:
///
/// 1. Objects in a disallowed namespace (see [`SharedBlocklist`]) are returned untouched.
/// 2. Objects marked for deletion that carry this adapter's finalizer are handed to
///    [`finalize`](ObjectLifecycle::finalize), after which the finalizer is released so the
///    store can finish the delete. If the finalizer is already gone, the pass does nothing.
/// 3. Objects not yet annotated as initialized get the finalizer added, are handed to
///    [`create`](ObjectLifecycle::create), and are then annotated so `create` never runs again.
/// 4. Everything else is handed to [`updated`](ObjectLifecycle::updated).
///
/// Hooks work on private copies; whatever they hand back is written to the store only
/// when it differs from the object the pass started with.
///
/// # Assumptions
///
/// The adapter name must be unique among the adapters handling the same objects,
/// since it determines both the finalizer and the initialization annotation.
///
/// At most one pass per object is in flight at a time. The resource version is the only
/// concurrency control: passes surface write conflicts as errors, except while releasing
/// the finalizer, which is retried against a freshly read object.
pub struct ObjectLifecycleAdapter<K, L, C> {
    name: String,
    cluster_scoped: bool,
    capabilities: Capabilities,
    blocklist: SharedBlocklist,
    lifecycle: L,
    client: C,
    _object: std::marker::PhantomData<fn() -> K>,
}

impl<K, L, C> ObjectLifecycleAdapter<K, L, C>
where
    K: Resource + Clone + PartialEq + Debug + Send + Sync + 'static,
    L: ObjectLifecycle<K>,
    C: ObjectClient<K>,
{
    /// Create an adapter named `name` running `lifecycle` and writing through `client`
    ///
    /// Cluster-scoped adapters use a distinct finalizer so they never release a
    /// namespaced adapter's finalizer of the same name.
    pub fn new(name: &str, cluster_scoped: bool, lifecycle: L, client: C) -> Self {
        Self {
            name: name.to_string(),
            cluster_scoped,
            capabilities: Capabilities::default(),
            blocklist: SharedBlocklist::default(),
            lifecycle,
            client,
            _object: std::marker::PhantomData,
        }
    }

    /// Declare which optional hooks the lifecycle implements
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Skip objects matching a shared block-list
    #[must_use]
    pub fn with_blocklist(mut self, blocklist: SharedBlocklist) -> Self {
        self.blocklist = blocklist;
        self
    }

    /// The finalizer guarding deletion of reconciled objects
    pub fn finalizer_key(&self) -> String {
        if self.cluster_scoped {
            format!("{SCOPED_FINALIZER_PREFIX}{}", self.name)
        } else {
            format!("{FINALIZER_PREFIX}{}", self.name)
        }
    }

    /// The annotation marking objects that `create` has run for
    pub fn annotation_key(&self) -> String {
        format!("{CREATE_ANNOTATION_PREFIX}.{}", self.name)
    }

    /// Run one reconciliation pass
    ///
    /// `key` only identifies the object in traces. `None` means the object is gone from
    /// the store, which needs no work.
    ///
    /// Returns the object as last written or observed, or `None` when the pass stopped
    /// because another owner is finishing a delete.
    pub async fn reconcile(
        &self,
        key: &str,
        obj: Option<Arc<K>>,
    ) -> Result<Option<Arc<K>>, Error<L::Error>> {
        let Some(obj) = obj else {
            return Ok(None);
        };
        let span = tracing::info_span!("reconcile", adapter = %self.name, key);
        self.run(obj).instrument(span).await
    }

    /// Turn the adapter into a function suitable for registering with a dispatcher
    pub fn into_reconciler(
        self,
    ) -> impl Fn(String, Option<Arc<K>>) -> BoxFuture<'static, Result<Option<Arc<K>>, Error<L::Error>>>
           + Clone
           + Send
           + Sync
           + 'static
    where
        L: 'static,
        C: 'static,
    {
        let adapter = Arc::new(self);
        move |key, obj| {
            let adapter = adapter.clone();
            async move { adapter.reconcile(&key, obj).await }.boxed()
        }
    }

    async fn run(&self, obj: Arc<K>) -> Result<Option<Arc<K>>, Error<L::Error>> {
        if self.blocklist.snapshot().is_disallowed_namespace(&*obj) {
            tracing::debug!("object is in a disallowed namespace, skipping");
            return Ok(Some(obj));
        }

        let obj = match self.finalize(obj).await? {
            Step::Continue(obj) => obj,
            Step::Done(obj) => return Ok(obj),
        };
        let obj = match self.create(obj).await? {
            Step::Continue(obj) => obj,
            Step::Done(obj) => return Ok(obj),
        };
        self.record(obj, Hook::Updated).await.map(Some)
    }

    async fn finalize(&self, obj: Arc<K>) -> Result<Step<K>, Error<L::Error>> {
        if !self.capabilities.finalize || !obj.is_deleting() {
            return Ok(Step::Continue(obj));
        }
        let finalizer = self.finalizer_key();
        if !obj.has_finalizer(&finalizer) {
            tracing::debug!(%finalizer, "object is being deleted without our finalizer");
            return Ok(Step::Done(None));
        }

        // Finalize must succeed before the finalizer can be released
        let obj = self.record(obj, Hook::Finalize).await?;
        let obj = self.remove_finalizer(&finalizer, obj).await?;
        Ok(Step::Done(Some(obj)))
    }

    async fn create(&self, obj: Arc<K>) -> Result<Step<K>, Error<L::Error>> {
        if self.is_initialized(&obj) {
            return Ok(Step::Continue(obj));
        }

        let obj = if self.capabilities.finalize {
            self.add_finalizer(obj).await?
        } else {
            obj
        };
        if !self.capabilities.create {
            return Ok(Step::Continue(obj));
        }

        let obj = self.record(obj, Hook::Create).await?;
        let obj = self.set_initialized(&obj).await?;
        Ok(Step::Done(Some(obj)))
    }

    /// Run `hook` on a private copy of `obj` and persist whatever it changed
    async fn record(&self, obj: Arc<K>, hook: Hook) -> Result<Arc<K>, Error<L::Error>> {
        let name = obj.meta().name.clone().ok_or(Error::Access)?;
        let copy = K::clone(&obj);
        tracing::trace!(?hook, "running hook");
        let outcome: HookResult<K, L::Error> = match hook {
            Hook::Create => self.lifecycle.create(copy).await,
            Hook::Updated => self.lifecycle.updated(copy).await,
            Hook::Finalize => self.lifecycle.finalize(copy).await,
        };

        match outcome {
            Ok(Some(changed)) => self.update(&name, obj, changed).await,
            Ok(None) => Ok(obj),
            Err(HookFailure { object, error }) => {
                if let Some(partial) = object {
                    // Keep whatever progress the hook made, but report the hook's error
                    if let Err(err) = self.update(&name, obj, partial).await {
                        tracing::debug!(?hook, error = %err, "failed to persist object after hook error");
                    }
                }
                Err(hook.failed(error))
            }
        }
    }

    async fn update(&self, name: &str, orig: Arc<K>, obj: K) -> Result<Arc<K>, Error<L::Error>> {
        if *orig == obj {
            return Ok(orig);
        }
        tracing::debug!(object = name, "persisting object");
        let stored = self.client.update(name, &obj).await.map_err(Error::Persist)?;
        Ok(Arc::new(stored))
    }

    fn is_initialized(&self, obj: &K) -> bool {
        obj.annotations().get(&self.annotation_key()).map(String::as_str) == Some("true")
    }

    async fn set_initialized(&self, obj: &K) -> Result<Arc<K>, Error<L::Error>> {
        let annotation = self.annotation_key();
        let mut obj = obj.clone();
        obj.annotations_mut().insert(annotation.clone(), "true".into());
        let name = obj.meta().name.clone().ok_or(Error::Access)?;
        tracing::debug!(%annotation, "marking object as initialized");
        let stored = self
            .client
            .update(&name, &obj)
            .await
            .map_err(|source| Error::SetInitialized { annotation, source })?;
        Ok(Arc::new(stored))
    }

    async fn add_finalizer(&self, obj: Arc<K>) -> Result<Arc<K>, Error<L::Error>> {
        let finalizer = self.finalizer_key();
        if obj.has_finalizer(&finalizer) {
            return Ok(obj);
        }
        let mut obj = K::clone(&obj);
        obj.finalizers_mut().push(finalizer.clone());
        let name = obj.meta().name.clone().ok_or(Error::Access)?;
        tracing::debug!(%finalizer, "adding finalizer");
        let stored = self
            .client
            .update(&name, &obj)
            .await
            .map_err(Error::AddFinalizer)?;
        Ok(Arc::new(stored))
    }

    /// Release `finalizer`, refetching and retrying when another writer got there first
    ///
    /// Removing a finalizer commutes with edits to other finalizers, so a conflicting
    /// write only needs to be replayed against the newer object.
    async fn remove_finalizer(&self, finalizer: &str, obj: Arc<K>) -> Result<Arc<K>, Error<L::Error>> {
        let mut current = obj;
        let mut attempt = 1;
        loop {
            let mut obj = K::clone(&current);
            if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
                finalizers.retain(|f| f != finalizer);
            }
            let name = obj.meta().name.clone().ok_or(Error::Access)?;

            let err = match self.client.update(&name, &obj).await {
                Ok(stored) => {
                    tracing::debug!(%finalizer, attempt, "removed finalizer");
                    return Ok(Arc::new(stored));
                }
                Err(err) => err,
            };
            tracing::debug!(%finalizer, attempt, error = %err, "failed to remove finalizer, refetching");
            let namespace = obj.namespace();
            let fresh = self
                .client
                .get(namespace.as_deref(), &name)
                .await
                .map_err(Error::Refetch)?;
            if attempt == REMOVE_FINALIZER_ATTEMPTS {
                tracing::warn!(%finalizer, error = %err, "giving up on removing finalizer");
                return Err(Error::ExhaustedRetries {
                    finalizer: finalizer.to_string(),
                    source: err,
                });
            }
            current = Arc::new(fresh);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ObjectLifecycleAdapter};
    use crate::{
        lifecycle::{HookResult, ObjectLifecycle},
        store::MemoryStore,
    };
    use async_trait::async_trait;
    use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
    use std::{convert::Infallible, sync::Arc};

    struct Noop;

    #[async_trait]
    impl ObjectLifecycle<ConfigMap> for Noop {
        type Error = Infallible;

        async fn updated(&self, _obj: ConfigMap) -> HookResult<ConfigMap, Infallible> {
            Ok(None)
        }
    }

    fn adapter(cluster_scoped: bool) -> ObjectLifecycleAdapter<ConfigMap, Noop, MemoryStore<ConfigMap>> {
        ObjectLifecycleAdapter::new("foo", cluster_scoped, Noop, MemoryStore::new())
    }

    #[test]
    fn derives_keys_from_adapter_name() {
        let namespaced = adapter(false);
        assert_eq!(namespaced.finalizer_key(), "controller.cattle.io/foo");
        assert_eq!(namespaced.annotation_key(), "lifecycle.cattle.io/create.foo");
        let scoped = adapter(true);
        assert_eq!(scoped.finalizer_key(), "clusterscoped.controller.cattle.io/foo");
        assert_eq!(scoped.annotation_key(), "lifecycle.cattle.io/create.foo");
    }

    #[tokio::test]
    async fn absent_objects_need_no_work() {
        assert!(adapter(false).reconcile("prod/cm", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unnamed_objects_cannot_be_written() {
        let unnamed = ConfigMap {
            metadata: ObjectMeta {
                generate_name: Some("cm-".into()),
                namespace: Some("prod".into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };
        let err = adapter(false)
            .reconcile("prod/cm-", Some(Arc::new(unnamed)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Access));
        assert!(!err.is_conflict());
    }
}
