//! An in-memory [`ObjectClient`] with optimistic concurrency
//!
//! [`MemoryStore`] behaves like a resource store just enough to exercise an adapter:
//! every write is conditional on the resource version it carries, every accepted write
//! bumps the version, and an object marked for deletion is dropped as soon as its last
//! finalizer is removed.
use crate::client::{ClientError, ObjectClient};
use ahash::HashMap;
use async_trait::async_trait;
use lifecycle_core::{ErrorResponse, Resource, ResourceExt};
use parking_lot::RwLock;
use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

/// A namespaced (if relevant) reference to a stored object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// The name of the object
    pub name: String,
    /// The namespace of the object, `None` for cluster-scoped objects
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Refer to a cluster-scoped object
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Refer to the object in `namespace` instead
    #[must_use]
    pub fn within(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Refer to `obj`
    #[must_use]
    pub fn from_obj<K: Resource>(obj: &K) -> Self {
        Self {
            name: obj.name_any(),
            namespace: obj.namespace(),
        }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

struct State<K> {
    objects: HashMap<ObjectRef, K>,
    resource_version: u64,
    writes: usize,
}

/// A shared in-memory object store
///
/// Cloning produces a new handle to the same objects.
pub struct MemoryStore<K> {
    state: Arc<RwLock<State<K>>>,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                objects: HashMap::default(),
                resource_version: 0,
                writes: 0,
            })),
        }
    }
}

impl<K> Debug for MemoryStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryStore")
            .field("objects", &state.objects.len())
            .field("resource_version", &state.resource_version)
            .field("writes", &state.writes)
            .finish()
    }
}

impl<K: Resource + Clone> MemoryStore<K> {
    /// An empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally store `obj`, as if created by someone else
    ///
    /// Returns the stored copy with its assigned resource version.
    /// Seeding objects does not count towards [`writes`](MemoryStore::writes).
    pub fn insert(&self, mut obj: K) -> K {
        let mut state = self.state.write();
        state.resource_version += 1;
        obj.meta_mut().resource_version = Some(state.resource_version.to_string());
        state.objects.insert(ObjectRef::from_obj(&obj), obj.clone());
        obj
    }

    /// The stored copy of an object, if it still exists
    #[must_use]
    pub fn get_cached(&self, key: &ObjectRef) -> Option<K> {
        self.state.read().objects.get(key).cloned()
    }

    /// Number of accepted conditional updates so far
    #[must_use]
    pub fn writes(&self) -> usize {
        self.state.read().writes
    }

    fn replace(&self, name: &str, obj: &K) -> Result<K, ClientError> {
        let key = ObjectRef {
            name: name.into(),
            namespace: obj.namespace(),
        };
        let mut state = self.state.write();
        let stored_version = state
            .objects
            .get(&key)
            .ok_or_else(|| ErrorResponse::not_found(name))?
            .resource_version();
        if stored_version != obj.resource_version() {
            return Err(ErrorResponse::conflict(
                name,
                format!("the object {key} has been modified; please apply your changes to the latest version and try again"),
            )
            .into());
        }

        state.resource_version += 1;
        state.writes += 1;
        let mut stored = obj.clone();
        stored.meta_mut().resource_version = Some(state.resource_version.to_string());
        if stored.is_deleting() && stored.finalizers().is_empty() {
            tracing::trace!(object = %key, "last finalizer removed, deleting");
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, stored.clone());
        }
        Ok(stored)
    }
}

#[async_trait]
impl<K> ObjectClient<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn update(&self, name: &str, obj: &K) -> Result<K, ClientError> {
        self.replace(name, obj)
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, ClientError> {
        let key = ObjectRef {
            name: name.into(),
            namespace: namespace.map(String::from),
        };
        self.get_cached(&key)
            .ok_or_else(|| ErrorResponse::not_found(name).into())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, ObjectRef};
    use crate::client::ObjectClient;
    use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
    use lifecycle_core::ResourceExt;

    fn configmap() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cm".into()),
                namespace: Some("prod".into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[tokio::test]
    async fn updates_are_conditional_on_resource_version() {
        let store = MemoryStore::new();
        let seeded = store.insert(configmap());
        assert_eq!(seeded.resource_version().as_deref(), Some("1"));

        let mut first = seeded.clone();
        first.annotations_mut().insert("a".into(), "1".into());
        let updated = store.update("cm", &first).await.unwrap();
        assert_eq!(updated.resource_version().as_deref(), Some("2"));

        let mut stale = seeded;
        stale.annotations_mut().insert("a".into(), "2".into());
        let err = store.update("cm", &stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.writes(), 1);

        let current = store.get(Some("prod"), "cm").await.unwrap();
        assert_eq!(current, updated);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let store = MemoryStore::<ConfigMap>::new();
        assert!(store.get(Some("prod"), "cm").await.unwrap_err().is_not_found());
        assert!(store.update("cm", &configmap()).await.unwrap_err().is_not_found());
        assert!(store.get(None, "cm").await.is_err());
    }

    #[tokio::test]
    async fn releasing_the_last_finalizer_deletes() {
        let store = MemoryStore::new();
        let deleting: ConfigMap = serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": "cm",
                "namespace": "prod",
                "deletionTimestamp": "2024-01-01T00:00:00Z",
                "finalizers": ["controller.cattle.io/foo"]
            }
        }))
        .unwrap();
        let mut released = store.insert(deleting);
        released.finalizers_mut().clear();
        store.update("cm", &released).await.unwrap();
        assert_eq!(store.get_cached(&ObjectRef::new("cm").within("prod")), None);
    }

    #[test]
    fn refs_display_with_namespace() {
        assert_eq!(ObjectRef::new("cm").within("prod").to_string(), "prod/cm");
        assert_eq!(ObjectRef::from_obj(&configmap()), ObjectRef::new("cm").within("prod"));
        assert_eq!(ObjectRef::new("node-1").to_string(), "node-1");
    }
}
