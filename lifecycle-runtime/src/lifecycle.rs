//! Caller-supplied hooks run by the [`ObjectLifecycleAdapter`](crate::ObjectLifecycleAdapter)
use async_trait::async_trait;
use std::error::Error as StdError;

/// Which optional hooks an [`ObjectLifecycle`] implements
///
/// Disabling `finalize` also stops the adapter from adding its finalizer, so deletes of
/// the object are never blocked. Disabling `create` skips the create hook and never
/// stamps the initialization annotation; every pass then goes straight to `updated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Run [`ObjectLifecycle::create`] once per object
    pub create: bool,
    /// Guard deletion with a finalizer and run [`ObjectLifecycle::finalize`]
    pub finalize: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            create: true,
            finalize: true,
        }
    }
}

/// A failed hook, optionally carrying the object as far as the hook got with it
///
/// When `object` is set the adapter makes one best-effort attempt to persist it
/// before reporting `error`. Any `E` converts into a failure without an object,
/// so `?` works inside hooks.
#[derive(Debug)]
pub struct HookFailure<K, E> {
    /// Partially reconciled object to persist, if any
    pub object: Option<K>,
    /// The error to report
    pub error: E,
}

impl<K, E> HookFailure<K, E> {
    /// Fail without anything to persist
    pub fn new(error: E) -> Self {
        Self { object: None, error }
    }

    /// Fail, but persist `object` first
    pub fn with_object(object: K, error: E) -> Self {
        Self {
            object: Some(object),
            error,
        }
    }
}

impl<K, E> From<E> for HookFailure<K, E> {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

/// What a hook returns
///
/// `Ok(None)` means the hook did not change the object.
pub type HookResult<K, E> = Result<Option<K>, HookFailure<K, E>>;

/// The hooks driven through an object's lifecycle
///
/// Each hook receives a private copy of the object which it may modify and hand back.
/// A returned object that differs from the one the hook was given is written to the store.
///
/// All hooks must be idempotent: a pass is retried whenever a hook or a write fails.
#[async_trait]
pub trait ObjectLifecycle<K: Send + 'static>: Send + Sync {
    /// Error returned by the hooks
    type Error: StdError + Send + Sync + 'static;

    /// Runs once, the first time the object is seen
    ///
    /// Once this succeeds the object is annotated as initialized and `create`
    /// is not called for it again.
    async fn create(&self, _obj: K) -> HookResult<K, Self::Error> {
        Ok(None)
    }

    /// Runs on every pass over an initialized object that is not being deleted
    async fn updated(&self, obj: K) -> HookResult<K, Self::Error>;

    /// Runs once the object is marked for deletion, before the finalizer is released
    async fn finalize(&self, _obj: K) -> HookResult<K, Self::Error> {
        Ok(None)
    }
}
