//! The resource store contract consumed by the adapter
use async_trait::async_trait;
use lifecycle_core::ErrorResponse;
use thiserror::Error;

/// A type-erased error from a store transport
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Possible errors when talking to the resource store
#[derive(Error, Debug)]
pub enum ClientError {
    /// The store answered with an error status
    ///
    /// A `409 Conflict` here means the write carried a stale resource version.
    #[error("ApiError: {0} ({0:?})")]
    Api(#[source] ErrorResponse),

    /// The request never got an answer from the store
    #[error("ServiceError: {0}")]
    Service(#[source] BoxError),
}

impl ClientError {
    /// Whether the store rejected a write because the object changed underneath it
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api(resp) if resp.is_conflict())
    }

    /// Whether the object does not exist in the store
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(resp) if resp.is_not_found())
    }
}

impl From<ErrorResponse> for ClientError {
    fn from(resp: ErrorResponse) -> Self {
        Self::Api(resp)
    }
}

/// Conditional writes and point reads against the backing store of `K`
///
/// Implementations own deadlines, retries of transport failures and cancellation;
/// the adapter only retries version conflicts while removing its finalizer.
#[async_trait]
pub trait ObjectClient<K>: Send + Sync {
    /// Replace the stored object named `name` with `obj`
    ///
    /// The write must be conditional on `obj`'s resource version and fail with a
    /// conflict (see [`ClientError::is_conflict`]) if the stored object has moved on.
    /// On success the stored object is returned, including any server-assigned fields.
    async fn update(&self, name: &str, obj: &K) -> Result<K, ClientError>;

    /// Fetch the current copy of an object
    ///
    /// `namespace` is `None` for cluster-scoped objects.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, ClientError>;
}
