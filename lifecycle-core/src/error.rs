use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error response from the resource store.
#[derive(Error, Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[error("{message}: {reason}")]
pub struct ErrorResponse {
    /// The status
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error
    #[serde(default)]
    pub reason: String,
    /// The error code
    pub code: u16,
    /// Extended data associated with the reason.
    pub details: Option<StatusDetails>,
}

impl ErrorResponse {
    /// A `409 Conflict` for a write against a stale resource version
    pub fn conflict(name: &str, message: impl Into<String>) -> Self {
        Self {
            status: "Failure".into(),
            message: message.into(),
            reason: "Conflict".into(),
            code: 409,
            details: Some(StatusDetails {
                name: Some(name.into()),
                ..StatusDetails::default()
            }),
        }
    }

    /// A `404 NotFound` for an object missing from the store
    pub fn not_found(name: &str) -> Self {
        Self {
            status: "Failure".into(),
            message: format!("\"{name}\" not found"),
            reason: "NotFound".into(),
            code: 404,
            details: Some(StatusDetails {
                name: Some(name.into()),
                ..StatusDetails::default()
            }),
        }
    }

    /// Whether the store rejected a write because the object changed underneath it
    pub fn is_conflict(&self) -> bool {
        self.code == 409 || self.reason == "Conflict"
    }

    /// Whether the object does not exist in the store
    pub fn is_not_found(&self) -> bool {
        self.code == 404 || self.reason == "NotFound"
    }
}

/// StatusDetails is a set of additional properties that MAY be set by the server
/// to provide additional information about a response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    /// The group attribute of the resource associated with the status reason.
    pub group: Option<String>,
    /// The kind attribute of the resource associated with the status reason.
    pub kind: Option<String>,
    /// The name attribute of the resource associated with the status reason.
    pub name: Option<String>,
    /// If specified, the time in seconds before the operation should be retried.
    pub retry_after_seconds: Option<i32>,
    /// UID of the resource.
    pub uid: Option<String>,
}
