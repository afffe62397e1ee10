//! Crate with types and traits necessary for reconciling versioned resource objects
//!
//! This crate is available as a minimal alternative to `lifecycle` where no runtime is needed.
//! The same information here is always re-exported from `lifecycle` under `lifecycle::core`.
#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod dynamic;
pub use dynamic::DynamicObject;

pub mod gvk;
pub use gvk::{GroupVersion, GroupVersionKind};

pub mod metadata;
pub use metadata::{ObjectMeta, TypeMeta};

mod resource;
pub use resource::{Resource, ResourceExt};

mod error;
pub use error::{ErrorResponse, StatusDetails};
