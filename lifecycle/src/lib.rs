//! Lifecycle is an umbrella-crate for reconciling versioned resource objects through
//! create-once, update and finalizer-guarded delete phases.
//!
//! The main modules are:
//!
//! - [`core`](crate::core) with the [`Resource`] accessor traits, [`GroupVersionKind`](crate::core::GroupVersionKind)
//!   and [`DynamicObject`](crate::core::DynamicObject)
//! - [`runtime`](crate::runtime) with the [`ObjectLifecycleAdapter`](crate::runtime::ObjectLifecycleAdapter),
//!   the [`ObjectClient`](crate::runtime::ObjectClient) store contract and namespace/kind block-lists
//!
//! # Using the adapter
//! ```no_run
//! use async_trait::async_trait;
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use lifecycle::runtime::{HookResult, MemoryStore, ObjectLifecycle, ObjectLifecycleAdapter};
//! use std::{convert::Infallible, sync::Arc};
//!
//! struct Hooks;
//!
//! #[async_trait]
//! impl ObjectLifecycle<ConfigMap> for Hooks {
//!     type Error = Infallible;
//!
//!     async fn create(&self, obj: ConfigMap) -> HookResult<ConfigMap, Infallible> {
//!         println!("provisioning {:?}", obj.metadata.name);
//!         Ok(None)
//!     }
//!
//!     async fn updated(&self, _obj: ConfigMap) -> HookResult<ConfigMap, Infallible> {
//!         Ok(None)
//!     }
//!
//!     async fn finalize(&self, obj: ConfigMap) -> HookResult<ConfigMap, Infallible> {
//!         println!("cleaning up {:?}", obj.metadata.name);
//!         Ok(None)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let adapter = ObjectLifecycleAdapter::new("provisioner", false, Hooks, store.clone());
//!     let mut cm = ConfigMap::default();
//!     cm.metadata.name = Some("cm".into());
//!     cm.metadata.namespace = Some("default".into());
//!     let cm = store.insert(cm);
//!     adapter.reconcile("default/cm", Some(Arc::new(cm))).await?;
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]
#![forbid(unsafe_code)]

/// Re-exports from [`lifecycle-runtime`](lifecycle_runtime)
#[cfg(feature = "runtime")]
#[doc(inline)]
pub use lifecycle_runtime as runtime;

pub use crate::core::{Resource, ResourceExt};
/// Re-exports from [`lifecycle_core`](lifecycle_core)
#[doc(inline)]
pub use lifecycle_core as core;
