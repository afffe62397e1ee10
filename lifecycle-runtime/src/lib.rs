//! Crate with the lifecycle adapter runtime
//!
//! This crate wraps caller-supplied [`ObjectLifecycle`] hooks in a reconciliation pass
//! that runs `create` at most once per object, guards deletion with a finalizer,
//! and forwards every other change to `updated`.
//!
//! Newcomers should get started with [`ObjectLifecycleAdapter`], which owns all
//! finalizer and annotation bookkeeping for you.

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod adapter;
pub mod client;
pub mod filter;
pub mod lifecycle;
pub mod store;

pub use adapter::ObjectLifecycleAdapter;
pub use client::{ClientError, ObjectClient};
pub use filter::{Blocklist, SharedBlocklist};
pub use lifecycle::{Capabilities, HookFailure, HookResult, ObjectLifecycle};
pub use store::MemoryStore;
