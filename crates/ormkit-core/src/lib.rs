//! Core types for ormkit.
//!
//! `ormkit-core` is the **foundation layer** shared by the callback engine and the
//! model lifecycle facade.
//!
//! # Role In The Architecture
//!
//! - **Error contract**: `Error` covers both configuration mistakes raised at
//!   registration time and operational failures carried through a running chain.
//! - **Data model**: `Value` is the dynamic result a wrapped model operation (or a
//!   hook) hands back to the caller.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so every
//!   callback chain runs cancel-aware and budget-aware.
//!
//! Most applications should use the `ormkit` facade; reach for `ormkit-core` directly
//! when writing adapters for a persistence layer.

use std::future::Future;
use std::pin::Pin;

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Budget, CancelKind, CancelReason, Cx, Outcome, RegionId, TaskId};

pub mod error;
pub mod value;

pub use error::{CallbackError, CallbackErrorKind, Error, Result};
pub use value::Value;

/// An owned, type-erased future that can be sent across threads.
///
/// Hooks and wrapped operations borrow the model for `'a` and hand back one of
/// these.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
