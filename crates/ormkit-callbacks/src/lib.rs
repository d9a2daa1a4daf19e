//! Compiled before/after callback chains for ormkit models.
//!
//! `ormkit-callbacks` is the **callback engine**. Model classes define named
//! chains (`save`, `destroy`, ...), register hooks on them, and run a chain
//! around a business operation.
//!
//! # Role In The Architecture
//!
//! - **Registry**: [`CallbackRegistry`] holds the classes of one model type,
//!   their hierarchy and their chains, and exposes the class-level API.
//! - **Chains**: [`CallbackChain`] orders [`CallbackRecord`]s and folds them
//!   into a single compiled node that is cached until the chain changes.
//! - **Hooks**: [`Filter`] and [`Condition`] describe what runs and when;
//!   [`CallbackTarget`] dispatches hooks and predicates referred to by name.
//! - **Execution**: one [`CallbackEnv`] per run carries the halt flag, the
//!   first error, the pending [`Operation`] and its result.
//!
//! ```ignore
//! registry.define_callback_chains(post, &["save"], &ChainOptions::default())?;
//! registry.register_callback(
//!     post,
//!     "save",
//!     CallbackKind::Before,
//!     [Filter::method("check_title")],
//!     CallbackOptions::new().unless("is_draft"),
//! )?;
//! match registry.run_callbacks(&cx, post, "save", &mut draft, Some(op)).await {
//!     Outcome::Ok(RunResult::Halted) => { /* a before hook said no */ }
//!     Outcome::Ok(_) => { /* saved */ }
//!     Outcome::Err(e) => return Err(e),
//!     Outcome::Cancelled(_) | Outcome::Panicked(_) => { /* ... */ }
//! }
//! ```

pub mod adapter;
pub mod chain;
pub mod class;
pub mod condition;
pub mod config;
pub mod env;
pub mod filter;
pub mod record;
pub mod registry;

pub use chain::CallbackChain;
pub use class::ClassId;
pub use condition::{Condition, Predicate};
pub use config::{CallbackKind, ChainConfig, ChainOptions, MethodNamer, ScopeContext};
pub use env::{CallbackEnv, Operation, OperationResult, RunResult};
pub use filter::{CallbackDelegate, CallbackTarget, Filter, FilterKey, HookFlow, HookResult};
pub use record::{CallbackOptions, CallbackRecord};
pub use registry::CallbackRegistry;
