//! Model lifecycle callbacks for Rust ORMs.
//!
//! `ormkit` is the facade crate. It re-exports the callback engine from
//! `ormkit-callbacks` and the shared types from `ormkit-core`, and adds the
//! standard model lifecycle (`initialize`, `validate`, `save`, `create`,
//! `update`, `destroy`) in [`lifecycle`].
//!
//! # Example
//!
//! ```ignore
//! use ormkit::prelude::*;
//!
//! let registry = Arc::new(CallbackRegistry::<Person>::new());
//! let people = Lifecycle::define(Arc::clone(&registry), "Person")?;
//! registry.before(people.class(), SAVE, "normalize_name")?;
//! registry.after(people.class(), CREATE, "send_welcome_mail")?;
//!
//! let mut alice = Person::new("  Alice ");
//! match people.save(&cx, &mut alice).await {
//!     Outcome::Ok(true) => println!("saved"),
//!     Outcome::Ok(false) => println!("rejected by a callback"),
//!     Outcome::Err(e) => eprintln!("save failed: {e}"),
//!     Outcome::Cancelled(_) | Outcome::Panicked(_) => {}
//! }
//! ```

pub mod lifecycle;

pub use lifecycle::{Lifecycle, Persistence, define_model_callbacks};
pub use ormkit_callbacks as callbacks;
pub use ormkit_callbacks::{
    CallbackChain, CallbackDelegate, CallbackEnv, CallbackKind, CallbackOptions,
    CallbackRegistry, CallbackTarget, ChainConfig, ChainOptions, ClassId, Condition, Filter,
    FilterKey, HookFlow, HookResult, Operation, OperationResult, RunResult,
};
pub use ormkit_core::{
    BoxFuture, CallbackError, CallbackErrorKind, CancelKind, CancelReason, Cx, Error, Outcome,
    Result, Value,
};

/// Everything needed to declare and run model callbacks.
pub mod prelude {
    pub use crate::lifecycle::{
        CREATE, DESTROY, INITIALIZE, Lifecycle, Persistence, SAVE, UPDATE, VALIDATE,
        define_model_callbacks,
    };
    pub use ormkit_callbacks::{
        CallbackEnv, CallbackKind, CallbackOptions, CallbackRegistry, CallbackTarget,
        ChainOptions, ClassId, Condition, Filter, HookFlow, HookResult, Operation, RunResult,
    };
    pub use ormkit_core::{BoxFuture, Cx, Error, Outcome, Result, Value};
}
