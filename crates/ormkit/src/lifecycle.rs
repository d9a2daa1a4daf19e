//! Standard model lifecycle built on callback chains.
//!
//! A model class gets six chains: `initialize` (after-callbacks only),
//! `validate`, `save`, `create`, `update` and `destroy`. [`Lifecycle`] runs
//! them around the model's [`Persistence`] implementation:
//!
//! - `valid` runs `validate` around [`Persistence::validate`].
//! - `save` first checks `valid`, then runs `save` wrapping either `create`
//!   or `update` (depending on [`Persistence::is_new_record`]), which in turn
//!   wraps the insert or update.
//! - `destroy` runs `destroy` around [`Persistence::delete`].
//!
//! A halt inside the nested `create`/`update` chain reaches the `save` chain
//! as the result `false`, so after-save callbacks are skipped and `save`
//! reports `false`.

use std::sync::Arc;

use ormkit_callbacks::{
    CallbackKind, CallbackRegistry, CallbackTarget, ChainOptions, ClassId, Operation,
    OperationResult, RunResult,
};
use ormkit_core::{BoxFuture, Cx, Error, Outcome, Result, Value};

pub const INITIALIZE: &str = "initialize";
pub const VALIDATE: &str = "validate";
pub const SAVE: &str = "save";
pub const CREATE: &str = "create";
pub const UPDATE: &str = "update";
pub const DESTROY: &str = "destroy";

/// Storage operations a model exposes to its lifecycle.
pub trait Persistence: CallbackTarget {
    /// True until the model has been inserted.
    fn is_new_record(&self) -> bool;

    /// Model-level validation. Always valid by default.
    fn validate<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Result<bool>> {
        let _ = cx;
        Box::pin(std::future::ready(Ok(true)))
    }

    fn insert<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Result<()>>;

    fn update<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Result<()>>;

    fn delete<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Result<()>>;
}

/// Define the standard lifecycle chains on `class`.
pub fn define_model_callbacks<T: CallbackTarget>(
    registry: &CallbackRegistry<T>,
    class: ClassId,
) -> Result<()> {
    registry.define_callback_chains(
        class,
        &[INITIALIZE],
        &ChainOptions::default().only([CallbackKind::After]),
    )?;
    registry.define_callback_chains(
        class,
        &[VALIDATE, SAVE, CREATE, UPDATE, DESTROY],
        &ChainOptions::default(),
    )
}

/// Lifecycle operations for one model class.
pub struct Lifecycle<T> {
    registry: Arc<CallbackRegistry<T>>,
    class: ClassId,
}

impl<T> Clone for Lifecycle<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            class: self.class,
        }
    }
}

impl<T: Persistence> Lifecycle<T> {
    /// Use an existing class whose lifecycle chains are already defined.
    pub fn new(registry: Arc<CallbackRegistry<T>>, class: ClassId) -> Self {
        Self { registry, class }
    }

    /// Create a root class with the standard lifecycle chains.
    pub fn define(registry: Arc<CallbackRegistry<T>>, name: &str) -> Result<Self> {
        let class = registry.define_class(name);
        define_model_callbacks(&registry, class)?;
        Ok(Self { registry, class })
    }

    /// Create a subclass inheriting this class's chains.
    pub fn subclass(&self, name: &str) -> Result<Self> {
        let class = self.registry.subclass(self.class, name)?;
        Ok(Self {
            registry: Arc::clone(&self.registry),
            class,
        })
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry<T>> {
        &self.registry
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Run the after-initialize callbacks.
    pub async fn initialize(&self, cx: &Cx, model: &mut T) -> Outcome<(), Error> {
        let outcome = self
            .registry
            .run_callbacks(cx, self.class, INITIALIZE, model, None)
            .await;
        map_outcome(outcome, |_| ())
    }

    /// Run the validation chain. `false` when a hook halted or validation
    /// failed.
    pub async fn valid(&self, cx: &Cx, model: &mut T) -> Outcome<bool, Error> {
        let op = Operation::new(|cx, model: &mut T| {
            Box::pin(async move {
                let valid = model.validate(cx).await?;
                Ok(Some(Value::Bool(valid)))
            })
        });
        let outcome = self
            .registry
            .run_callbacks(cx, self.class, VALIDATE, model, Some(op))
            .await;
        map_outcome(outcome, |result| succeeded(&result))
    }

    /// Validate, then insert or update inside the save chain.
    pub async fn save(&self, cx: &Cx, model: &mut T) -> Outcome<bool, Error> {
        match self.valid(cx, model).await {
            Outcome::Ok(true) => {}
            other => return other,
        }

        let is_new = model.is_new_record();
        let nested = if is_new { CREATE } else { UPDATE };
        tracing::debug!(class = %self.class, chain = nested, "Saving model");

        let registry = Arc::clone(&self.registry);
        let class = self.class;
        let op = Operation::new(move |cx, model: &mut T| {
            Box::pin(async move {
                let persist = Operation::new(move |cx, model: &mut T| {
                    Box::pin(async move {
                        if is_new {
                            model.insert(cx).await?;
                        } else {
                            model.update(cx).await?;
                        }
                        Ok(None)
                    })
                });
                let outcome = registry
                    .run_callbacks(cx, class, nested, model, Some(persist))
                    .await;
                outcome_into_operation_result(outcome)
            })
        });

        let outcome = self
            .registry
            .run_callbacks(cx, self.class, SAVE, model, Some(op))
            .await;
        map_outcome(outcome, |result| succeeded(&result))
    }

    /// Delete the model inside the destroy chain.
    pub async fn destroy(&self, cx: &Cx, model: &mut T) -> Outcome<bool, Error> {
        let op = Operation::new(|cx, model: &mut T| {
            Box::pin(async move {
                model.delete(cx).await?;
                Ok(None)
            })
        });
        let outcome = self
            .registry
            .run_callbacks(cx, self.class, DESTROY, model, Some(op))
            .await;
        map_outcome(outcome, |result| succeeded(&result))
    }
}

/// A run succeeded unless it halted or ended with exactly `false`.
fn succeeded(result: &RunResult) -> bool {
    !result.is_halted() && !result.value().is_some_and(Value::is_false)
}

fn map_outcome<A, B>(outcome: Outcome<A, Error>, f: impl FnOnce(A) -> B) -> Outcome<B, Error> {
    match outcome {
        Outcome::Ok(v) => Outcome::Ok(f(v)),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Hand a nested chain's outcome to the chain wrapping it.
fn outcome_into_operation_result(outcome: Outcome<RunResult, Error>) -> OperationResult {
    match outcome {
        Outcome::Ok(result) => Ok(result.into_operation_value()),
        Outcome::Err(e) => Err(e),
        Outcome::Cancelled(r) => Err(Error::Cancelled(format!("{r:?}"))),
        Outcome::Panicked(p) => Err(Error::custom(format!(
            "nested callback chain panicked: {p:?}"
        ))),
    }
}
