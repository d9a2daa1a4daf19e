//! `if` / `unless` conditions and their resolution into predicates.
//!
//! Every condition shape is resolved once, when its callback is built, into a
//! [`Predicate`] over the target and the result produced so far.

use std::fmt;
use std::sync::Arc;

use ormkit_core::{Result, Value};

use crate::config::{CallbackKind, ChainConfig};
use crate::filter::{CallbackDelegate, CallbackTarget};

/// A resolved condition.
pub type Predicate<T> = Arc<dyn Fn(&T, Option<&Value>) -> Result<bool> + Send + Sync>;

fn predicate<T, F>(f: F) -> Predicate<T>
where
    F: Fn(&T, Option<&Value>) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A gate on whether a callback runs.
pub enum Condition<T> {
    /// Predicate method on the target, dispatched by name.
    Method(String),
    /// Closure over the target.
    Function(Arc<dyn Fn(&T) -> bool + Send + Sync>),
    /// Closure over the result produced so far (`None` until one is supplied).
    Result(Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>),
    /// A ready-made predicate, used as is.
    Resolved(Predicate<T>),
    /// Delegate object asked through its scope-derived method name.
    Delegate(Arc<dyn CallbackDelegate<T>>),
}

impl<T: 'static> Condition<T> {
    pub fn method(name: impl Into<String>) -> Self {
        Self::Method(name.into())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn result<F>(f: F) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::Result(Arc::new(f))
    }

    pub fn resolved<F>(f: F) -> Self
    where
        F: Fn(&T, Option<&Value>) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Resolved(predicate(f))
    }

    pub fn delegate<D>(delegate: D) -> Self
    where
        D: CallbackDelegate<T> + 'static,
    {
        Self::Delegate(Arc::new(delegate))
    }

    /// Passes unless the result so far is exactly `Bool(false)`.
    pub fn not_false_result() -> Self {
        Self::result(|result| !result.is_some_and(Value::is_false))
    }
}

impl<T: CallbackTarget> Condition<T> {
    /// Turn this condition into a predicate for a `kind` callback on the
    /// chain described by `config`.
    pub fn resolve(&self, config: &ChainConfig, kind: CallbackKind) -> Predicate<T> {
        match self {
            Self::Method(name) => {
                let name = name.clone();
                predicate(move |target: &T, _| target.test_predicate(&name))
            }
            Self::Function(f) => {
                let f = Arc::clone(f);
                predicate(move |target: &T, _| Ok(f(target)))
            }
            Self::Result(f) => {
                let f = Arc::clone(f);
                predicate(move |_: &T, result| Ok(f(result)))
            }
            Self::Resolved(p) => Arc::clone(p),
            Self::Delegate(delegate) => {
                let delegate = Arc::clone(delegate);
                let method = config.method_name(kind);
                predicate(move |target: &T, _| delegate.test(&method, target))
            }
        }
    }

    /// Resolve and negate, for `unless` conditions.
    pub fn resolve_negated(&self, config: &ChainConfig, kind: CallbackKind) -> Predicate<T> {
        let inner = self.resolve(config, kind);
        predicate(move |target: &T, result| inner(target, result).map(|passed| !passed))
    }
}

impl<T> Clone for Condition<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Method(name) => Self::Method(name.clone()),
            Self::Function(f) => Self::Function(Arc::clone(f)),
            Self::Result(f) => Self::Result(Arc::clone(f)),
            Self::Resolved(p) => Self::Resolved(Arc::clone(p)),
            Self::Delegate(d) => Self::Delegate(Arc::clone(d)),
        }
    }
}

impl<T> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Result(_) => f.write_str("Result(..)"),
            Self::Resolved(_) => f.write_str("Resolved(..)"),
            Self::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

impl<T> From<&str> for Condition<T> {
    fn from(name: &str) -> Self {
        Self::Method(name.to_string())
    }
}
