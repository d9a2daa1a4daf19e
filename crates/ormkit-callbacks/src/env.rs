//! Per-run execution state and the wrapped operation.

use std::fmt;

use ormkit_core::{BoxFuture, Cx, Error, Result, Value};

/// What a wrapped operation reports: a value, nothing (`None`), or an error.
pub type OperationResult = Result<Option<Value>>;

/// The business operation a chain wraps, run at most once.
pub struct Operation<T> {
    run: Box<dyn for<'a> FnOnce(&'a Cx, &'a mut T) -> BoxFuture<'a, OperationResult> + Send>,
}

impl<T: 'static> Operation<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> FnOnce(&'a Cx, &'a mut T) -> BoxFuture<'a, OperationResult> + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Wrap a synchronous operation.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(&mut T) -> OperationResult + Send + 'static,
    {
        Self::new(move |_cx, target| {
            let out = f(target);
            Box::pin(std::future::ready(out))
        })
    }

    pub(crate) fn call<'a>(self, cx: &'a Cx, target: &'a mut T) -> BoxFuture<'a, OperationResult> {
        (self.run)(cx, target)
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Operation(..)")
    }
}

/// State of one `run_callbacks` invocation.
///
/// Owned by a single run and never shared. Once `halted` or `error` is set no
/// later before-hook runs.
pub struct CallbackEnv<T> {
    halted: bool,
    error: Option<Error>,
    operation: Option<Operation<T>>,
    result: Option<Value>,
}

impl<T: 'static> CallbackEnv<T> {
    pub(crate) fn new(operation: Option<Operation<T>>) -> Self {
        Self {
            halted: false,
            error: None,
            operation,
            result: None,
        }
    }

    /// Stop the chain without an error.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Record an error for this run. The first error recorded is kept.
    pub fn set_error(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Result supplied so far by the operation or a hook.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, value: impl Into<Value>) {
        self.result = Some(value.into());
    }

    /// True while the wrapped operation has not been taken by the terminal.
    pub fn has_operation(&self) -> bool {
        self.operation.is_some()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.halted || self.error.is_some()
    }

    pub(crate) fn take_operation(&mut self) -> Option<Operation<T>> {
        self.operation.take()
    }

    pub(crate) fn finish(self) -> Result<RunResult> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(match self.result {
            Some(value) => RunResult::Value(value),
            None if self.halted => RunResult::Halted,
            None => RunResult::Target,
        })
    }
}

impl<T> fmt::Debug for CallbackEnv<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackEnv")
            .field("halted", &self.halted)
            .field("error", &self.error)
            .field("has_operation", &self.operation.is_some())
            .field("result", &self.result)
            .finish()
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    /// The operation or a hook supplied a value.
    Value(Value),
    /// A before-hook halted the chain; nothing was supplied.
    Halted,
    /// Nothing was supplied; the caller's target is the result.
    Target,
}

impl RunResult {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Shape used when this run is itself the operation of an outer chain.
    ///
    /// A halt becomes `Bool(false)` so the outer after-hooks are skipped.
    pub fn into_operation_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Halted => Some(Value::Bool(false)),
            Self::Target => None,
        }
    }
}

impl From<Option<Value>> for RunResult {
    fn from(result: Option<Value>) -> Self {
        result.map_or(Self::Target, Self::Value)
    }
}
