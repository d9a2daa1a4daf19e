//! Hook shapes and the traits targets and delegates implement.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ormkit_core::{BoxFuture, Cx, Error, Result};

use crate::env::CallbackEnv;

/// What a hook asks the chain to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    /// Keep going.
    Continue,
    /// Stop without an error; the wrapped operation will not run.
    Halt,
}

/// Completion of a single hook.
pub type HookResult = Result<HookFlow>;

/// A model instance callbacks run against.
///
/// Named filters and named conditions are dispatched through this trait, so a
/// model maps the names it registers to its own methods:
///
/// ```ignore
/// impl CallbackTarget for Person {
///     fn call_method<'a>(
///         &'a mut self,
///         _cx: &'a Cx,
///         method: &'a str,
///     ) -> BoxFuture<'a, HookResult> {
///         let out = match method {
///             "normalize_name" => {
///                 self.name = self.name.trim().to_string();
///                 Ok(HookFlow::Continue)
///             }
///             other => Err(Error::unknown_method("Person", other)),
///         };
///         Box::pin(std::future::ready(out))
///     }
/// }
/// ```
pub trait CallbackTarget: Send + Sized + 'static {
    /// Run the hook method called `method`.
    fn call_method<'a>(&'a mut self, cx: &'a Cx, method: &'a str) -> BoxFuture<'a, HookResult> {
        let _ = cx;
        let err = Error::unknown_method(std::any::type_name::<Self>(), method);
        Box::pin(std::future::ready(Err(err)))
    }

    /// Evaluate the predicate method called `method`.
    fn test_predicate(&self, method: &str) -> Result<bool> {
        Err(Error::unknown_method(std::any::type_name::<Self>(), method))
    }

    /// Called after a before-hook halted the chain. No-op by default.
    fn halted_callback_hook(&mut self, filter: &FilterKey) {
        let _ = filter;
    }
}

/// An object that handles callbacks on behalf of a target.
///
/// The method name it receives is derived from the chain's scope (for example
/// `beforeSave`) once, when the callback is registered.
pub trait CallbackDelegate<T>: Send + Sync {
    fn call<'a>(&'a self, cx: &'a Cx, method: &'a str, target: &'a mut T)
    -> BoxFuture<'a, HookResult>;

    /// Used when the delegate appears as an `if`/`unless` condition.
    fn test(&self, method: &str, target: &T) -> Result<bool> {
        let _ = target;
        Err(Error::unknown_method(std::any::type_name::<Self>(), method))
    }
}

/// Hook over the target alone.
pub type TargetHook<T> =
    Arc<dyn for<'a> Fn(&'a Cx, &'a mut T) -> BoxFuture<'a, HookResult> + Send + Sync>;

/// Hook that also sees the execution environment.
pub type EnvHook<T> = Arc<
    dyn for<'a> Fn(&'a Cx, &'a mut T, &'a mut CallbackEnv<T>) -> BoxFuture<'a, HookResult>
        + Send
        + Sync,
>;

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

fn next_filter_id() -> u64 {
    NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A registered hook.
///
/// Clones share identity: registering a clone of a filter replaces the
/// original, while two separately built closures never dedupe.
pub enum Filter<T> {
    /// Method on the target, dispatched by name.
    Method(String),
    Function {
        id: u64,
        hook: TargetHook<T>,
    },
    EnvFunction {
        id: u64,
        hook: EnvHook<T>,
    },
    Delegate {
        id: u64,
        delegate: Arc<dyn CallbackDelegate<T>>,
    },
}

impl<T: 'static> Filter<T> {
    pub fn method(name: impl Into<String>) -> Self {
        Self::Method(name.into())
    }

    /// Async hook over the target.
    pub fn function<F>(hook: F) -> Self
    where
        F: for<'a> Fn(&'a Cx, &'a mut T) -> BoxFuture<'a, HookResult> + Send + Sync + 'static,
    {
        Self::Function {
            id: next_filter_id(),
            hook: Arc::new(hook),
        }
    }

    /// Synchronous hook over the target.
    pub fn from_fn<F>(hook: F) -> Self
    where
        F: Fn(&mut T) -> HookResult + Send + Sync + 'static,
    {
        Self::function(move |_cx, target| {
            let out = hook(target);
            Box::pin(std::future::ready(out))
        })
    }

    /// Async hook that can halt, set the result, or inspect the environment.
    pub fn env_function<F>(hook: F) -> Self
    where
        F: for<'a> Fn(&'a Cx, &'a mut T, &'a mut CallbackEnv<T>) -> BoxFuture<'a, HookResult>
            + Send
            + Sync
            + 'static,
    {
        Self::EnvFunction {
            id: next_filter_id(),
            hook: Arc::new(hook),
        }
    }

    /// Synchronous variant of [`Filter::env_function`].
    pub fn from_env_fn<F>(hook: F) -> Self
    where
        F: Fn(&mut T, &mut CallbackEnv<T>) -> HookResult + Send + Sync + 'static,
    {
        Self::env_function(move |_cx, target, env| {
            let out = hook(target, env);
            Box::pin(std::future::ready(out))
        })
    }

    pub fn delegate<D>(delegate: D) -> Self
    where
        D: CallbackDelegate<T> + 'static,
    {
        Self::Delegate {
            id: next_filter_id(),
            delegate: Arc::new(delegate),
        }
    }

    /// Key used to detect duplicate registrations.
    pub fn key(&self) -> FilterKey {
        match self {
            Self::Method(name) => FilterKey::Name(name.clone()),
            Self::Function { id, .. }
            | Self::EnvFunction { id, .. }
            | Self::Delegate { id, .. } => FilterKey::Instance(*id),
        }
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Method(name) => Self::Method(name.clone()),
            Self::Function { id, hook } => Self::Function {
                id: *id,
                hook: Arc::clone(hook),
            },
            Self::EnvFunction { id, hook } => Self::EnvFunction {
                id: *id,
                hook: Arc::clone(hook),
            },
            Self::Delegate { id, delegate } => Self::Delegate {
                id: *id,
                delegate: Arc::clone(delegate),
            },
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Self::Function { id, .. } => f.debug_struct("Function").field("id", id).finish(),
            Self::EnvFunction { id, .. } => {
                f.debug_struct("EnvFunction").field("id", id).finish()
            }
            Self::Delegate { id, .. } => f.debug_struct("Delegate").field("id", id).finish(),
        }
    }
}

impl<T> From<&str> for Filter<T> {
    fn from(name: &str) -> Self {
        Self::Method(name.to_string())
    }
}

/// Identity of a filter for deduplication and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Name(String),
    Instance(u64),
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Instance(id) => write!(f, "#<filter {id}>"),
        }
    }
}

impl From<&str> for FilterKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl<T: 'static> From<&Filter<T>> for FilterKey {
    fn from(filter: &Filter<T>) -> Self {
        filter.key()
    }
}
