//! Error types shared across ormkit crates.

use std::fmt;

/// Convenience alias used by registration and model APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the callback engine and the model lifecycle layer.
///
/// `Callback` errors are programmer mistakes detected while defining or
/// registering chains. Everything else travels through a running chain and is
/// handed back to the caller of `run_callbacks`.
#[derive(Debug)]
pub enum Error {
    /// Invalid chain definition or registration.
    Callback(CallbackError),
    /// A named filter or condition does not exist on the target.
    UnknownMethod {
        /// Type name of the target (or delegate) that was asked.
        target: &'static str,
        /// The method name that could not be dispatched.
        method: String,
    },
    /// The surrounding context was cancelled before the chain started.
    Cancelled(String),
    /// Free-form failure reported by a hook or a wrapped operation.
    Custom(String),
}

impl Error {
    /// Build a free-form operational error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Build an error for a method name the target cannot dispatch.
    pub fn unknown_method(target: &'static str, method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            target,
            method: method.into(),
        }
    }

    /// Build a configuration error scoped to a chain.
    pub fn callback(
        kind: CallbackErrorKind,
        chain: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Callback(CallbackError {
            kind,
            chain: chain.into(),
            message: message.into(),
        })
    }

    /// True for errors that indicate a defect in the calling code.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Callback(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(e) => write!(f, "{e}"),
            Self::UnknownMethod { target, method } => {
                write!(f, "undefined method `{method}` for {target}")
            }
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
            Self::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Callback(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CallbackError> for Error {
    fn from(err: CallbackError) -> Self {
        Self::Callback(err)
    }
}

/// What was wrong with a chain definition or registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackErrorKind {
    /// No chain with that name was defined on the class.
    UnknownChain,
    /// The chain's `only` policy does not allow this callback kind.
    KindNotAllowed,
    /// A scope fragment cannot be resolved to a method-name part.
    InvalidScope,
    /// The class id does not belong to this registry.
    UnknownClass,
}

impl CallbackErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::UnknownChain => "unknown callback chain",
            Self::KindNotAllowed => "callback kind not allowed",
            Self::InvalidScope => "invalid callback scope",
            Self::UnknownClass => "unknown model class",
        }
    }
}

/// Configuration error raised while defining or registering callbacks.
#[derive(Debug, Clone)]
pub struct CallbackError {
    pub kind: CallbackErrorKind,
    /// Chain the failing call referred to (empty when not chain-specific).
    pub chain: String,
    pub message: String,
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.chain.is_empty() {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        } else {
            write!(
                f,
                "{} `{}`: {}",
                self.kind.as_str(),
                self.chain,
                self.message
            )
        }
    }
}

impl std::error::Error for CallbackError {}
