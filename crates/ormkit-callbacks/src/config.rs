//! Per-chain configuration.
//!
//! A chain is configured once when it is defined. Redefining a chain replaces
//! its configuration (and empties it).

use std::fmt;
use std::sync::Arc;

use ormkit_core::{CallbackErrorKind, Error, Result};
use serde::{Deserialize, Serialize};

/// When a hook runs relative to the wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackKind {
    Before,
    After,
}

impl CallbackKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative options accepted by `define_callback_chains`.
///
/// Deserializes from JSON with every field optional:
///
/// ```ignore
/// let opts: ChainOptions = serde_json::from_str(r#"{"only": ["after"]}"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOptions {
    /// Callback kinds that may be registered on the chain.
    pub only: Vec<CallbackKind>,
    /// Fragments used to derive a delegate's method name (`kind`, `type`, `name`).
    pub scope: Vec<String>,
    /// Skip after-hooks once a before-hook halted the chain.
    pub skip_after_callbacks_if_halted: bool,
    /// Skip after-hooks when the operation's result is exactly `false`.
    pub skip_on_false_result: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            only: vec![CallbackKind::Before, CallbackKind::After],
            scope: vec!["kind".to_string()],
            skip_after_callbacks_if_halted: true,
            skip_on_false_result: true,
        }
    }
}

impl ChainOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the chain to the given kinds.
    pub fn only(mut self, kinds: impl IntoIterator<Item = CallbackKind>) -> Self {
        self.only = kinds.into_iter().collect();
        self
    }

    /// Set the scope fragments used for delegate method names.
    pub fn scope<S: Into<String>>(mut self, fragments: impl IntoIterator<Item = S>) -> Self {
        self.scope = fragments.into_iter().map(Into::into).collect();
        self
    }

    pub fn skip_after_callbacks_if_halted(mut self, skip: bool) -> Self {
        self.skip_after_callbacks_if_halted = skip;
        self
    }

    pub fn skip_on_false_result(mut self, skip: bool) -> Self {
        self.skip_on_false_result = skip;
        self
    }
}

/// What a method namer gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ScopeContext<'a> {
    pub kind: CallbackKind,
    pub chain: &'a str,
}

/// Maps a callback's kind and chain to the method invoked on a delegate object.
pub type MethodNamer = Arc<dyn Fn(&ScopeContext<'_>) -> String + Send + Sync>;

/// Resolved configuration of one named chain.
#[derive(Clone)]
pub struct ChainConfig {
    name: String,
    options: ChainOptions,
    namer: Option<MethodNamer>,
}

impl ChainConfig {
    /// Validate `options` for the chain called `name`.
    pub fn new(name: impl Into<String>, options: ChainOptions) -> Result<Self> {
        let name = name.into();
        if options.scope.is_empty() {
            return Err(Error::callback(
                CallbackErrorKind::InvalidScope,
                name,
                "scope must name at least one fragment",
            ));
        }
        if let Some(bad) = options
            .scope
            .iter()
            .find(|f| !matches!(f.as_str(), "kind" | "type" | "name"))
        {
            return Err(Error::callback(
                CallbackErrorKind::InvalidScope,
                name,
                format!("unknown scope fragment `{bad}` (expected kind, type or name)"),
            ));
        }
        Ok(Self {
            name,
            options,
            namer: None,
        })
    }

    /// Replace the scope-based naming with an explicit mapping.
    pub fn with_method_namer<F>(mut self, namer: F) -> Self
    where
        F: Fn(&ScopeContext<'_>) -> String + Send + Sync + 'static,
    {
        self.namer = Some(Arc::new(namer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    pub fn allows(&self, kind: CallbackKind) -> bool {
        self.options.only.contains(&kind)
    }

    pub fn skip_after_callbacks_if_halted(&self) -> bool {
        self.options.skip_after_callbacks_if_halted
    }

    pub fn skip_on_false_result(&self) -> bool {
        self.options.skip_on_false_result
    }

    /// Method name a delegate is asked to run for a callback of `kind`.
    pub fn method_name(&self, kind: CallbackKind) -> String {
        let ctx = ScopeContext {
            kind,
            chain: &self.name,
        };
        match &self.namer {
            Some(namer) => namer(&ctx),
            None => scoped_method_name(&self.options.scope, &ctx),
        }
    }
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("namer", &self.namer.as_ref().map(|_| "Fn(..)"))
            .finish()
    }
}

/// Join fragment values with `_` and camel-case the result.
fn scoped_method_name(scope: &[String], ctx: &ScopeContext<'_>) -> String {
    let joined = scope
        .iter()
        .map(|fragment| match fragment.as_str() {
            "name" => ctx.chain,
            _ => ctx.kind.as_str(),
        })
        .collect::<Vec<_>>()
        .join("_");
    camelize(&joined)
}

/// `before_save` -> `beforeSave`.
pub(crate) fn camelize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, part) in s.split('_').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
