//! A single registered callback.

use std::fmt;
use std::sync::Arc;

use ormkit_core::{Cx, Result, Value};

use crate::adapter::{self, Node};
use crate::condition::{Condition, Predicate};
use crate::config::{CallbackKind, ChainConfig};
use crate::env::CallbackEnv;
use crate::filter::{CallbackTarget, Filter, FilterKey, HookFlow};

/// Options accepted when registering or skipping callbacks.
pub struct CallbackOptions<T> {
    /// Every condition must pass (`if`).
    pub when: Vec<Condition<T>>,
    /// Every condition must fail.
    pub unless: Vec<Condition<T>>,
    /// Insert at the front of the chain. Always on for after-callbacks.
    pub prepend: Option<bool>,
}

impl<T> Default for CallbackOptions<T> {
    fn default() -> Self {
        Self {
            when: Vec::new(),
            unless: Vec::new(),
            prepend: None,
        }
    }
}

impl<T> CallbackOptions<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, condition: impl Into<Condition<T>>) -> Self {
        self.when.push(condition.into());
        self
    }

    pub fn unless(mut self, condition: impl Into<Condition<T>>) -> Self {
        self.unless.push(condition.into());
        self
    }

    pub fn prepend(mut self, prepend: bool) -> Self {
        self.prepend = Some(prepend);
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.when.is_empty() || !self.unless.is_empty()
    }
}

impl<T> Clone for CallbackOptions<T> {
    fn clone(&self) -> Self {
        Self {
            when: self.when.clone(),
            unless: self.unless.clone(),
            prepend: self.prepend,
        }
    }
}

impl<T> fmt::Debug for CallbackOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackOptions")
            .field("when", &self.when)
            .field("unless", &self.unless)
            .field("prepend", &self.prepend)
            .finish()
    }
}

/// One hook registered on a chain.
///
/// Records are never changed after construction. Skipping with conditions
/// builds a replacement via [`CallbackRecord::merge`].
pub struct CallbackRecord<T> {
    chain: String,
    kind: CallbackKind,
    filter: Filter<T>,
    key: FilterKey,
    delegate_method: String,
    when: Vec<Condition<T>>,
    unless: Vec<Condition<T>>,
    predicates: Vec<Predicate<T>>,
    config: Arc<ChainConfig>,
}

impl<T: CallbackTarget> CallbackRecord<T> {
    pub fn new(
        config: Arc<ChainConfig>,
        kind: CallbackKind,
        filter: Filter<T>,
        when: Vec<Condition<T>>,
        unless: Vec<Condition<T>>,
    ) -> Self {
        let predicates = when
            .iter()
            .map(|c| c.resolve(&config, kind))
            .chain(unless.iter().map(|c| c.resolve_negated(&config, kind)))
            .collect();
        let delegate_method = match &filter {
            Filter::Delegate { .. } => config.method_name(kind),
            _ => String::new(),
        };
        Self {
            chain: config.name().to_string(),
            kind,
            key: filter.key(),
            filter,
            delegate_method,
            when,
            unless,
            predicates,
            config,
        }
    }

    /// Copy of this record that additionally stops running when `skip`'s
    /// conditions say so: `if` conditions of the skip become `unless`
    /// conditions here and vice versa.
    pub fn merge(&self, skip: &CallbackOptions<T>) -> Self {
        let mut when = self.when.clone();
        when.extend(skip.unless.iter().cloned());
        let mut unless = self.unless.clone();
        unless.extend(skip.when.iter().cloned());
        Self::new(
            Arc::clone(&self.config),
            self.kind,
            self.filter.clone(),
            when,
            unless,
        )
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    pub fn filter(&self) -> &Filter<T> {
        &self.filter
    }

    pub fn key(&self) -> &FilterKey {
        &self.key
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn when(&self) -> &[Condition<T>] {
        &self.when
    }

    pub fn unless(&self) -> &[Condition<T>] {
        &self.unless
    }

    /// True when this record and a `(kind, key)` registration would collide.
    pub fn is_duplicate_of(&self, kind: CallbackKind, key: &FilterKey) -> bool {
        self.kind == kind && &self.key == key
    }

    /// Evaluate all conditions against the target and the result so far.
    pub fn passes(&self, target: &T, result: Option<&Value>) -> Result<bool> {
        for predicate in &self.predicates {
            if !predicate(target, result)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Wrap `next` in the node for this record's kind.
    pub fn apply(self: &Arc<Self>, next: Node<T>) -> Node<T> {
        match self.kind {
            CallbackKind::Before => adapter::before(next, Arc::clone(self)),
            CallbackKind::After => adapter::after(next, Arc::clone(self)),
        }
    }

    /// Run the hook and fold its completion into `env`.
    pub(crate) async fn invoke(&self, cx: &Cx, target: &mut T, env: &mut CallbackEnv<T>) {
        let outcome = match &self.filter {
            Filter::Method(name) => target.call_method(cx, name).await,
            Filter::Function { hook, .. } => hook(cx, target).await,
            Filter::EnvFunction { hook, .. } => hook(cx, target, env).await,
            Filter::Delegate { delegate, .. } => {
                delegate.call(cx, &self.delegate_method, target).await
            }
        };
        match outcome {
            Ok(HookFlow::Continue) => {}
            Ok(HookFlow::Halt) => env.halt(),
            Err(err) => {
                tracing::warn!(
                    chain = %self.chain,
                    kind = %self.kind,
                    filter = %self.key,
                    error = %err,
                    "Callback failed"
                );
                env.set_error(err);
            }
        }
    }
}

impl<T> fmt::Debug for CallbackRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRecord")
            .field("chain", &self.chain)
            .field("kind", &self.kind)
            .field("filter", &self.filter)
            .field("when", &self.when.len())
            .field("unless", &self.unless.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainOptions;

    #[derive(Default)]
    struct Flagged {
        on: bool,
    }

    impl CallbackTarget for Flagged {}

    fn config() -> Arc<ChainConfig> {
        Arc::new(ChainConfig::new("save", ChainOptions::default()).unwrap())
    }

    #[test]
    fn test_passes_requires_all_conditions() {
        let record = CallbackRecord::new(
            config(),
            CallbackKind::Before,
            Filter::<Flagged>::method("touch"),
            vec![Condition::function(|t: &Flagged| t.on)],
            vec![Condition::function(|_: &Flagged| false)],
        );
        assert!(record.passes(&Flagged { on: true }, None).unwrap());
        assert!(!record.passes(&Flagged { on: false }, None).unwrap());
    }

    #[test]
    fn test_merge_swaps_skip_conditions() {
        let record = CallbackRecord::new(
            config(),
            CallbackKind::Before,
            Filter::<Flagged>::method("touch"),
            Vec::new(),
            Vec::new(),
        );
        let skip = CallbackOptions::new().when(Condition::function(|t: &Flagged| t.on));
        let merged = record.merge(&skip);

        assert_eq!(merged.when().len(), 0);
        assert_eq!(merged.unless().len(), 1);
        assert_eq!(merged.key(), record.key());
        // skipped while the flag is on, runs otherwise
        assert!(!merged.passes(&Flagged { on: true }, None).unwrap());
        assert!(merged.passes(&Flagged { on: false }, None).unwrap());
    }

    #[test]
    fn test_duplicate_detection_is_per_kind() {
        let record = CallbackRecord::new(
            config(),
            CallbackKind::Before,
            Filter::<Flagged>::method("touch"),
            Vec::new(),
            Vec::new(),
        );
        let key = FilterKey::from("touch");
        assert!(record.is_duplicate_of(CallbackKind::Before, &key));
        assert!(!record.is_duplicate_of(CallbackKind::After, &key));
    }

    #[test]
    fn test_options_builder() {
        let opts = CallbackOptions::<Flagged>::new()
            .when("is_ready")
            .unless(Condition::function(|t: &Flagged| t.on))
            .prepend(true);
        assert!(opts.has_conditions());
        assert_eq!(opts.prepend, Some(true));
        assert!(!CallbackOptions::<Flagged>::default().has_conditions());
    }
}
