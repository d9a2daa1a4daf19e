//! The class-level callback API.
//!
//! A [`CallbackRegistry`] owns every model class of one target type together
//! with its chains. The application creates it at startup and shares it
//! behind an `Arc`.
//!
//! # Example
//!
//! ```ignore
//! let registry = CallbackRegistry::<Person>::new();
//! let person = registry.define_class("Person");
//! registry.define_callback_chains(person, &["save"], &ChainOptions::default())?;
//! registry.before(person, "save", "normalize_name")?;
//! registry.after(person, "save", Filter::from_fn(|p: &mut Person| {
//!     p.saved = true;
//!     Ok(HookFlow::Continue)
//! }))?;
//!
//! let outcome = registry
//!     .run_callbacks(&cx, person, "save", &mut alice, Some(Operation::from_fn(|p| p.persist())))
//!     .await;
//! ```

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ormkit_core::{CallbackErrorKind, CancelReason, Cx, Error, Outcome, Result};

use crate::adapter::Node;
use crate::chain::{self, CallbackChain};
use crate::class::{ClassId, ModelClass};
use crate::condition::Condition;
use crate::config::{CallbackKind, ChainConfig, ChainOptions};
use crate::env::{Operation, RunResult};
use crate::filter::{CallbackTarget, Filter, FilterKey};
use crate::record::{CallbackOptions, CallbackRecord};

/// Model classes, their hierarchy, and their callback chains.
pub struct CallbackRegistry<T> {
    classes: RwLock<Vec<ModelClass<T>>>,
}

impl<T: CallbackTarget> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn class_ref<T>(classes: &[ModelClass<T>], id: ClassId) -> Result<&ModelClass<T>> {
    classes.get(id.0).ok_or_else(|| unknown_class(id))
}

fn class_mut<T>(classes: &mut [ModelClass<T>], id: ClassId) -> Result<&mut ModelClass<T>> {
    classes.get_mut(id.0).ok_or_else(|| unknown_class(id))
}

fn unknown_class(id: ClassId) -> Error {
    Error::callback(
        CallbackErrorKind::UnknownClass,
        "",
        format!("{id} is not registered"),
    )
}

impl<T: CallbackTarget> CallbackRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ModelClass<T>>> {
        self.classes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ModelClass<T>>> {
        self.classes.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Add a root class with no chains.
    pub fn define_class(&self, name: impl Into<String>) -> ClassId {
        let mut classes = self.write();
        let id = ClassId(classes.len());
        classes.push(ModelClass::root(name.into()));
        id
    }

    /// Add a class below `parent`, copying each of the parent's chains.
    ///
    /// The new class is recorded as a descendant of every ancestor.
    pub fn subclass(&self, parent: ClassId, name: impl Into<String>) -> Result<ClassId> {
        let mut classes = self.write();
        let id = ClassId(classes.len());
        let child = ModelClass::inherit(name.into(), parent, class_ref(&classes, parent)?);

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            let entry = class_mut(&mut classes, ancestor)?;
            entry.descendants.push(id);
            cursor = entry.parent;
        }
        tracing::debug!(class = %child.name, parent = %parent, "Defined subclass");
        classes.push(child);
        Ok(id)
    }

    pub fn class_name(&self, class: ClassId) -> Result<String> {
        Ok(class_ref(&self.read(), class)?.name.clone())
    }

    pub fn parent(&self, class: ClassId) -> Result<Option<ClassId>> {
        Ok(class_ref(&self.read(), class)?.parent)
    }

    /// Every class below `class`, in creation order.
    pub fn descendants(&self, class: ClassId) -> Result<Vec<ClassId>> {
        Ok(class_ref(&self.read(), class)?.descendants.clone())
    }

    /// Names of the chains defined on `class`, sorted.
    pub fn chain_names(&self, class: ClassId) -> Result<Vec<String>> {
        let classes = self.read();
        let mut names: Vec<String> = class_ref(&classes, class)?.chains.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Inspect one chain.
    pub fn with_chain<R>(
        &self,
        class: ClassId,
        name: &str,
        f: impl FnOnce(&CallbackChain<T>) -> R,
    ) -> Result<R> {
        let classes = self.read();
        Ok(f(class_ref(&classes, class)?.chain(name)?))
    }

    // ========================================================================
    // Chain definition
    // ========================================================================

    /// Define (or redefine, emptying) one chain per name with shared options.
    pub fn define_callback_chains(
        &self,
        class: ClassId,
        names: &[&str],
        options: &ChainOptions,
    ) -> Result<()> {
        let configs = names
            .iter()
            .map(|name| ChainConfig::new(*name, options.clone()))
            .collect::<Result<Vec<_>>>()?;
        for config in configs {
            self.define_callback_chain(class, config)?;
        }
        Ok(())
    }

    /// Define (or redefine, emptying) the chain described by `config`.
    ///
    /// Existing descendants that do not have a chain of that name receive an
    /// empty one.
    pub fn define_callback_chain(&self, class: ClassId, config: ChainConfig) -> Result<()> {
        let mut classes = self.write();
        let config = Arc::new(config);
        let name = config.name().to_string();

        let entry = class_mut(&mut classes, class)?;
        entry
            .chains
            .insert(name.clone(), CallbackChain::new(Arc::clone(&config)));
        let descendants = entry.descendants.clone();

        for id in descendants {
            let descendant = class_mut(&mut classes, id)?;
            descendant
                .chains
                .entry(name.clone())
                .or_insert_with(|| CallbackChain::new(Arc::clone(&config)));
        }
        tracing::debug!(
            class = %class,
            chain = %name,
            options = ?config.options(),
            "Defined callback chain"
        );
        Ok(())
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `filters` as `kind` callbacks on the chain `name`.
    ///
    /// Before-callbacks are appended unless `options.prepend` is set.
    /// After-callbacks are always prepended, and unless the chain disables
    /// `skip_on_false_result` they also skip when the result is exactly
    /// `false`. A filter already registered with the same kind is moved.
    pub fn register_callback<I>(
        &self,
        class: ClassId,
        name: &str,
        kind: CallbackKind,
        filters: I,
        options: CallbackOptions<T>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Filter<T>>,
    {
        let mut classes = self.write();
        let chain = class_mut(&mut classes, class)?.chain_mut(name)?;
        let config = Arc::clone(chain.config());
        if !config.allows(kind) {
            return Err(Error::callback(
                CallbackErrorKind::KindNotAllowed,
                name,
                format!(
                    "{kind} callbacks are not allowed (only {:?})",
                    config.options().only
                ),
            ));
        }

        let CallbackOptions {
            mut when,
            unless,
            prepend,
        } = options;
        let mut prepend = prepend.unwrap_or(false);
        if kind == CallbackKind::After {
            prepend = true;
            if config.skip_on_false_result() {
                when.push(Condition::not_false_result());
            }
        }

        for filter in filters {
            let record = CallbackRecord::new(
                Arc::clone(&config),
                kind,
                filter,
                when.clone(),
                unless.clone(),
            );
            tracing::debug!(
                chain = name,
                kind = %kind,
                filter = %record.key(),
                prepend,
                "Registered callback"
            );
            if prepend {
                chain.prepend(record);
            } else {
                chain.append(record);
            }
        }
        Ok(())
    }

    /// Register one before-callback with no conditions.
    pub fn before(&self, class: ClassId, name: &str, filter: impl Into<Filter<T>>) -> Result<()> {
        self.register_callback(
            class,
            name,
            CallbackKind::Before,
            [filter.into()],
            CallbackOptions::default(),
        )
    }

    /// Register one after-callback with no conditions.
    pub fn after(&self, class: ClassId, name: &str, filter: impl Into<Filter<T>>) -> Result<()> {
        self.register_callback(
            class,
            name,
            CallbackKind::After,
            [filter.into()],
            CallbackOptions::default(),
        )
    }

    /// Stop a registered callback from running.
    ///
    /// Without conditions the record is removed. With conditions it is
    /// replaced in place by a record that skips whenever the conditions say
    /// so. Returns `false` when nothing matched.
    pub fn skip_callback(
        &self,
        class: ClassId,
        name: &str,
        kind: CallbackKind,
        filter: impl Into<FilterKey>,
        options: CallbackOptions<T>,
    ) -> Result<bool> {
        let key = filter.into();
        let mut classes = self.write();
        let chain = class_mut(&mut classes, class)?.chain_mut(name)?;
        let Some(index) = chain.position(kind, &key) else {
            tracing::debug!(chain = name, kind = %kind, filter = %key, "No callback to skip");
            return Ok(false);
        };

        if options.has_conditions() {
            let merged = chain.records()[index].merge(&options);
            chain.replace(index, merged);
        } else {
            chain.remove_at(index);
        }
        Ok(true)
    }

    /// Remove every callback of chain `name` from `class`.
    ///
    /// Descendants lose exactly the records they inherited from this class's
    /// chain; callbacks they registered themselves stay.
    pub fn reset_callbacks(&self, class: ClassId, name: &str) -> Result<()> {
        let mut classes = self.write();
        let entry = class_ref(&classes, class)?;
        let own = entry.chain(name)?.copy();
        let descendants = entry.descendants.clone();

        let mut pruned = 0;
        for id in descendants {
            if let Some(chain) = classes.get_mut(id.0).and_then(|c| c.chains.get_mut(name)) {
                pruned += chain.remove_all_of(&own);
            }
        }
        class_mut(&mut classes, class)?.chain_mut(name)?.clear();
        tracing::debug!(
            class = %class,
            chain = name,
            removed = own.len(),
            pruned,
            "Reset callbacks"
        );
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run chain `name` of `class` around `operation` against `target`.
    ///
    /// Before-callbacks run in order, then the operation, then the
    /// after-callbacks newest first. A halt yields `RunResult::Halted`; an
    /// error from any hook or from the operation yields `Outcome::Err`. A
    /// context with a pending cancel request yields `Outcome::Cancelled`
    /// before any hook runs.
    #[tracing::instrument(level = "debug", skip(self, cx, target, operation))]
    pub async fn run_callbacks(
        &self,
        cx: &Cx,
        class: ClassId,
        name: &str,
        target: &mut T,
        operation: Option<Operation<T>>,
    ) -> Outcome<RunResult, Error> {
        if cx.is_cancel_requested() {
            let reason = cx
                .cancel_reason()
                .unwrap_or_else(|| CancelReason::user("callback run cancelled"));
            return Outcome::Cancelled(reason);
        }
        let node = match self.compiled(class, name) {
            Ok(node) => node,
            Err(e) => return Outcome::Err(e),
        };
        match chain::execute(node, cx, target, operation).await {
            Ok(result) => Outcome::Ok(result),
            Err(e) => Outcome::Err(e),
        }
    }

    /// The compiled node for a chain, or `None` when the chain is empty.
    fn compiled(&self, class: ClassId, name: &str) -> Result<Option<Node<T>>> {
        let classes = self.read();
        let chain = class_ref(&classes, class)?.chain(name)?;
        Ok((!chain.is_empty()).then(|| chain.compile()))
    }
}

impl<T> std::fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let classes = self.classes.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CallbackRegistry")
            .field("classes", &classes.iter().map(|c| &c.name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::CallbackEnv;
    use crate::filter::HookFlow;
    use asupersync::runtime::RuntimeBuilder;
    use ormkit_core::{CancelKind, Value};

    #[derive(Default)]
    struct Doc {
        trail: Vec<&'static str>,
    }

    impl CallbackTarget for Doc {}

    fn mark(label: &'static str) -> Filter<Doc> {
        Filter::from_fn(move |doc: &mut Doc| {
            doc.trail.push(label);
            Ok(HookFlow::Continue)
        })
    }

    fn registry_with_save() -> (CallbackRegistry<Doc>, ClassId) {
        let registry = CallbackRegistry::new();
        let doc = registry.define_class("Doc");
        registry
            .define_callback_chains(doc, &["save"], &ChainOptions::default())
            .unwrap();
        (registry, doc)
    }

    fn run(
        registry: &CallbackRegistry<Doc>,
        class: ClassId,
        doc: &mut Doc,
    ) -> Outcome<RunResult, Error> {
        run_in(registry, class, doc, &Cx::for_testing())
    }

    fn run_in(
        registry: &CallbackRegistry<Doc>,
        class: ClassId,
        doc: &mut Doc,
        cx: &Cx,
    ) -> Outcome<RunResult, Error> {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(async { registry.run_callbacks(cx, class, "save", doc, None).await })
    }

    #[test]
    fn test_define_and_introspect_chains() {
        let (registry, doc) = registry_with_save();
        registry
            .define_callback_chains(doc, &["validate", "destroy"], &ChainOptions::default())
            .unwrap();
        assert_eq!(registry.chain_names(doc).unwrap(), vec!["destroy", "save", "validate"]);
        assert_eq!(registry.class_name(doc).unwrap(), "Doc");
        assert!(registry.with_chain(doc, "save", CallbackChain::is_empty).unwrap());
    }

    #[test]
    fn test_unknown_chain_and_class_are_configuration_errors() {
        let (registry, doc) = registry_with_save();
        let err = registry.before(doc, "publish", mark("x")).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("publish"));

        let err = registry.class_name(ClassId(42)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_scope_leaves_class_untouched() {
        let (registry, doc) = registry_with_save();
        let bad = ChainOptions::default().scope(["kind", "colour"]);
        assert!(registry.define_callback_chains(doc, &["archive"], &bad).is_err());
        assert_eq!(registry.chain_names(doc).unwrap(), vec!["save"]);
    }

    #[test]
    fn test_only_rejects_disallowed_kind() {
        let registry = CallbackRegistry::<Doc>::new();
        let doc = registry.define_class("Doc");
        let opts = ChainOptions::default().only([CallbackKind::After]);
        registry.define_callback_chains(doc, &["initialize"], &opts).unwrap();

        let err = registry.before(doc, "initialize", mark("b")).unwrap_err();
        assert!(err.to_string().contains("not allowed"));
        registry.after(doc, "initialize", mark("a")).unwrap();
        assert_eq!(registry.with_chain(doc, "initialize", CallbackChain::len).unwrap(), 1);
    }

    #[test]
    fn test_after_callbacks_are_always_prepended() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", "b1").unwrap();
        registry
            .register_callback(
                doc,
                "save",
                CallbackKind::After,
                [Filter::method("a1")],
                CallbackOptions::new().prepend(false),
            )
            .unwrap();
        registry.after(doc, "save", "a2").unwrap();

        let keys = registry
            .with_chain(doc, "save", |c| {
                c.records().iter().map(|r| r.key().to_string()).collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(keys, vec!["a2", "a1", "b1"]);
    }

    #[test]
    fn test_subclass_copies_chains_and_tracks_descendants() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", mark("base")).unwrap();

        let report = registry.subclass(doc, "Report").unwrap();
        let memo = registry.subclass(report, "Memo").unwrap();
        assert_eq!(registry.parent(memo).unwrap(), Some(report));
        assert_eq!(registry.descendants(doc).unwrap(), vec![report, memo]);
        assert_eq!(registry.with_chain(memo, "save", CallbackChain::len).unwrap(), 1);

        // later registrations stay on the class they were made on
        registry.before(doc, "save", mark("late")).unwrap();
        assert_eq!(registry.with_chain(report, "save", CallbackChain::len).unwrap(), 1);
    }

    #[test]
    fn test_define_propagates_only_missing_chains() {
        let (registry, doc) = registry_with_save();
        let report = registry.subclass(doc, "Report").unwrap();
        registry.before(report, "save", mark("own")).unwrap();

        registry
            .define_callback_chains(doc, &["save", "publish"], &ChainOptions::default())
            .unwrap();
        assert!(registry.with_chain(doc, "save", CallbackChain::is_empty).unwrap());
        assert_eq!(registry.with_chain(report, "save", CallbackChain::len).unwrap(), 1);
        assert!(registry.with_chain(report, "publish", CallbackChain::is_empty).unwrap());
    }

    #[test]
    fn test_reset_removes_only_inherited_records() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", mark("inherited")).unwrap();
        let report = registry.subclass(doc, "Report").unwrap();
        registry.before(report, "save", mark("own")).unwrap();

        registry.reset_callbacks(doc, "save").unwrap();
        assert!(registry.with_chain(doc, "save", CallbackChain::is_empty).unwrap());

        let mut target = Doc::default();
        let outcome = run(&registry, report, &mut target);
        assert!(matches!(outcome, Outcome::Ok(RunResult::Target)));
        assert_eq!(target.trail, vec!["own"]);
    }

    #[test]
    fn test_skip_without_conditions_removes() {
        let (registry, doc) = registry_with_save();
        let hook = mark("hook");
        registry.before(doc, "save", hook.clone()).unwrap();

        assert!(!registry
            .skip_callback(doc, "save", CallbackKind::After, &hook, CallbackOptions::default())
            .unwrap());
        assert!(registry
            .skip_callback(doc, "save", CallbackKind::Before, &hook, CallbackOptions::default())
            .unwrap());
        assert!(registry.with_chain(doc, "save", CallbackChain::is_empty).unwrap());
    }

    #[test]
    fn test_skip_with_condition_keeps_position() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", mark("first")).unwrap();
        registry.before(doc, "save", "second").unwrap();
        registry.before(doc, "save", mark("third")).unwrap();

        let skip = CallbackOptions::new().when(Condition::function(|_: &Doc| true));
        assert!(registry
            .skip_callback(doc, "save", CallbackKind::Before, "second", skip)
            .unwrap());
        assert_eq!(
            registry
                .with_chain(doc, "save", |c| c.position(CallbackKind::Before, &"second".into()))
                .unwrap(),
            Some(1)
        );

        // "second" would fail as an unknown method if it still ran
        let mut target = Doc::default();
        let outcome = run(&registry, doc, &mut target);
        assert!(matches!(outcome, Outcome::Ok(_)));
        assert_eq!(target.trail, vec!["first", "third"]);
    }

    #[test]
    fn test_run_reports_unknown_method_as_error() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", "missing").unwrap();

        let mut target = Doc::default();
        match run(&registry, doc, &mut target) {
            Outcome::Err(Error::UnknownMethod { method, .. }) => assert_eq!(method, "missing"),
            _ => panic!("expected unknown method error"),
        }
    }

    #[test]
    fn test_run_unknown_chain_is_err() {
        let (registry, doc) = registry_with_save();
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let mut target = Doc::default();
        let outcome = rt.block_on(async {
            registry
                .run_callbacks(&cx, doc, "nope", &mut target, None)
                .await
        });
        assert!(matches!(outcome, Outcome::Err(Error::Callback(_))));
    }

    #[test]
    fn test_run_compiles_once_across_runs() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", mark("b")).unwrap();

        let mut target = Doc::default();
        for _ in 0..3 {
            let outcome = run(&registry, doc, &mut target);
            assert!(matches!(outcome, Outcome::Ok(RunResult::Target)));
        }
        assert_eq!(target.trail, vec!["b", "b", "b"]);
        assert_eq!(registry.with_chain(doc, "save", CallbackChain::compile_count).unwrap(), 1);
    }

    #[test]
    fn test_empty_chain_runs_operation_directly() {
        let (registry, doc) = registry_with_save();
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let mut target = Doc::default();
        let outcome = rt.block_on(async {
            let op = Operation::from_fn(|d: &mut Doc| {
                d.trail.push("op");
                Ok(Some(Value::from("done")))
            });
            registry.run_callbacks(&cx, doc, "save", &mut target, Some(op)).await
        });
        match outcome {
            Outcome::Ok(result) => assert_eq!(result.value(), Some(&Value::from("done"))),
            _ => panic!("expected a value"),
        }
        assert_eq!(target.trail, vec!["op"]);
    }

    #[test]
    fn test_cancel_request_without_reason_stops_run() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", mark("b")).unwrap();
        registry.after(doc, "save", mark("a")).unwrap();
        let cx = Cx::for_testing();
        cx.set_cancel_requested(true);
        assert!(cx.cancel_reason().is_none());

        let mut target = Doc::default();
        match run_in(&registry, doc, &mut target, &cx) {
            Outcome::Cancelled(reason) => assert_eq!(reason.kind(), CancelKind::User),
            _ => panic!("expected a cancelled outcome"),
        }
        assert!(target.trail.is_empty());
    }

    #[test]
    fn test_cancel_with_reason_is_reported() {
        let (registry, doc) = registry_with_save();
        registry.before(doc, "save", mark("b")).unwrap();
        let cx = Cx::for_testing();
        cx.cancel_with(CancelKind::User, Some("stop"));

        let mut target = Doc::default();
        match run_in(&registry, doc, &mut target, &cx) {
            Outcome::Cancelled(reason) => {
                assert_eq!(reason.kind(), CancelKind::User);
                assert_eq!(reason.message(), Some("stop"));
            }
            _ => panic!("expected a cancelled outcome"),
        }
        assert!(target.trail.is_empty());
        assert!(!registry.with_chain(doc, "save", CallbackChain::is_compiled).unwrap());
    }

    #[test]
    fn test_hook_error_keeps_first_recorded_error() {
        let (registry, doc) = registry_with_save();
        registry
            .before(
                doc,
                "save",
                Filter::from_env_fn(|d: &mut Doc, env: &mut CallbackEnv<Doc>| {
                    d.trail.push("hook");
                    env.set_error(Error::custom("recorded"));
                    Err(Error::custom("returned"))
                }),
            )
            .unwrap();

        let mut target = Doc::default();
        match run(&registry, doc, &mut target) {
            Outcome::Err(e) => assert_eq!(e.to_string(), "recorded"),
            _ => panic!("expected the recorded error"),
        }
        assert_eq!(target.trail, vec!["hook"]);
    }
}
