//! Callback chains and their compiled form.
//!
//! A chain keeps its records in list order and lazily folds them into a
//! single [`Node`]. The folded node is cached until the list changes; every
//! structural mutation takes `&mut self` and drops the cache, so a run can
//! never observe a node compiled from an older list.
//!
//! # Execution order
//!
//! Before-records wrap the terminal right-to-left, so they run in list order.
//! After-records then wrap that core in list order, newest first: because
//! after-callbacks are prepended on registration, the most recently declared
//! one ends up innermost and runs first.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use ormkit_core::{Cx, Result};

use crate::adapter::{self, Node};
use crate::config::{CallbackKind, ChainConfig};
use crate::env::{CallbackEnv, Operation, RunResult};
use crate::filter::{CallbackTarget, FilterKey};
use crate::record::CallbackRecord;

/// Compilation progress of one chain.
enum CompileState<T> {
    Uncompiled,
    /// Another caller is folding the chain; wait on `ready`.
    Compiling,
    Compiled(Node<T>),
}

struct CompileCache<T> {
    state: Mutex<CompileState<T>>,
    ready: Condvar,
    compilations: AtomicUsize,
}

impl<T> CompileCache<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CompileState::Uncompiled),
            ready: Condvar::new(),
            compilations: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CompileState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate(&mut self) {
        *self.state.get_mut().unwrap_or_else(PoisonError::into_inner) = CompileState::Uncompiled;
    }
}

/// The ordered callbacks for one named lifecycle event on one class.
pub struct CallbackChain<T> {
    config: Arc<ChainConfig>,
    records: Vec<Arc<CallbackRecord<T>>>,
    cache: CompileCache<T>,
}

impl<T: CallbackTarget> CallbackChain<T> {
    pub fn new(config: Arc<ChainConfig>) -> Self {
        Self {
            config,
            records: Vec::new(),
            cache: CompileCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn config(&self) -> &Arc<ChainConfig> {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Arc<CallbackRecord<T>>] {
        &self.records
    }

    /// Index of the record registered as `(kind, key)`, if any.
    pub fn position(&self, kind: CallbackKind, key: &FilterKey) -> Option<usize> {
        self.records.iter().position(|r| r.is_duplicate_of(kind, key))
    }

    /// Add `record` at the end, evicting an earlier registration of the same
    /// filter.
    pub fn append(&mut self, record: CallbackRecord<T>) -> Arc<CallbackRecord<T>> {
        self.insert(record, false)
    }

    /// Add `record` at the front, evicting an earlier registration of the
    /// same filter.
    pub fn prepend(&mut self, record: CallbackRecord<T>) -> Arc<CallbackRecord<T>> {
        self.insert(record, true)
    }

    fn insert(&mut self, record: CallbackRecord<T>, front: bool) -> Arc<CallbackRecord<T>> {
        if let Some(idx) = self.position(record.kind(), record.key()) {
            tracing::debug!(
                chain = self.name(),
                filter = %record.key(),
                "Replacing duplicate callback"
            );
            self.records.remove(idx);
        }
        let record = Arc::new(record);
        if front {
            self.records.insert(0, Arc::clone(&record));
        } else {
            self.records.push(Arc::clone(&record));
        }
        self.cache.invalidate();
        record
    }

    /// Swap the record at `index` for `record`, keeping its position.
    pub fn replace(
        &mut self,
        index: usize,
        record: CallbackRecord<T>,
    ) -> Option<Arc<CallbackRecord<T>>> {
        let slot = self.records.get_mut(index)?;
        let old = std::mem::replace(slot, Arc::new(record));
        self.cache.invalidate();
        Some(old)
    }

    pub fn remove_at(&mut self, index: usize) -> Option<Arc<CallbackRecord<T>>> {
        if index >= self.records.len() {
            return None;
        }
        let removed = self.records.remove(index);
        self.cache.invalidate();
        Some(removed)
    }

    /// Remove this exact record (by identity, not by key).
    pub fn remove(&mut self, record: &Arc<CallbackRecord<T>>) -> bool {
        let before = self.records.len();
        self.records.retain(|r| !Arc::ptr_eq(r, record));
        let removed = self.records.len() != before;
        if removed {
            self.cache.invalidate();
        }
        removed
    }

    /// Remove every record that is also present (by identity) in `other`.
    pub fn remove_all_of(&mut self, other: &Self) -> usize {
        let before = self.records.len();
        self.records
            .retain(|r| !other.records.iter().any(|o| Arc::ptr_eq(r, o)));
        let removed = before - self.records.len();
        if removed > 0 {
            self.cache.invalidate();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.cache.invalidate();
    }

    /// Same name and config, a shallow copy of the records, and an empty cache.
    pub fn copy(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            records: self.records.clone(),
            cache: CompileCache::new(),
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(*self.cache.lock(), CompileState::Compiled(_))
    }

    /// How many times this chain has been folded.
    pub fn compile_count(&self) -> usize {
        self.cache.compilations.load(Ordering::Relaxed)
    }

    /// The compiled node, folding the records on first use.
    ///
    /// Concurrent callers wait for a fold already in progress instead of
    /// starting their own.
    pub fn compile(&self) -> Node<T> {
        let mut state = self.cache.lock();
        loop {
            match &*state {
                CompileState::Compiled(node) => return Arc::clone(node),
                CompileState::Uncompiled => break,
                CompileState::Compiling => {}
            }
            state = self
                .cache
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state = CompileState::Compiling;
        drop(state);

        let node = self.fold();
        self.cache.compilations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            chain = self.name(),
            callbacks = self.records.len(),
            "Compiled callback chain"
        );

        let mut state = self.cache.lock();
        *state = CompileState::Compiled(Arc::clone(&node));
        self.cache.ready.notify_all();
        node
    }

    fn fold(&self) -> Node<T> {
        let mut node = adapter::terminal();
        for record in self
            .records
            .iter()
            .rev()
            .filter(|r| r.kind() == CallbackKind::Before)
        {
            node = record.apply(node);
        }
        for record in self
            .records
            .iter()
            .filter(|r| r.kind() == CallbackKind::After)
        {
            node = record.apply(node);
        }
        node
    }

    /// Run the chain around `operation` against `target`.
    pub async fn run(
        &self,
        cx: &Cx,
        target: &mut T,
        operation: Option<Operation<T>>,
    ) -> Result<RunResult> {
        let node = if self.is_empty() {
            None
        } else {
            Some(self.compile())
        };
        execute(node, cx, target, operation).await
    }
}

impl<T: CallbackTarget> Clone for CallbackChain<T> {
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl<T> fmt::Debug for CallbackChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackChain")
            .field("name", &self.config.name())
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

/// Drive a compiled chain (or, for an empty chain, the bare operation).
pub(crate) async fn execute<T: CallbackTarget>(
    node: Option<Node<T>>,
    cx: &Cx,
    target: &mut T,
    operation: Option<Operation<T>>,
) -> Result<RunResult> {
    let Some(node) = node else {
        return match operation {
            Some(operation) => operation.call(cx, target).await.map(RunResult::from),
            None => Ok(RunResult::Target),
        };
    };
    let mut env = CallbackEnv::new(operation);
    node(cx, target, &mut env).await;
    env.finish()
}
