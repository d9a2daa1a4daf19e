//! Filter adapters: turn a callback record into a node of the compiled chain.
//!
//! A node receives the target and the environment, does its part and awaits
//! the next node (or not). Before-nodes run their hook and then continue;
//! after-nodes continue first and run their hook on the way back out. The
//! terminal node sits innermost and runs the wrapped operation.

use std::sync::Arc;

use ormkit_core::{BoxFuture, Cx};

use crate::env::CallbackEnv;
use crate::filter::CallbackTarget;
use crate::record::CallbackRecord;

/// One step of a compiled chain.
pub type Node<T> = Arc<
    dyn for<'a> Fn(&'a Cx, &'a mut T, &'a mut CallbackEnv<T>) -> BoxFuture<'a, ()> + Send + Sync,
>;

fn node<T, F>(f: F) -> Node<T>
where
    F: for<'a> Fn(&'a Cx, &'a mut T, &'a mut CallbackEnv<T>) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Innermost node: runs the wrapped operation unless the chain stopped.
pub fn terminal<T: CallbackTarget>() -> Node<T> {
    node(|cx, target, env| {
        Box::pin(async move {
            if env.is_stopped() {
                return;
            }
            let Some(operation) = env.take_operation() else {
                return;
            };
            match operation.call(cx, target).await {
                Ok(Some(value)) => env.set_result(value),
                Ok(None) => {}
                Err(err) => env.set_error(err),
            }
        })
    })
}

/// Run `record`'s hook, then `next`.
///
/// A stopped chain skips both. Failing conditions skip only the hook.
pub fn before<T: CallbackTarget>(next: Node<T>, record: Arc<CallbackRecord<T>>) -> Node<T> {
    node(move |cx, target, env| {
        let next = Arc::clone(&next);
        let record = Arc::clone(&record);
        Box::pin(async move {
            if env.is_stopped() {
                return;
            }
            match record.passes(target, env.result()) {
                Ok(true) => {}
                Ok(false) => return next(cx, target, env).await,
                Err(err) => return env.set_error(err),
            }

            record.invoke(cx, target, env).await;
            if env.is_halted() {
                tracing::info!(
                    chain = record.chain(),
                    filter = %record.key(),
                    "Before callback halted the chain"
                );
                target.halted_callback_hook(record.key());
            }
            if env.error().is_some() {
                return;
            }
            next(cx, target, env).await;
        })
    })
}

/// Run `next`, then `record`'s hook.
///
/// Errors always skip the hook; a halt skips it only when the chain is
/// configured with `skip_after_callbacks_if_halted`.
pub fn after<T: CallbackTarget>(next: Node<T>, record: Arc<CallbackRecord<T>>) -> Node<T> {
    node(move |cx, target, env| {
        let next = Arc::clone(&next);
        let record = Arc::clone(&record);
        Box::pin(async move {
            next(cx, target, env).await;

            if env.error().is_some() {
                return;
            }
            if env.is_halted() && record.config().skip_after_callbacks_if_halted() {
                return;
            }
            match record.passes(target, env.result()) {
                Ok(true) => record.invoke(cx, target, env).await,
                Ok(false) => {}
                Err(err) => env.set_error(err),
            }
        })
    })
}
