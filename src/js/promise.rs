//! js::promise
//!
//! Promise states, reactions and the microtask queue.
//!
//! # Design
//!
//! Settling a promise never runs script code directly: each registered
//! reaction becomes a [`Job`] on the interpreter's microtask queue, which the
//! event loop drains before any timer fires. A promise rejected with no
//! reaction attached is remembered until the loop finishes; if nothing
//! handled it by then it is reported as an unhandled rejection.

use std::cell::Cell;
use std::rc::Rc;

use super::error::JsError;
use super::interp::{Interpreter, TaskId};
use super::value::{sync_fn, LocalBoxFuture, Obj, ObjectKind, Value};

/// Settlement of a promise.
#[derive(Clone)]
pub enum Status {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

pub struct PromiseState {
    pub status: Status,
    reactions: Vec<Reaction>,
    /// A handler was attached at some point
    pub handled: bool,
}

impl PromiseState {
    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            reactions: Vec::new(),
            handled: false,
        }
    }
}

/// What runs when a promise settles.
#[derive(Clone)]
pub enum Reaction {
    /// `then`/`catch`: `target` settles with the handler's outcome
    Then {
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
        target: Obj,
    },
    Finally { callback: Value, target: Obj },
    /// `target` takes the original outcome once a `finally` callback's
    /// promise fulfills
    Restore {
        outcome: Result<Value, Value>,
        target: Obj,
    },
    /// Continue a suspended async function
    Resume(TaskId),
}

impl Reaction {
    fn adopt(target: &Obj) -> Self {
        Reaction::Then {
            on_fulfilled: None,
            on_rejected: None,
            target: target.clone(),
        }
    }
}

/// A queued microtask.
pub enum Job {
    Reaction {
        reaction: Reaction,
        outcome: Result<Value, Value>,
    },
    ResolveThenable {
        promise: Obj,
        thenable: Value,
        then: Value,
    },
}

impl Interpreter {
    pub fn new_promise(&self) -> Obj {
        Obj::new(
            ObjectKind::Promise(PromiseState::pending()),
            Some(self.realm().promise_proto.clone()),
        )
    }

    /// Settlement of `obj` if it is a promise.
    pub fn promise_status(obj: &Obj) -> Option<Status> {
        match &obj.borrow().kind {
            ObjectKind::Promise(state) => Some(state.status.clone()),
            _ => None,
        }
    }

    /// A promise already settled with `value` (adopting promises and
    /// thenables).
    pub fn resolved_promise(&self, value: Value) -> Obj {
        if let Value::Object(obj) = &value {
            if obj.is_promise() {
                return obj.clone();
            }
        }
        let promise = self.new_promise();
        self.resolve_promise(&promise, value);
        promise
    }

    pub fn rejected_promise(&self, reason: Value) -> Obj {
        let promise = self.new_promise();
        self.reject_promise(&promise, reason);
        promise
    }

    /// Resolve `promise` with `value`, following promises and thenables.
    pub fn resolve_promise(&self, promise: &Obj, value: Value) {
        if let Value::Object(obj) = &value {
            if obj.ptr_eq(promise) {
                let error = self.type_error("Chaining cycle detected for promise");
                self.reject_promise(promise, error.value);
                return;
            }
            if obj.is_promise() {
                self.add_reaction(obj, Reaction::adopt(promise));
                return;
            }
            if let Some(then) = obj.get_data("then").filter(Value::is_callable) {
                self.jobs.borrow_mut().push_back(Job::ResolveThenable {
                    promise: promise.clone(),
                    thenable: value.clone(),
                    then,
                });
                return;
            }
        }
        self.settle(promise, Status::Fulfilled(value));
    }

    pub fn reject_promise(&self, promise: &Obj, reason: Value) {
        self.settle(promise, Status::Rejected(reason));
    }

    fn settle(&self, promise: &Obj, status: Status) {
        let (reactions, unhandled) = {
            let mut object = promise.borrow_mut();
            let ObjectKind::Promise(state) = &mut object.kind else {
                return;
            };
            if !matches!(state.status, Status::Pending) {
                return;
            }
            state.status = status.clone();
            let unhandled = matches!(status, Status::Rejected(_)) && !state.handled;
            (std::mem::take(&mut state.reactions), unhandled)
        };
        if unhandled {
            self.rejections.borrow_mut().push(promise.clone());
        }
        let outcome = match status {
            Status::Fulfilled(value) => Ok(value),
            Status::Rejected(reason) => Err(reason),
            Status::Pending => return,
        };
        let mut jobs = self.jobs.borrow_mut();
        for reaction in reactions {
            jobs.push_back(Job::Reaction {
                reaction,
                outcome: outcome.clone(),
            });
        }
    }

    pub(crate) fn add_reaction(&self, promise: &Obj, reaction: Reaction) {
        let settled = {
            let mut object = promise.borrow_mut();
            let ObjectKind::Promise(state) = &mut object.kind else {
                return;
            };
            state.handled = true;
            match &state.status {
                Status::Pending => {
                    state.reactions.push(reaction.clone());
                    None
                }
                Status::Fulfilled(value) => Some(Ok(value.clone())),
                Status::Rejected(reason) => Some(Err(reason.clone())),
            }
        };
        if let Some(outcome) = settled {
            self.jobs
                .borrow_mut()
                .push_back(Job::Reaction { reaction, outcome });
        }
    }

    /// `promise.then(on_fulfilled, on_rejected)`.
    pub fn promise_then(&self, promise: &Obj, on_fulfilled: Value, on_rejected: Value) -> Obj {
        let target = self.new_promise();
        self.add_reaction(
            promise,
            Reaction::Then {
                on_fulfilled: Some(on_fulfilled).filter(Value::is_callable),
                on_rejected: Some(on_rejected).filter(Value::is_callable),
                target: target.clone(),
            },
        );
        target
    }

    /// `promise.finally(callback)`.
    pub fn promise_finally(&self, promise: &Obj, callback: Value) -> Obj {
        let target = self.new_promise();
        let reaction = if callback.is_callable() {
            Reaction::Finally {
                callback,
                target: target.clone(),
            }
        } else {
            Reaction::adopt(&target)
        };
        self.add_reaction(promise, reaction);
        target
    }

    /// Mark a promise as observed, e.g. by `await`.
    pub(crate) fn mark_handled(&self, promise: &Obj) {
        if let ObjectKind::Promise(state) = &mut promise.borrow_mut().kind {
            state.handled = true;
        }
    }

    /// Run one queued microtask. Returns `false` when the queue was empty.
    pub(crate) fn run_microtask(&self) -> LocalBoxFuture<'_, bool> {
        Box::pin(async move {
            let job = self.jobs.borrow_mut().pop_front();
            let Some(job) = job else {
                return false;
            };
            match job {
                Job::Reaction { reaction, outcome } => self.run_reaction(reaction, outcome).await,
                Job::ResolveThenable {
                    promise,
                    thenable,
                    then,
                } => {
                    let (resolve, reject) = self.resolving_functions(&promise);
                    if let Err(err) = self
                        .call(&then, thenable, vec![resolve, reject.clone()])
                        .await
                    {
                        // A no-op when `then` already settled the promise
                        let _ = self.call(&reject, Value::Undefined, vec![err.value]).await;
                    }
                }
            }
            true
        })
    }

    async fn run_reaction(&self, reaction: Reaction, outcome: Result<Value, Value>) {
        match reaction {
            Reaction::Then {
                on_fulfilled,
                on_rejected,
                target,
            } => {
                let (handler, argument, passthrough) = match outcome {
                    Ok(value) => (on_fulfilled, value.clone(), Ok(value)),
                    Err(reason) => (on_rejected, reason.clone(), Err(reason)),
                };
                let result = match handler {
                    Some(handler) => self.call(&handler, Value::Undefined, vec![argument]).await,
                    None => passthrough.map_err(JsError::new),
                };
                match result {
                    Ok(value) => self.resolve_promise(&target, value),
                    Err(err) => self.reject_promise(&target, err.value),
                }
            }
            Reaction::Finally { callback, target } => {
                match self.call(&callback, Value::Undefined, Vec::new()).await {
                    Ok(returned) => {
                        let settled = self.resolved_promise(returned);
                        self.add_reaction(&settled, Reaction::Restore { outcome, target });
                    }
                    Err(err) => self.reject_promise(&target, err.value),
                }
            }
            Reaction::Restore {
                outcome: original,
                target,
            } => match (outcome, original) {
                (Err(reason), _) | (Ok(_), Err(reason)) => self.reject_promise(&target, reason),
                (Ok(_), Ok(value)) => self.resolve_promise(&target, value),
            },
            Reaction::Resume(task) => self.resume_task(task, outcome).await,
        }
    }

    /// `resolve`/`reject` functions handed to executors and thenables; only
    /// the first call of either has an effect.
    pub fn resolving_functions(&self, promise: &Obj) -> (Value, Value) {
        let done = Rc::new(Cell::new(false));
        let resolve = {
            let promise = promise.clone();
            let done = done.clone();
            sync_fn(move |interp, _, args| {
                if !done.replace(true) {
                    interp.resolve_promise(&promise, args.into_iter().next().unwrap_or_default());
                }
                Ok(Value::Undefined)
            })
        };
        let reject = {
            let promise = promise.clone();
            sync_fn(move |interp, _, args| {
                if !done.replace(true) {
                    interp.reject_promise(&promise, args.into_iter().next().unwrap_or_default());
                }
                Ok(Value::Undefined)
            })
        };
        (
            Value::from(self.new_function("resolve", resolve)),
            Value::from(self.new_function("reject", reject)),
        )
    }

    /// Rejections that were never handled, in rejection order. Clears the
    /// record.
    pub fn take_unhandled_rejections(&self) -> Vec<Value> {
        let rejected = std::mem::take(&mut *self.rejections.borrow_mut());
        rejected
            .into_iter()
            .filter_map(|promise| match &promise.borrow().kind {
                ObjectKind::Promise(PromiseState {
                    status: Status::Rejected(reason),
                    handled: false,
                    ..
                }) => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::interp::{test_support::eval_string, Options};

    #[tokio::test]
    async fn reactions_run_in_order() {
        let out = eval_string(
            r#"
            const log = []
            Promise.resolve(1).then(v => log.push('a' + v))
            Promise.reject(new Error('x')).catch(e => log.push('b' + e.message))
            log.push('sync')
            await null
            await null
            return log.join()
            "#,
        )
        .await;
        assert_eq!(out, "sync,a1,bx");
    }

    #[tokio::test]
    async fn then_chains_adopt_returned_promises() {
        let out = eval_string(
            "const v = await Promise.resolve(2).then(n => Promise.resolve(n * 3)).then(n => n + 1)\nreturn v",
        )
        .await;
        assert_eq!(out, "7");
    }

    #[tokio::test]
    async fn finally_passes_through() {
        let out = eval_string(
            "let ran = false\nconst v = await Promise.resolve('ok').finally(() => { ran = true })\nreturn v + ran",
        )
        .await;
        assert_eq!(out, "oktrue");
    }

    #[tokio::test]
    async fn thenables_are_adopted() {
        let out = eval_string(
            "const thenable = { then(resolve) { resolve(42) } }\nreturn await Promise.resolve(thenable)",
        )
        .await;
        assert_eq!(out, "42");
    }

    #[tokio::test]
    async fn unhandled_rejections_are_recorded() {
        let interp = Interpreter::new(Options::default());
        let promise = interp.rejected_promise(Value::from("nope"));
        let handled = interp.rejected_promise(Value::from("fine"));
        interp.mark_handled(&handled);
        interp.run_event_loop().await;
        let unhandled = interp.take_unhandled_rejections();
        assert_eq!(unhandled.len(), 1);
        assert_eq!(unhandled[0].to_display_string(), "nope");
        assert!(matches!(
            Interpreter::promise_status(&promise),
            Some(Status::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn resolving_functions_settle_once() {
        let interp = Interpreter::new(Options::default());
        let promise = interp.new_promise();
        let (resolve, reject) = interp.resolving_functions(&promise);
        interp
            .call(&resolve, Value::Undefined, vec![Value::from(1.0)])
            .await
            .unwrap();
        interp
            .call(&reject, Value::Undefined, vec![Value::from(2.0)])
            .await
            .unwrap();
        assert!(matches!(
            Interpreter::promise_status(&promise),
            Some(Status::Fulfilled(Value::Number(n))) if n == 1.0
        ));
    }
}
