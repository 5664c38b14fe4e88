//! js::interp::task
//!
//! Suspended async function bodies.
//!
//! Calling an async function starts a task: the body runs until an `await`
//! parks it, and the call returns the function's pending promise. The
//! awaited promise resumes the task through an ordinary reaction, so a body
//! continues only from the microtask queue, in order with every other
//! reaction. Top-level code is a task too; `run_module` and the event loop
//! are the only places that drain the queues.
//!
//! A parked body is a boxed future that returned `Pending` after its
//! `await` recorded the park. Any other `Pending` comes from host I/O and
//! goes back to the executor untouched.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tracing::debug;

use super::Interpreter;
use crate::js::error::{ErrorKind, JsError, JsResult};
use crate::js::promise::Reaction;
use crate::js::value::{LocalBoxFuture, Value};

pub type TaskId = u64;

/// Outcome handed to a parked `await`.
type Slot = Rc<RefCell<Option<Result<Value, Value>>>>;

struct Task {
    future: LocalBoxFuture<'static, ()>,
    /// Call frames open inside the parked body
    held: usize,
}

#[derive(Default)]
pub struct TaskTable {
    next: TaskId,
    suspended: HashMap<TaskId, Task>,
    waiting: HashMap<TaskId, Slot>,
    /// Task whose body is being polled
    current: Option<TaskId>,
    /// Set by the `await` that parked the current poll
    parked: Option<Slot>,
}

impl TaskTable {
    /// Async function bodies waiting to be resumed.
    pub fn suspended(&self) -> usize {
        self.suspended.len()
    }

    fn next_id(&mut self) -> TaskId {
        self.next += 1;
        self.next
    }
}

enum Turn<T> {
    Done(T),
    Parked(Slot),
}

/// The point where an `await` gives control back to the event loop.
struct Suspend<'a> {
    interp: &'a Interpreter,
    slot: Slot,
}

impl Future for Suspend<'_> {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.slot.borrow_mut().take() {
            return Poll::Ready(outcome);
        }
        self.interp.tasks.borrow_mut().parked = Some(self.slot.clone());
        Poll::Pending
    }
}

impl Interpreter {
    /// Poll a task body once with the call depth and current task set for
    /// it. `held` carries the frames a parked body keeps open.
    fn poll_turn<T>(
        &self,
        id: TaskId,
        held: &mut usize,
        body: Pin<&mut (dyn Future<Output = T> + '_)>,
        cx: &mut Context<'_>,
    ) -> Poll<Turn<T>> {
        let base = self.depth.get();
        self.depth.set(base + *held);
        let outer = self.tasks.borrow_mut().current.replace(id);
        let poll = body.poll(cx);
        self.tasks.borrow_mut().current = outer;
        *held = self.depth.get().saturating_sub(base);
        self.depth.set(base);

        match poll {
            Poll::Ready(value) => Poll::Ready(Turn::Done(value)),
            Poll::Pending => {
                let mut tasks = self.tasks.borrow_mut();
                match tasks.parked.take() {
                    Some(slot) => {
                        tasks.waiting.insert(id, slot.clone());
                        Poll::Ready(Turn::Parked(slot))
                    }
                    None => Poll::Pending,
                }
            }
        }
    }

    async fn drive(&self, id: TaskId, mut task: Task) {
        let turn = poll_fn(|cx| self.poll_turn(id, &mut task.held, task.future.as_mut(), cx)).await;
        if let Turn::Parked(_) = turn {
            self.tasks.borrow_mut().suspended.insert(id, task);
        }
    }

    /// Run an async function body until it finishes or first parks.
    pub(crate) async fn start_task(&self, body: LocalBoxFuture<'static, ()>) {
        let id = self.tasks.borrow_mut().next_id();
        self.drive(id, Task { future: body, held: 0 }).await;
    }

    /// Hand `outcome` to the parked task `id` and continue it.
    pub(crate) async fn resume_task(&self, id: TaskId, outcome: Result<Value, Value>) {
        let (slot, task) = {
            let mut tasks = self.tasks.borrow_mut();
            (tasks.waiting.remove(&id), tasks.suspended.remove(&id))
        };
        let Some(slot) = slot else {
            return;
        };
        *slot.borrow_mut() = Some(outcome);
        // Top-level bodies are polled by their own loop in `run_toplevel`.
        if let Some(task) = task {
            self.drive(id, task).await;
        }
    }

    /// `await value`: park the running task until `value` settles.
    pub async fn await_value(&self, value: Value) -> JsResult<Value> {
        let Some(task) = self.tasks.borrow().current else {
            return Err(self.error(
                ErrorKind::SyntaxError,
                "await is only valid in async functions and the top level bodies of modules",
            ));
        };
        let promise = self.resolved_promise(value);
        self.add_reaction(&promise, Reaction::Resume(task));
        Suspend {
            interp: self,
            slot: Slot::default(),
        }
        .await
        .map_err(JsError::new)
    }

    /// Run top-level code as a task. While it is parked, microtasks and
    /// timers run until its `await` is answered.
    pub(crate) async fn run_toplevel(
        &self,
        mut body: LocalBoxFuture<'_, JsResult<Value>>,
    ) -> JsResult<Value> {
        let id = self.tasks.borrow_mut().next_id();
        let mut held = 0;
        loop {
            let turn = poll_fn(|cx| self.poll_turn(id, &mut held, body.as_mut(), cx)).await;
            let slot = match turn {
                Turn::Done(result) => return result,
                Turn::Parked(slot) => slot,
            };
            while slot.borrow().is_none() {
                if self.run_microtask().await {
                    continue;
                }
                if !self.run_next_timer().await {
                    self.tasks.borrow_mut().waiting.remove(&id);
                    self.depth.set(self.depth.get() + held);
                    drop(body);
                    return Err(self.error(ErrorKind::Error, "Detected unsettled top-level await"));
                }
            }
        }
    }

    /// Drive the event loop until `value` settles, for host code holding a
    /// promise.
    pub async fn run_until_settled(&self, value: Value) -> JsResult<Value> {
        self.run_toplevel(Box::pin(self.await_value(value))).await
    }

    /// Drop parked tasks. Once the event loop has run dry nothing can
    /// resume them.
    pub fn discard_tasks(&self) {
        let suspended = {
            let mut tasks = self.tasks.borrow_mut();
            tasks.waiting.clear();
            std::mem::take(&mut tasks.suspended)
        };
        if !suspended.is_empty() {
            debug!(count = suspended.len(), "discarding suspended async functions");
        }
        for task in suspended.into_values() {
            // Their call guards release on drop.
            self.depth.set(self.depth.get() + task.held);
            drop(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::js::interp::test_support::eval_string;
    use crate::js::interp::{Interpreter, Options};
    use crate::js::parser;

    #[tokio::test]
    async fn callers_continue_before_the_awaiting_body() {
        let out = eval_string(
            r#"
            const log = []
            async function a() { log.push('a1'); await null; log.push('a2') }
            a()
            log.push('main')
            await null
            await null
            return log.join()
            "#,
        )
        .await;
        assert_eq!(out, "a1,main,a2");
    }

    #[tokio::test]
    async fn resumes_interleave_with_reactions() {
        let out = eval_string(
            r#"
            const log = []
            Promise.resolve().then(() => log.push('then'))
            ;(async () => { await 0; log.push('async') })()
            log.push('sync')
            await new Promise(r => setTimeout(r, 0))
            return log.join()
            "#,
        )
        .await;
        assert_eq!(out, "sync,then,async");
    }

    #[tokio::test]
    async fn two_bodies_take_turns() {
        let out = eval_string(
            r#"
            const log = []
            async function worker(name) {
              for (let i = 0; i < 3; i++) { log.push(name + i); await null }
            }
            await Promise.all([worker('a'), worker('b')])
            return log.join()
            "#,
        )
        .await;
        assert_eq!(out, "a0,b0,a1,b1,a2,b2");
    }

    #[tokio::test]
    async fn polling_until_a_later_timer_fires() {
        let out = eval_string(
            r#"
            const sleep = ms => new Promise(r => setTimeout(r, ms))
            let done = false
            let polls = 0
            async function waitForDone() { while (!done) { polls++; await sleep(10) } return polls }
            const result = waitForDone()
            setTimeout(() => { done = true }, 50)
            return await result
            "#,
        )
        .await;
        assert_eq!(out, "5");
    }

    #[tokio::test]
    async fn rejections_reach_the_caller() {
        let out = eval_string(
            r#"
            async function fail() { await null; throw new TypeError('late') }
            try { await fail() } catch (e) { return e.name + ':' + e.message }
            "#,
        )
        .await;
        assert_eq!(out, "TypeError:late");
    }

    #[tokio::test]
    async fn top_level_await_that_never_settles() {
        let out = eval_string("await new Promise(() => {})").await;
        assert_eq!(out, "threw Error: Detected unsettled top-level await");
    }

    #[tokio::test]
    async fn host_code_waits_for_a_promise() {
        let interp = Interpreter::new(Options::default());
        let program = parser::parse("new Promise(r => setTimeout(() => r('ready'), 30))").unwrap();
        let promise = interp.run_script(&program).await.unwrap();
        let value = interp.run_until_settled(promise).await.unwrap();
        assert_eq!(value.to_display_string(), "ready");
    }

    #[tokio::test]
    async fn parked_bodies_are_discarded_after_the_loop() {
        let interp = Interpreter::new(Options::default());
        let program = parser::parse("(async () => { await new Promise(() => {}) })()").unwrap();
        interp.run_script(&program).await.unwrap();
        assert_eq!(interp.tasks.borrow().suspended(), 1);
        interp.run_event_loop().await;
        assert_eq!(interp.tasks.borrow().suspended(), 0);
    }
}
