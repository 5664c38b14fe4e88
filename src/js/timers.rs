//! js::timers
//!
//! Virtual-clock timers and the event loop.
//!
//! Time never passes on its own: when no microtask is runnable, the loop
//! jumps the clock to the earliest due timer and fires it. Timers due at the
//! same instant fire in scheduling order.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::error::JsError;
use super::interp::Interpreter;
use super::value::Value;

struct Timer {
    id: u32,
    callback: Value,
    args: Vec<Value>,
    /// Repeat period for intervals
    interval: Option<u64>,
}

/// Pending timers ordered by `(due, sequence)`.
#[derive(Default)]
pub struct TimerQueue {
    now: u64,
    seq: u64,
    next_id: u32,
    timers: BTreeMap<(u64, u64), Timer>,
    /// Timer callbacks fired so far
    runs: usize,
}

impl TimerQueue {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    fn schedule(&mut self, delay: u64, timer: Timer) {
        self.seq += 1;
        self.timers.insert((self.now + delay, self.seq), timer);
    }

    /// Add a timer; returns its id.
    pub fn add(&mut self, callback: Value, args: Vec<Value>, delay: u64, repeat: bool) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        let timer = Timer {
            id,
            callback,
            args,
            interval: repeat.then_some(delay.max(1)),
        };
        self.schedule(delay, timer);
        id
    }

    pub fn clear(&mut self, id: u32) {
        self.timers.retain(|_, timer| timer.id != id);
    }

    pub fn clear_all(&mut self) {
        self.timers.clear();
    }

    /// Advance to the earliest timer and take it.
    fn pop(&mut self) -> Option<Timer> {
        let (&key, _) = self.timers.iter().next()?;
        let timer = self.timers.remove(&key)?;
        self.now = self.now.max(key.0);
        self.runs += 1;
        Some(timer)
    }
}

/// Delay argument of `setTimeout`: non-numbers and negatives mean zero.
pub fn delay_ms(value: &Value) -> u64 {
    let n = value.to_number();
    if n.is_finite() && n > 0.0 {
        n as u64
    } else {
        0
    }
}

impl Interpreter {
    pub fn set_timer(&self, callback: Value, args: Vec<Value>, delay: u64, repeat: bool) -> u32 {
        self.timers.borrow_mut().add(callback, args, delay, repeat)
    }

    pub fn clear_timer(&self, id: u32) {
        self.timers.borrow_mut().clear(id);
    }

    /// Drop every pending timer.
    pub fn cancel_timers(&self) {
        self.timers.borrow_mut().clear_all();
    }

    pub(crate) async fn run_microtasks(&self) {
        while self.run_microtask().await {}
    }

    /// Fire the next timer. Returns `false` when none is pending or the run
    /// budget is spent.
    pub(crate) async fn run_next_timer(&self) -> bool {
        let timer = {
            let mut timers = self.timers.borrow_mut();
            if timers.runs >= self.options().max_timer_runs {
                if !timers.is_empty() {
                    warn!(
                        pending = timers.len(),
                        limit = self.options().max_timer_runs,
                        "timer budget exhausted; dropping pending timers"
                    );
                    timers.clear_all();
                }
                return false;
            }
            match timers.pop() {
                Some(timer) => timer,
                None => return false,
            }
        };
        debug!(id = timer.id, "firing timer");
        if let Some(period) = timer.interval {
            let mut timers = self.timers.borrow_mut();
            timers.schedule(
                period,
                Timer {
                    id: timer.id,
                    callback: timer.callback.clone(),
                    args: timer.args.clone(),
                    interval: timer.interval,
                },
            );
        }
        if let Err(err) = self
            .call(&timer.callback, Value::Undefined, timer.args)
            .await
        {
            self.uncaught.borrow_mut().push(err);
        }
        true
    }

    /// Run microtasks and timers until nothing is left, then drop async
    /// functions still parked on promises nobody can settle.
    pub async fn run_event_loop(&self) {
        loop {
            self.run_microtasks().await;
            if !self.run_next_timer().await {
                break;
            }
        }
        self.discard_tasks();
    }

    /// Errors thrown from timer callbacks. Clears the record.
    pub fn take_uncaught(&self) -> Vec<JsError> {
        std::mem::take(&mut *self.uncaught.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::interp::test_support::eval_string;
    use crate::js::interp::{test_support::eval_in, Options};

    #[test]
    fn queue_orders_by_due_then_sequence() {
        let mut queue = TimerQueue::default();
        let a = queue.add(Value::from("a"), Vec::new(), 10, false);
        let b = queue.add(Value::from("b"), Vec::new(), 0, false);
        let c = queue.add(Value::from("c"), Vec::new(), 10, false);
        queue.clear(c);
        assert_eq!(queue.pop().map(|t| t.id), Some(b));
        assert_eq!(queue.pop().map(|t| t.id), Some(a));
        assert_eq!(queue.now(), 10);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn delays() {
        assert_eq!(delay_ms(&Value::from(-5.0)), 0);
        assert_eq!(delay_ms(&Value::Undefined), 0);
        assert_eq!(delay_ms(&Value::from("20")), 20);
    }

    #[tokio::test]
    async fn timeouts_fire_in_due_order_after_microtasks() {
        let out = eval_string(
            r#"
            const log = []
            setTimeout(() => log.push('late'), 50)
            setTimeout(() => log.push('early'), 10)
            Promise.resolve().then(() => log.push('micro'))
            await new Promise(resolve => setTimeout(resolve, 100))
            return log.join()
            "#,
        )
        .await;
        assert_eq!(out, "micro,early,late");
    }

    #[tokio::test]
    async fn intervals_until_cleared() {
        let out = eval_string(
            "let n = 0\nconst id = setInterval(() => { if (++n === 3) clearInterval(id) }, 5)\nawait new Promise(r => setTimeout(r, 100))\nreturn n",
        )
        .await;
        assert_eq!(out, "3");
    }

    #[tokio::test]
    async fn runaway_interval_is_bounded() {
        let interp = Interpreter::new(Options {
            max_timer_runs: 25,
            ..Options::default()
        });
        eval_in(&interp, "n = 0\nsetInterval(() => { n++ }, 1)")
            .await
            .unwrap();
        assert_eq!(interp.global().get("n").unwrap().to_number(), 25.0);
    }

    #[tokio::test]
    async fn timer_errors_are_collected() {
        let interp = Interpreter::new(Options::default());
        eval_in(&interp, "setTimeout(() => { throw new Error('tick') }, 0)")
            .await
            .unwrap();
        let uncaught = interp.take_uncaught();
        assert_eq!(uncaught.len(), 1);
        assert_eq!(uncaught[0].message(), "tick");
    }

    #[tokio::test]
    async fn date_now_follows_virtual_clock() {
        let out = eval_string(
            "const t0 = Date.now()\nawait new Promise(r => setTimeout(r, 250))\nreturn Date.now() - t0",
        )
        .await;
        assert_eq!(out, "250");
    }
}
