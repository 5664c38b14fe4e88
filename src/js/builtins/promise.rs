//! js::builtins::promise
//!
//! `Promise` constructor, statics and prototype methods. The settlement
//! machinery itself lives in `js::promise`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{arg, define_constructor};
use crate::js::error::JsResult;
use crate::js::interp::{describe, Interpreter};
use crate::js::promise::PromiseState;
use crate::js::value::{native_fn, sync_fn, Obj, ObjectKind, Value};

pub fn install(interp: &Interpreter) {
    let proto = interp.realm().promise_proto.clone();
    let ctor = define_constructor(
        interp,
        "Promise",
        native_fn(|interp, this, args| Box::pin(construct(interp, this, args))),
        &proto,
    );

    interp.define_method(
        &ctor,
        "resolve",
        sync_fn(|interp, _, args| Ok(Value::from(interp.resolved_promise(arg(&args, 0))))),
    );
    interp.define_method(
        &ctor,
        "reject",
        sync_fn(|interp, _, args| Ok(Value::from(interp.rejected_promise(arg(&args, 0))))),
    );
    interp.define_method(
        &ctor,
        "all",
        native_fn(|interp, _, args| Box::pin(combine(interp, args, Combinator::All))),
    );
    interp.define_method(
        &ctor,
        "allSettled",
        native_fn(|interp, _, args| Box::pin(combine(interp, args, Combinator::AllSettled))),
    );
    interp.define_method(
        &ctor,
        "race",
        native_fn(|interp, _, args| Box::pin(combine(interp, args, Combinator::Race))),
    );

    interp.define_method(
        &proto,
        "then",
        sync_fn(|interp, this, args| {
            let promise = this_promise(interp, &this, "then")?;
            Ok(Value::from(interp.promise_then(&promise, arg(&args, 0), arg(&args, 1))))
        }),
    );
    interp.define_method(
        &proto,
        "catch",
        sync_fn(|interp, this, args| {
            let promise = this_promise(interp, &this, "catch")?;
            Ok(Value::from(interp.promise_then(&promise, Value::Undefined, arg(&args, 0))))
        }),
    );
    interp.define_method(
        &proto,
        "finally",
        sync_fn(|interp, this, args| {
            let promise = this_promise(interp, &this, "finally")?;
            Ok(Value::from(interp.promise_finally(&promise, arg(&args, 0))))
        }),
    );
}

fn this_promise(interp: &Interpreter, this: &Value, method: &str) -> JsResult<Obj> {
    match this.as_object() {
        Some(obj) if obj.is_promise() => Ok(obj.clone()),
        _ => Err(interp.type_error(format!(
            "Method Promise.prototype.{method} called on incompatible receiver {}",
            describe(this)
        ))),
    }
}

/// `new Promise(executor)`: the executor runs synchronously.
async fn construct(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let executor = arg(&args, 0);
    let promise = match &this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Ordinary) => obj.clone(),
        _ => return Err(interp.type_error("Promise constructor cannot be invoked without 'new'")),
    };
    if !executor.is_callable() {
        return Err(interp.type_error(format!(
            "Promise resolver {} is not a function",
            describe(&executor)
        )));
    }
    promise.borrow_mut().kind = ObjectKind::Promise(PromiseState::pending());
    let (resolve, reject) = interp.resolving_functions(&promise);
    if let Err(err) = interp
        .call(&executor, Value::Undefined, vec![resolve, reject.clone()])
        .await
    {
        interp.call(&reject, Value::Undefined, vec![err.value]).await?;
    }
    Ok(this)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Combinator {
    All,
    AllSettled,
    Race,
}

/// Shared bookkeeping for `Promise.all` and `Promise.allSettled`.
struct Gather {
    results: RefCell<Vec<Value>>,
    remaining: Cell<usize>,
    target: Obj,
}

impl Gather {
    fn fill(&self, interp: &Interpreter, index: usize, value: Value) {
        self.results.borrow_mut()[index] = value;
        let left = self.remaining.get() - 1;
        self.remaining.set(left);
        if left == 0 {
            let results = self.results.borrow().clone();
            interp.resolve_promise(&self.target, Value::from(interp.new_array(results)));
        }
    }
}

fn settled_record(interp: &Interpreter, fulfilled: bool, value: Value) -> Value {
    let record = interp.new_object();
    if fulfilled {
        record.set_own("status", Value::from("fulfilled"));
        record.set_own("value", value);
    } else {
        record.set_own("status", Value::from("rejected"));
        record.set_own("reason", value);
    }
    Value::from(record)
}

async fn combine(interp: &Interpreter, args: Vec<Value>, mode: Combinator) -> JsResult<Value> {
    let items = interp.iterate(&arg(&args, 0)).await?;
    let target = interp.new_promise();
    if items.is_empty() && mode != Combinator::Race {
        interp.resolve_promise(&target, Value::from(interp.new_array(Vec::new())));
        return Ok(Value::from(target));
    }
    let gather = Rc::new(Gather {
        results: RefCell::new(vec![Value::Undefined; items.len()]),
        remaining: Cell::new(items.len()),
        target: target.clone(),
    });

    for (index, item) in items.into_iter().enumerate() {
        let promise = interp.resolved_promise(item);
        let (on_fulfilled, on_rejected) = match mode {
            Combinator::All => {
                let gather = gather.clone();
                let target = target.clone();
                (
                    sync_fn(move |interp, _, args| {
                        gather.fill(interp, index, arg(&args, 0));
                        Ok(Value::Undefined)
                    }),
                    sync_fn(move |interp, _, args| {
                        interp.reject_promise(&target, arg(&args, 0));
                        Ok(Value::Undefined)
                    }),
                )
            }
            Combinator::AllSettled => {
                let ok = gather.clone();
                let failed = gather.clone();
                (
                    sync_fn(move |interp, _, args| {
                        ok.fill(interp, index, settled_record(interp, true, arg(&args, 0)));
                        Ok(Value::Undefined)
                    }),
                    sync_fn(move |interp, _, args| {
                        failed.fill(interp, index, settled_record(interp, false, arg(&args, 0)));
                        Ok(Value::Undefined)
                    }),
                )
            }
            Combinator::Race => {
                let win = target.clone();
                let lose = target.clone();
                (
                    sync_fn(move |interp, _, args| {
                        interp.resolve_promise(&win, arg(&args, 0));
                        Ok(Value::Undefined)
                    }),
                    sync_fn(move |interp, _, args| {
                        interp.reject_promise(&lose, arg(&args, 0));
                        Ok(Value::Undefined)
                    }),
                )
            }
        };
        interp.promise_then(
            &promise,
            Value::from(interp.new_function("", on_fulfilled)),
            Value::from(interp.new_function("", on_rejected)),
        );
    }
    Ok(Value::from(target))
}

#[cfg(test)]
mod tests {
    use crate::js::interp::test_support::eval_string;

    #[tokio::test]
    async fn executor_runs_synchronously() {
        assert_eq!(
            eval_string("const log = []\nconst p = new Promise(r => { log.push('exec'); r(1) })\nlog.push('after')\nlog.push(await p)\nreturn log.join()").await,
            "exec,after,1"
        );
    }

    #[tokio::test]
    async fn executor_throw_rejects() {
        assert_eq!(
            eval_string("try { await new Promise(() => { throw new Error('boom') }) } catch (e) { return 'caught ' + e.message }").await,
            "caught boom"
        );
    }

    #[tokio::test]
    async fn all_keeps_input_order() {
        assert_eq!(
            eval_string(
                r#"
                const slow = new Promise(r => setTimeout(() => r('slow'), 20))
                const fast = new Promise(r => setTimeout(() => r('fast'), 5))
                const values = await Promise.all([slow, fast, 3])
                return values.join()
                "#
            )
            .await,
            "slow,fast,3"
        );
    }

    #[tokio::test]
    async fn all_rejects_on_first_failure() {
        assert_eq!(
            eval_string("try { await Promise.all([Promise.resolve(1), Promise.reject(new Error('no'))]) } catch (e) { return e.message }").await,
            "no"
        );
    }

    #[tokio::test]
    async fn all_settled_and_race() {
        assert_eq!(
            eval_string(
                r#"
                const settled = await Promise.allSettled([Promise.resolve(1), Promise.reject('x')])
                const winner = await Promise.race([new Promise(r => setTimeout(() => r('b'), 10)), new Promise(r => setTimeout(() => r('a'), 1))])
                return settled.map(s => s.status).join() + '|' + winner
                "#
            )
            .await,
            "fulfilled,rejected|a"
        );
    }

    #[tokio::test]
    async fn empty_all_resolves() {
        assert_eq!(eval_string("return (await Promise.all([])).length").await, "0");
    }

    #[tokio::test]
    async fn without_new() {
        assert!(eval_string("Promise(() => {})").await.starts_with("threw TypeError"));
    }
}
