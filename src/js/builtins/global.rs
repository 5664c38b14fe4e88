//! js::builtins::global
//!
//! Value globals and the timer functions.

use super::arg;
use crate::js::interp::{describe, Interpreter};
use crate::js::timers::delay_ms;
use crate::js::value::{sync_fn, Value};

pub fn install(interp: &Interpreter) {
    interp.define_global("undefined", Value::Undefined);
    interp.define_global("NaN", Value::Number(f64::NAN));
    interp.define_global("Infinity", Value::Number(f64::INFINITY));

    for (name, repeat) in [("setTimeout", false), ("setInterval", true)] {
        let call = sync_fn(move |interp, _, args| {
            let callback = arg(&args, 0);
            if !callback.is_callable() {
                return Err(interp.error_with_code(
                    format!(
                        "The \"callback\" argument must be of type function. Received {}",
                        describe(&callback)
                    ),
                    "ERR_INVALID_ARG_TYPE",
                ));
            }
            let delay = delay_ms(&arg(&args, 1));
            let extra = args.into_iter().skip(2).collect();
            let id = interp.set_timer(callback, extra, delay, repeat);
            Ok(Value::Number(f64::from(id)))
        });
        interp.define_global(name, interp.new_function(name, call));
    }
    for name in ["clearTimeout", "clearInterval"] {
        let call = sync_fn(|interp, _, args| {
            if let Value::Number(id) = arg(&args, 0) {
                if id >= 0.0 && id <= f64::from(u32::MAX) {
                    interp.clear_timer(id as u32);
                }
            }
            Ok(Value::Undefined)
        });
        interp.define_global(name, interp.new_function(name, call));
    }
    interp.define_global(
        "setImmediate",
        interp.new_function(
            "setImmediate",
            sync_fn(|interp, _, args| {
                let mut args = args.into_iter();
                let callback = args.next().unwrap_or_default();
                let id = interp.set_timer(callback, args.collect(), 0, false);
                Ok(Value::Number(f64::from(id)))
            }),
        ),
    );
    interp.define_global(
        "queueMicrotask",
        interp.new_function(
            "queueMicrotask",
            sync_fn(|interp, _, args| {
                let ready = interp.resolved_promise(Value::Undefined);
                interp.promise_then(&ready, arg(&args, 0), Value::Undefined);
                Ok(Value::Undefined)
            }),
        ),
    );
}

#[cfg(test)]
mod tests {
    use crate::js::interp::test_support::eval_string;

    #[tokio::test]
    async fn timeout_passes_extra_arguments() {
        assert_eq!(
            eval_string("let got = ''\nsetTimeout((a, b) => { got = a + b }, 5, 'x', 'y')\nawait new Promise(r => setTimeout(r, 10))\nreturn got").await,
            "xy"
        );
    }

    #[tokio::test]
    async fn cleared_timeouts_never_fire() {
        assert_eq!(
            eval_string("let fired = false\nconst id = setTimeout(() => { fired = true }, 5)\nclearTimeout(id)\nawait new Promise(r => setTimeout(r, 10))\nreturn fired").await,
            "false"
        );
    }

    #[tokio::test]
    async fn microtasks_before_immediates() {
        assert_eq!(
            eval_string("const log = []\nsetImmediate(() => log.push('immediate'))\nqueueMicrotask(() => log.push('micro'))\nawait new Promise(r => setTimeout(r, 1))\nreturn log.join()").await,
            "micro,immediate"
        );
    }

    #[tokio::test]
    async fn non_function_callback() {
        assert!(eval_string("setTimeout('code', 1)")
            .await
            .contains("The \"callback\" argument must be of type function"));
    }
}
