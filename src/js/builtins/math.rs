//! js::builtins::math
//!
//! `Math`. `random` is a xorshift generator seeded from the interpreter's
//! start time, so runs with a fixed clock are reproducible.

use std::cell::Cell;
use std::rc::Rc;

use super::arg;
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, sync_fn, Value};

pub fn install(interp: &Interpreter) {
    let math = interp.new_object();
    let constants = [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ];
    for (name, value) in constants {
        math.define_hidden(name, Value::Number(value));
    }

    let unary: [(&str, fn(f64) -> f64); 20] = [
        ("abs", f64::abs),
        ("floor", f64::floor),
        ("ceil", f64::ceil),
        ("round", round),
        ("trunc", f64::trunc),
        ("sign", sign),
        ("sqrt", f64::sqrt),
        ("cbrt", f64::cbrt),
        ("exp", f64::exp),
        ("log", f64::ln),
        ("log2", f64::log2),
        ("log10", f64::log10),
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("fround", |n| f64::from(n as f32)),
        ("expm1", f64::exp_m1),
    ];
    for (name, f) in unary {
        interp.define_method(
            &math,
            name,
            native_fn(move |interp, _, args| {
                Box::pin(async move { Ok(Value::Number(f(interp.to_number(&arg(&args, 0)).await?))) })
            }),
        );
    }

    interp.define_method(
        &math,
        "pow",
        sync_fn(|_, _, args| Ok(Value::Number(arg(&args, 0).to_number().powf(arg(&args, 1).to_number())))),
    );
    interp.define_method(
        &math,
        "atan2",
        sync_fn(|_, _, args| Ok(Value::Number(arg(&args, 0).to_number().atan2(arg(&args, 1).to_number())))),
    );
    interp.define_method(
        &math,
        "hypot",
        sync_fn(|_, _, args| {
            Ok(Value::Number(args.iter().map(|v| v.to_number().powi(2)).sum::<f64>().sqrt()))
        }),
    );
    interp.define_method(
        &math,
        "max",
        sync_fn(|_, _, args| Ok(Value::Number(extreme(&args, f64::NEG_INFINITY, |a, b| a > b)))),
    );
    interp.define_method(
        &math,
        "min",
        sync_fn(|_, _, args| Ok(Value::Number(extreme(&args, f64::INFINITY, |a, b| a < b)))),
    );

    let state = Rc::new(Cell::new(seed(interp.options().start_time_ms)));
    interp.define_method(
        &math,
        "random",
        sync_fn(move |_, _, _| {
            let mut x = state.get();
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            state.set(x);
            Ok(Value::Number((x >> 11) as f64 / (1u64 << 53) as f64))
        }),
    );

    interp.define_global("Math", math);
}

/// `Math.round`: halves round toward positive infinity.
fn round(n: f64) -> f64 {
    if !n.is_finite() || n.fract() == 0.0 {
        return n;
    }
    (n + 0.5).floor()
}

fn sign(n: f64) -> f64 {
    if n.is_nan() || n == 0.0 {
        n
    } else {
        n.signum()
    }
}

fn extreme(args: &[Value], start: f64, better: fn(f64, f64) -> bool) -> f64 {
    let mut best = start;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        if better(n, best) {
            best = n;
        }
    }
    best
}

fn seed(start_time_ms: f64) -> u64 {
    let bits = start_time_ms.to_bits() ^ 0x9E37_79B9_7F4A_7C15;
    if bits == 0 {
        0x2545_F491_4F6C_DD1D
    } else {
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::interp::test_support::eval_string;

    #[test]
    fn rounding_matches_script_semantics() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert_eq!(round(-2.6), -3.0);
        assert_eq!(sign(-3.0), -1.0);
    }

    #[tokio::test]
    async fn min_max() {
        assert_eq!(
            eval_string("return [Math.max(1, 5, 3), Math.min(), Math.max(1, NaN), Math.max(...[4, 2])].join()").await,
            "5,Infinity,NaN,4"
        );
    }

    #[tokio::test]
    async fn random_is_in_unit_interval() {
        assert_eq!(
            eval_string("let ok = true\nfor (let i = 0; i < 100; i++) { const r = Math.random(); if (r < 0 || r >= 1) ok = false }\nreturn ok").await,
            "true"
        );
    }

    #[tokio::test]
    async fn misc() {
        assert_eq!(
            eval_string("return [Math.floor(-1.5), Math.abs(-2), Math.pow(2, 10), Math.sqrt(16), Math.trunc(-4.7), Math.hypot(3, 4)].join()").await,
            "-2,2,1024,4,-4,5"
        );
    }
}
