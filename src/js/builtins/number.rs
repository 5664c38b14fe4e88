//! js::builtins::number
//!
//! `Number`, `Boolean`, and the global numeric helpers (`parseInt`,
//! `parseFloat`, `isNaN`, `isFinite`).

use super::{arg, define_constructor};
use crate::js::error::JsResult;
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, number_to_string, sync_fn, Value};

pub fn install(interp: &Interpreter) {
    let proto = interp.realm().number_proto.clone();
    let ctor = define_constructor(
        interp,
        "Number",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                if args.is_empty() {
                    return Ok(Value::Number(0.0));
                }
                Ok(Value::Number(interp.to_number(&args[0]).await?))
            })
        }),
        &proto,
    );

    let constants = [
        ("MAX_SAFE_INTEGER", 9_007_199_254_740_991.0),
        ("MIN_SAFE_INTEGER", -9_007_199_254_740_991.0),
        ("EPSILON", f64::EPSILON),
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ];
    for (name, value) in constants {
        ctor.define_hidden(name, Value::Number(value));
    }

    let parse_int = interp.new_function("parseInt", sync_fn(|_, _, args| {
        let radix = arg(&args, 1).to_int32();
        Ok(Value::Number(parse_int(&arg(&args, 0).to_display_string(), radix)))
    }));
    let parse_float = interp.new_function("parseFloat", sync_fn(|_, _, args| {
        Ok(Value::Number(parse_float(&arg(&args, 0).to_display_string())))
    }));
    ctor.define_hidden("parseInt", Value::from(parse_int.clone()));
    ctor.define_hidden("parseFloat", Value::from(parse_float.clone()));
    interp.define_global("parseInt", parse_int);
    interp.define_global("parseFloat", parse_float);

    let is_integer = |n: &Value| matches!(n, Value::Number(n) if n.is_finite() && n.fract() == 0.0);
    interp.define_method(
        &ctor,
        "isInteger",
        sync_fn(move |_, _, args| Ok(Value::Bool(is_integer(&arg(&args, 0))))),
    );
    interp.define_method(
        &ctor,
        "isSafeInteger",
        sync_fn(move |_, _, args| {
            let n = arg(&args, 0);
            Ok(Value::Bool(
                is_integer(&n) && n.to_number().abs() <= 9_007_199_254_740_991.0,
            ))
        }),
    );
    interp.define_method(
        &ctor,
        "isFinite",
        sync_fn(|_, _, args| Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite())))),
    );
    interp.define_method(
        &ctor,
        "isNaN",
        sync_fn(|_, _, args| Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan())))),
    );
    interp.define_global(
        "isNaN",
        interp.new_function(
            "isNaN",
            native_fn(|interp, _, args| {
                Box::pin(async move { Ok(Value::Bool(interp.to_number(&arg(&args, 0)).await?.is_nan())) })
            }),
        ),
    );
    interp.define_global(
        "isFinite",
        interp.new_function(
            "isFinite",
            native_fn(|interp, _, args| {
                Box::pin(async move {
                    Ok(Value::Bool(interp.to_number(&arg(&args, 0)).await?.is_finite()))
                })
            }),
        ),
    );

    interp.define_method(
        &proto,
        "toString",
        sync_fn(|interp, this, args| {
            let n = this_number(interp, &this, "toString")?;
            let radix = match arg(&args, 0) {
                Value::Undefined => 10,
                r => r.to_integer() as i64,
            };
            if !(2..=36).contains(&radix) {
                return Err(interp.range_error("toString() radix must be between 2 and 36"));
            }
            Ok(Value::from(Interpreter::number_to_radix(n, radix as u32)))
        }),
    );
    interp.define_method(
        &proto,
        "toFixed",
        sync_fn(|interp, this, args| {
            let n = this_number(interp, &this, "toFixed")?;
            let digits = arg(&args, 0).to_integer();
            if !(0.0..=100.0).contains(&digits) {
                return Err(interp.range_error("toFixed() digits argument must be between 0 and 100"));
            }
            if !n.is_finite() || n.abs() >= 1e21 {
                return Ok(Value::from(number_to_string(n)));
            }
            Ok(Value::from(format!("{:.*}", digits as usize, n)))
        }),
    );
    interp.define_method(
        &proto,
        "valueOf",
        sync_fn(|interp, this, _| Ok(Value::Number(this_number(interp, &this, "valueOf")?))),
    );
    interp.define_method(
        &proto,
        "toLocaleString",
        sync_fn(|interp, this, _| {
            let n = this_number(interp, &this, "toLocaleString")?;
            Ok(Value::from(group_thousands(n)))
        }),
    );

    let bool_proto = interp.realm().boolean_proto.clone();
    define_constructor(
        interp,
        "Boolean",
        sync_fn(|_, _, args| Ok(Value::Bool(arg(&args, 0).truthy()))),
        &bool_proto,
    );
    let bool_to_string = sync_fn(|interp, this, _| match this {
        Value::Bool(b) => Ok(Value::from(b.to_string())),
        _ => Err(interp.type_error("Boolean.prototype.toString requires that 'this' be a Boolean")),
    });
    interp.define_method(&bool_proto, "toString", bool_to_string);
    interp.define_method(
        &bool_proto,
        "valueOf",
        sync_fn(|interp, this, _| match this {
            Value::Bool(_) => Ok(this),
            _ => Err(interp.type_error("Boolean.prototype.valueOf requires that 'this' be a Boolean")),
        }),
    );
}

fn this_number(interp: &Interpreter, this: &Value, method: &str) -> JsResult<f64> {
    match this {
        Value::Number(n) => Ok(*n),
        _ => Err(interp.type_error(format!(
            "Number.prototype.{method} requires that 'this' be a Number"
        ))),
    }
}

/// `parseInt`: the longest digit prefix in `radix` (0 means auto).
pub fn parse_int(input: &str, radix: i32) -> f64 {
    let s = input.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut radix = radix;
    let mut digits = s;
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            digits = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value = 0.0;
    let mut any = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix as u32) else {
            break;
        };
        value = value * f64::from(radix) + f64::from(d);
        any = true;
    }
    match (any, negative) {
        (false, _) => f64::NAN,
        (true, true) => -value,
        (true, false) => value,
    }
}

/// `parseFloat`: the longest decimal-literal prefix.
pub fn parse_float(input: &str) -> f64 {
    let s = input.trim_start();
    for (literal, value) in [
        ("Infinity", f64::INFINITY),
        ("+Infinity", f64::INFINITY),
        ("-Infinity", f64::NEG_INFINITY),
    ] {
        if s.starts_with(literal) {
            return value;
        }
    }
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || s[digits_start..end] == *"." {
        return f64::NAN;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

/// `1234567.5` as `1,234,567.5`.
fn group_thousands(n: f64) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let rounded = (n * 1000.0).round() / 1000.0;
    let text = number_to_string(rounded.abs());
    let (int, frac) = text.split_once('.').map_or((text.as_str(), None), |(i, f)| (i, Some(f)));
    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if let Some(frac) = frac {
        grouped.push('.');
        grouped.push_str(frac);
    }
    if rounded < 0.0 {
        grouped.insert(0, '-');
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::interp::test_support::eval_string;

    #[test]
    fn parse_int_prefixes() {
        assert_eq!(parse_int("42px", 10), 42.0);
        assert_eq!(parse_int("  -0x1f", 0), -31.0);
        assert_eq!(parse_int("101", 2), 5.0);
        assert!(parse_int("px", 10).is_nan());
        assert!(parse_int("1", 40).is_nan());
    }

    #[test]
    fn parse_float_prefixes() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("  -2.5e3x"), -2500.0);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("1e"), 1.0);
        assert!(parse_float(".").is_nan());
        assert_eq!(parse_float("Infinityx"), f64::INFINITY);
    }

    #[test]
    fn thousands() {
        assert_eq!(group_thousands(1234567.5), "1,234,567.5");
        assert_eq!(group_thousands(-999.0), "-999");
    }

    #[tokio::test]
    async fn conversions() {
        assert_eq!(
            eval_string("return [Number('12'), Number(''), Number('x'), String(12.5), Boolean(''), Boolean('a')].join()").await,
            "12,0,NaN,12.5,false,true"
        );
    }

    #[tokio::test]
    async fn formatting() {
        assert_eq!(
            eval_string("return [(3.14159).toFixed(2), (255).toString(16), (10).toString(2), (1.005).toFixed(0)].join()").await,
            "3.14,ff,1010,1"
        );
    }

    #[tokio::test]
    async fn predicates() {
        assert_eq!(
            eval_string("return [isNaN('x'), Number.isNaN('x'), Number.isInteger(5), Number.isInteger(5.5), isFinite('12'), Number.MAX_SAFE_INTEGER].join()").await,
            "true,false,true,false,true,9007199254740991"
        );
    }
}
