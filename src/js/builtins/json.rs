//! js::builtins::json
//!
//! `JSON.stringify` / `JSON.parse`, implemented by converting between script
//! values and `serde_json::Value`.
//!
//! # Design
//!
//! Serialization goes through `serde_json` (with `preserve_order`, so keys
//! keep insertion order). Integral numbers are emitted as integers, non-finite
//! numbers as `null`, and `undefined`/functions are dropped from objects and
//! become `null` inside arrays. Objects with a callable `toJSON` are replaced
//! by its result, which is how dates serialize.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Number};

use super::arg;
use crate::js::error::{ErrorKind, JsResult};
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, sync_fn, LocalBoxFuture, ObjectKind, Value};

/// Largest integer magnitude emitted without a fractional part.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

pub fn install(interp: &Interpreter) {
    let json = interp.new_object();
    interp.define_method(
        &json,
        "stringify",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                let indent = indent_of(&arg(&args, 2));
                Ok(stringify(interp, &arg(&args, 0), indent.as_deref())
                    .await?
                    .map_or(Value::Undefined, Value::from))
            })
        }),
    );
    interp.define_method(
        &json,
        "parse",
        sync_fn(|interp, _, args| parse(interp, &arg(&args, 0).to_display_string())),
    );
    interp.define_global("JSON", json);
}

/// The `space` argument of `JSON.stringify` as an indent string.
fn indent_of(space: &Value) -> Option<String> {
    let indent = match space {
        Value::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => return None,
    };
    (!indent.is_empty()).then_some(indent)
}

/// `JSON.stringify(value, null, indent)`. `None` when the value has no JSON
/// form (`undefined`, functions).
pub async fn stringify(
    interp: &Interpreter,
    value: &Value,
    indent: Option<&str>,
) -> JsResult<Option<String>> {
    let mut stack = Vec::new();
    let Some(json) = to_json(interp, value.clone(), "", &mut stack).await? else {
        return Ok(None);
    };
    let text = match indent {
        None => serde_json::to_string(&json),
        Some(indent) => {
            let mut out = Vec::new();
            let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
            json.serialize(&mut ser)
                .map(|()| String::from_utf8_lossy(&out).into_owned())
        }
    };
    text.map(Some)
        .map_err(|e| interp.type_error(format!("Failed to serialize JSON: {e}")))
}

/// Convert a script value to JSON, tracking the objects being visited.
pub fn to_json<'a>(
    interp: &'a Interpreter,
    value: Value,
    key: &'a str,
    stack: &'a mut Vec<usize>,
) -> LocalBoxFuture<'a, JsResult<Option<serde_json::Value>>> {
    Box::pin(async move {
        let value = match &value {
            Value::Object(obj) if !obj.is_callable() => {
                let to_json_fn = interp.get(&value, "toJSON").await?;
                if to_json_fn.is_callable() {
                    interp.call(&to_json_fn, value.clone(), vec![Value::from(key)]).await?
                } else {
                    value
                }
            }
            _ => value,
        };
        let obj = match &value {
            Value::Undefined => return Ok(None),
            Value::Null => return Ok(Some(serde_json::Value::Null)),
            Value::Bool(b) => return Ok(Some(serde_json::Value::Bool(*b))),
            Value::Number(n) => return Ok(Some(number_to_json(*n))),
            Value::String(s) => return Ok(Some(serde_json::Value::String(s.to_string()))),
            Value::Object(obj) if obj.is_callable() => return Ok(None),
            Value::Object(obj) => obj.clone(),
        };

        if stack.contains(&obj.addr()) {
            return Err(interp.type_error("Converting circular structure to JSON"));
        }
        stack.push(obj.addr());

        let bytes = match &obj.borrow().kind {
            ObjectKind::Bytes(bytes) => Some(bytes.clone()),
            _ => None,
        };
        let result = if let Some(bytes) = bytes {
            let mut map = Map::new();
            map.insert("type".into(), serde_json::Value::String("Buffer".into()));
            map.insert(
                "data".into(),
                serde_json::Value::Array(bytes.into_iter().map(serde_json::Value::from).collect()),
            );
            serde_json::Value::Object(map)
        } else if let Some(items) = obj.array_elements() {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let index = i.to_string();
                let json = to_json(interp, item, &index, stack).await?;
                out.push(json.unwrap_or(serde_json::Value::Null));
            }
            serde_json::Value::Array(out)
        } else {
            let mut map = Map::new();
            for (key, item) in interp.entries(&obj).await? {
                if let Some(json) = to_json(interp, item, &key, stack).await? {
                    map.insert(key.to_string(), json);
                }
            }
            serde_json::Value::Object(map)
        };

        stack.pop();
        Ok(Some(result))
    })
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < MAX_EXACT_INT {
        return serde_json::Value::from(n as i64);
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// `JSON.parse(text)`.
pub fn parse(interp: &Interpreter, text: &str) -> JsResult<Value> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => Ok(from_json(interp, &json)),
        Err(e) if e.is_eof() => Err(interp.error(ErrorKind::SyntaxError, "Unexpected end of JSON input")),
        Err(e) => Err(interp.error(
            ErrorKind::SyntaxError,
            format!(
                "Unexpected token in JSON at line {} column {}",
                e.line(),
                e.column()
            ),
        )),
    }
}

/// Build script values from parsed JSON.
pub fn from_json(interp: &Interpreter, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => Value::from(
            interp.new_array(items.iter().map(|item| from_json(interp, item)).collect()),
        ),
        serde_json::Value::Object(map) => {
            let obj = interp.new_object();
            for (key, item) in map {
                obj.set_own(key.as_str(), from_json(interp, item));
            }
            Value::from(obj)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::interp::test_support::eval_string;
    use crate::js::interp::Options;

    mod stringify {
        use super::*;

        #[tokio::test]
        async fn compact_output_keeps_key_order() {
            assert_eq!(
                eval_string("return JSON.stringify({ b: 1, a: [1, 'x', null, undefined], c: undefined, d: 1.5, f() {} })").await,
                r#"{"b":1,"a":[1,"x",null,null],"d":1.5}"#
            );
        }

        #[tokio::test]
        async fn pretty_output() {
            assert_eq!(
                eval_string("return JSON.stringify({ a: 1, b: [] }, null, 2)").await,
                "{\n  \"a\": 1,\n  \"b\": []\n}"
            );
        }

        #[tokio::test]
        async fn non_finite_numbers_become_null() {
            assert_eq!(eval_string("return JSON.stringify([NaN, Infinity, -0])").await, "[null,null,0]");
        }

        #[tokio::test]
        async fn to_json_is_honored() {
            assert_eq!(
                eval_string("return JSON.stringify({ when: new Date(0), x: { toJSON() { return 'X' } } })").await,
                r#"{"when":"1970-01-01T00:00:00.000Z","x":"X"}"#
            );
        }

        #[tokio::test]
        async fn cycles_are_rejected() {
            assert_eq!(
                eval_string("const a = {}\na.self = a\nreturn JSON.stringify(a)").await,
                "threw TypeError: Converting circular structure to JSON"
            );
        }

        #[tokio::test]
        async fn shared_references_are_not_cycles() {
            assert_eq!(
                eval_string("const s = { v: 1 }\nreturn JSON.stringify([s, s])").await,
                r#"[{"v":1},{"v":1}]"#
            );
        }

        #[tokio::test]
        async fn top_level_undefined() {
            assert_eq!(eval_string("return typeof JSON.stringify(undefined)").await, "undefined");
        }
    }

    mod parse {
        use super::*;

        #[tokio::test]
        async fn builds_objects_and_arrays() {
            assert_eq!(
                eval_string(r#"const v = JSON.parse('{"a":[1,2,{"b":true}],"c":null}')
return [v.a.length, v.a[2].b, v.c === null].join()"#)
                .await,
                "3,true,true"
            );
        }

        #[tokio::test]
        async fn syntax_errors() {
            assert!(eval_string("return JSON.parse('{')")
                .await
                .starts_with("threw SyntaxError: Unexpected end of JSON input"));
            assert!(eval_string("return JSON.parse('{]')")
                .await
                .starts_with("threw SyntaxError: Unexpected token"));
        }

        #[test]
        fn from_json_round_trips_structure() {
            let interp = Interpreter::new(Options::default());
            let json: serde_json::Value = serde_json::from_str(r#"{"name":"x","n":[1]}"#).unwrap();
            let value = from_json(&interp, &json);
            let obj = value.as_object().unwrap();
            assert_eq!(obj.own_keys(), vec!["name", "n"]);
        }
    }
}
