//! js::builtins::string
//!
//! `String` and `String.prototype`.
//!
//! Positions are UTF-16 code unit offsets, matching `length`. Patterns are
//! plain strings; regular expressions are not part of the language subset.

use super::{arg, define_constructor, relative_index};
use crate::js::error::JsResult;
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, sync_fn, NativeFn, Value};

pub fn install(interp: &Interpreter) {
    let proto = interp.realm().string_proto.clone();
    let ctor = define_constructor(
        interp,
        "String",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                if args.is_empty() {
                    return Ok(Value::from(""));
                }
                Ok(Value::from(interp.to_string(&args[0]).await?))
            })
        }),
        &proto,
    );
    interp.define_method(
        &ctor,
        "fromCharCode",
        sync_fn(|_, _, args| {
            let units: Vec<u16> = args.iter().map(|v| v.to_uint32() as u16).collect();
            Ok(Value::from(String::from_utf16_lossy(&units)))
        }),
    );

    let methods: [(&str, NativeFn); 29] = [
        ("toString", sync_fn(value_of)),
        ("valueOf", sync_fn(value_of)),
        ("charAt", sync_fn(char_at)),
        ("charCodeAt", sync_fn(char_code_at)),
        ("at", sync_fn(at)),
        ("indexOf", sync_fn(index_of)),
        ("lastIndexOf", sync_fn(last_index_of)),
        ("includes", sync_fn(includes)),
        ("startsWith", sync_fn(starts_with)),
        ("endsWith", sync_fn(ends_with)),
        ("slice", sync_fn(slice)),
        ("substring", sync_fn(substring)),
        ("substr", sync_fn(substr)),
        ("toUpperCase", sync_fn(|i, t, _| map_str(i, &t, "toUpperCase", |s| s.to_uppercase()))),
        ("toLowerCase", sync_fn(|i, t, _| map_str(i, &t, "toLowerCase", |s| s.to_lowercase()))),
        ("trim", sync_fn(|i, t, _| map_str(i, &t, "trim", |s| s.trim().to_string()))),
        ("trimStart", sync_fn(|i, t, _| map_str(i, &t, "trimStart", |s| s.trim_start().to_string()))),
        ("trimEnd", sync_fn(|i, t, _| map_str(i, &t, "trimEnd", |s| s.trim_end().to_string()))),
        ("split", sync_fn(split)),
        ("repeat", sync_fn(repeat)),
        ("padStart", sync_fn(|i, t, a| pad(i, &t, &a, true))),
        ("padEnd", sync_fn(|i, t, a| pad(i, &t, &a, false))),
        ("concat", native_fn(|i, t, a| Box::pin(concat(i, t, a)))),
        ("localeCompare", sync_fn(locale_compare)),
        ("replace", native_fn(|i, t, a| Box::pin(replace(i, t, a, false)))),
        ("replaceAll", native_fn(|i, t, a| Box::pin(replace(i, t, a, true)))),
        ("codePointAt", sync_fn(code_point_at)),
        ("normalize", sync_fn(|i, t, _| map_str(i, &t, "normalize", str::to_string))),
        ("toLocaleString", sync_fn(value_of)),
    ];
    for (name, call) in methods {
        interp.define_method(&proto, name, call);
    }
}

fn this_str(interp: &Interpreter, this: &Value, method: &str) -> JsResult<String> {
    match this {
        Value::Undefined | Value::Null => Err(interp.type_error(format!(
            "String.prototype.{method} called on null or undefined"
        ))),
        other => Ok(other.to_display_string()),
    }
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> Value {
    Value::from(String::from_utf16_lossy(units))
}

/// Offset of `needle` in `hay` at or after `from`, in code units.
fn find_units(hay: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(hay.len()));
    }
    if needle.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()] == *needle)
}

fn map_str(
    interp: &Interpreter,
    this: &Value,
    method: &str,
    f: impl FnOnce(&str) -> String,
) -> JsResult<Value> {
    Ok(Value::from(f(&this_str(interp, this, method)?)))
}

fn value_of(interp: &Interpreter, this: Value, _: Vec<Value>) -> JsResult<Value> {
    Ok(Value::from(this_str(interp, &this, "valueOf")?))
}

fn char_at(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "charAt")?);
    let i = arg(&args, 0).to_integer();
    if i < 0.0 || i as usize >= s.len() {
        return Ok(Value::from(""));
    }
    Ok(from_units(&s[i as usize..i as usize + 1]))
}

fn char_code_at(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "charCodeAt")?);
    let i = arg(&args, 0).to_integer();
    if i < 0.0 {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(
        s.get(i as usize).map_or(f64::NAN, |u| f64::from(*u)),
    ))
}

fn code_point_at(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "codePointAt")?);
    let i = arg(&args, 0).to_integer();
    if i < 0.0 || i as usize >= s.len() {
        return Ok(Value::Undefined);
    }
    let point = char::decode_utf16(s[i as usize..].iter().copied())
        .next()
        .map_or(u32::from(s[i as usize]), |c| c.map_or(u32::from(s[i as usize]), u32::from));
    Ok(Value::Number(f64::from(point)))
}

fn at(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "at")?);
    let n = arg(&args, 0).to_integer();
    let i = if n < 0.0 { s.len() as f64 + n } else { n };
    if i < 0.0 || i as usize >= s.len() {
        return Ok(Value::Undefined);
    }
    Ok(from_units(&s[i as usize..i as usize + 1]))
}

fn index_of(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "indexOf")?);
    let needle = units(&arg(&args, 0).to_display_string());
    let from = arg(&args, 1).to_integer().max(0.0) as usize;
    Ok(Value::Number(
        find_units(&s, &needle, from.min(s.len())).map_or(-1.0, |i| i as f64),
    ))
}

fn last_index_of(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "lastIndexOf")?);
    let needle = units(&arg(&args, 0).to_display_string());
    if needle.len() > s.len() {
        return Ok(Value::Number(-1.0));
    }
    let found = (0..=s.len() - needle.len())
        .rev()
        .find(|&i| s[i..i + needle.len()] == *needle);
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn includes(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "includes")?);
    let needle = units(&arg(&args, 0).to_display_string());
    let from = arg(&args, 1).to_integer().max(0.0) as usize;
    Ok(Value::Bool(find_units(&s, &needle, from.min(s.len())).is_some()))
}

fn starts_with(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "startsWith")?);
    let needle = units(&arg(&args, 0).to_display_string());
    let from = (arg(&args, 1).to_integer().max(0.0) as usize).min(s.len());
    Ok(Value::Bool(s[from..].starts_with(&needle)))
}

fn ends_with(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "endsWith")?);
    let needle = units(&arg(&args, 0).to_display_string());
    let end = relative_index(&arg(&args, 1), s.len(), s.len());
    Ok(Value::Bool(s[..end].ends_with(&needle)))
}

fn slice(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "slice")?);
    let start = relative_index(&arg(&args, 0), s.len(), 0);
    let end = relative_index(&arg(&args, 1), s.len(), s.len());
    Ok(if start < end { from_units(&s[start..end]) } else { Value::from("") })
}

fn substring(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "substring")?);
    let clamp = |v: &Value, default: usize| {
        if v.is_undefined() {
            default
        } else {
            (v.to_integer().max(0.0) as usize).min(s.len())
        }
    };
    let a = clamp(&arg(&args, 0), 0);
    let b = clamp(&arg(&args, 1), s.len());
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(from_units(&s[start..end]))
}

fn substr(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = units(&this_str(interp, &this, "substr")?);
    let start = relative_index(&arg(&args, 0), s.len(), 0);
    let len = match arg(&args, 1) {
        Value::Undefined => s.len() - start,
        n => (n.to_integer().max(0.0) as usize).min(s.len() - start),
    };
    Ok(from_units(&s[start..start + len]))
}

fn split(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = this_str(interp, &this, "split")?;
    let limit = match arg(&args, 1) {
        Value::Undefined => usize::MAX,
        n => n.to_uint32() as usize,
    };
    let parts: Vec<Value> = match arg(&args, 0) {
        Value::Undefined => vec![Value::from(s)],
        sep => {
            let sep = sep.to_display_string();
            if sep.is_empty() {
                s.chars().map(|c| Value::from(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::from).collect()
            }
        }
    };
    let parts = parts.into_iter().take(limit).collect();
    Ok(Value::from(interp.new_array(parts)))
}

fn repeat(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = this_str(interp, &this, "repeat")?;
    let n = arg(&args, 0).to_integer();
    if n < 0.0 || n.is_infinite() {
        return Err(interp.range_error(format!(
            "Invalid count value: {}",
            crate::js::value::number_to_string(n)
        )));
    }
    Ok(Value::from(s.repeat(n as usize)))
}

fn pad(interp: &Interpreter, this: &Value, args: &[Value], start: bool) -> JsResult<Value> {
    let s = this_str(interp, this, if start { "padStart" } else { "padEnd" })?;
    let target = arg(args, 0).to_integer().max(0.0) as usize;
    let filler = match arg(args, 1) {
        Value::Undefined => " ".to_string(),
        f => f.to_display_string(),
    };
    let current = s.encode_utf16().count();
    if target <= current || filler.is_empty() {
        return Ok(Value::from(s));
    }
    let fill: Vec<u16> = filler.encode_utf16().cycle().take(target - current).collect();
    let fill = String::from_utf16_lossy(&fill);
    Ok(Value::from(if start { fill + &s } else { s + &fill }))
}

async fn concat(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let mut s = this_str(interp, &this, "concat")?;
    for value in &args {
        s.push_str(&interp.to_string(value).await?);
    }
    Ok(Value::from(s))
}

fn locale_compare(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let s = this_str(interp, &this, "localeCompare")?;
    let other = arg(&args, 0).to_display_string();
    Ok(Value::Number(match s.cmp(&other) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }))
}

/// Expand `$&` and `$$` in a replacement string.
fn expand_replacement(template: &str, matched: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                    continue;
                }
                Some('&') => {
                    chars.next();
                    out.push_str(matched);
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

async fn replace(interp: &Interpreter, this: Value, args: Vec<Value>, all: bool) -> JsResult<Value> {
    let method = if all { "replaceAll" } else { "replace" };
    let s = this_str(interp, &this, method)?;
    let pattern = interp.to_string(&arg(&args, 0)).await?;
    let replacement = arg(&args, 1);
    let hay = units(&s);
    let needle = units(&pattern);

    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    let mut search = 0;
    while let Some(found) = find_units(&hay, &needle, search) {
        out.push_str(&String::from_utf16_lossy(&hay[pos..found]));
        let piece = if replacement.is_callable() {
            let result = interp
                .call(
                    &replacement,
                    Value::Undefined,
                    vec![Value::from(pattern.as_str()), Value::from(found), Value::from(s.as_str())],
                )
                .await?;
            interp.to_string(&result).await?
        } else {
            expand_replacement(&interp.to_string(&replacement).await?, &pattern)
        };
        out.push_str(&piece);
        pos = found + needle.len();
        if !all {
            break;
        }
        search = if needle.is_empty() { found + 1 } else { pos };
        if search > hay.len() {
            break;
        }
    }
    if pos <= hay.len() {
        out.push_str(&String::from_utf16_lossy(&hay[pos..]));
    }
    Ok(Value::from(out))
}

#[cfg(test)]
mod tests {
    use crate::js::interp::test_support::eval_string;

    #[tokio::test]
    async fn case_and_trim() {
        assert_eq!(
            eval_string("return ['  Hi  '.trim(), 'abc'.toUpperCase(), 'ABC'.toLowerCase(), ' x'.trimStart() + '|'].join(',')").await,
            "Hi,ABC,abc,x|"
        );
    }

    #[tokio::test]
    async fn searching() {
        assert_eq!(
            eval_string("const s = 'hello world'\nreturn [s.indexOf('o'), s.lastIndexOf('o'), s.includes('lo w'), s.startsWith('hell'), s.endsWith('world'), s.indexOf('zz')].join()").await,
            "4,7,true,true,true,-1"
        );
    }

    #[tokio::test]
    async fn slicing() {
        assert_eq!(
            eval_string("const s = 'abcdef'\nreturn [s.slice(1, 3), s.slice(-2), s.substring(4, 1), s.charAt(2), s.at(-1), s.substr(2, 2)].join()").await,
            "bc,ef,bcd,c,f,cd"
        );
    }

    #[tokio::test]
    async fn split_and_join() {
        assert_eq!(
            eval_string("return ['a,b,,c'.split(',').length, 'abc'.split('').join('-'), 'a b c'.split(' ', 2).join()].join('|')").await,
            "4|a-b-c|a,b"
        );
    }

    #[tokio::test]
    async fn replacing() {
        assert_eq!(
            eval_string("return ['a-b-c'.replace('-', '+'), 'a-b-c'.replaceAll('-', '+'), 'x'.replace('x', '[$&]'), 'aXbX'.replaceAll('X', (m, i) => i)].join(' ')").await,
            "a+b-c a+b+c [x] a1b3"
        );
    }

    #[tokio::test]
    async fn padding_and_repeat() {
        assert_eq!(
            eval_string("return ['5'.padStart(3, '0'), 'ab'.padEnd(5, 'xy'), 'ha'.repeat(3)].join()").await,
            "005,abxyx,hahaha"
        );
        assert!(eval_string("return 'x'.repeat(-1)").await.starts_with("threw RangeError"));
    }

    #[tokio::test]
    async fn length_counts_code_units() {
        assert_eq!(eval_string("return '😀a'.length").await, "3");
    }
}
