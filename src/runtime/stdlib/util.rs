//! The `util` module: `format`, `inspect`, `promisify`.

use crate::js::builtins::{arg, callback, json};
use crate::js::value::number_to_string;
use crate::js::{native_fn, sync_fn, Interpreter, JsResult, Obj, Value};
use crate::runtime::console::format_values;

/// printf-style formatting with `%s`, `%d`, `%j` and `%%`.
///
/// A placeholder without a matching argument stays as written; arguments
/// beyond the placeholders are dropped. A non-string first argument formats
/// every argument the way `console.log` does.
pub async fn format(interp: &Interpreter, args: &[Value]) -> JsResult<String> {
    let Some(Value::String(template)) = args.first() else {
        return format_values(interp, args).await;
    };
    let mut rest = args[1..].iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(spec @ ('s' | 'd' | 'j')) => {
                chars.next();
                match rest.next() {
                    Some(value) => out.push_str(&substitute(interp, spec, value).await?),
                    None => {
                        out.push('%');
                        out.push(spec);
                    }
                }
            }
            _ => out.push('%'),
        }
    }
    Ok(out)
}

async fn substitute(interp: &Interpreter, spec: char, value: &Value) -> JsResult<String> {
    match spec {
        'd' => Ok(number_to_string(interp.to_number(value).await?)),
        'j' => Ok(match json::stringify(interp, value, None).await {
            Ok(Some(text)) => text,
            Ok(None) => "undefined".to_string(),
            Err(_) => "[Circular]".to_string(),
        }),
        _ => interp.to_string(value).await,
    }
}

/// Pretty JSON, or plain string conversion when the value has none.
pub async fn inspect(interp: &Interpreter, value: &Value) -> JsResult<String> {
    match json::stringify(interp, value, Some("  ")).await {
        Ok(Some(text)) => Ok(text),
        _ => interp.to_string(value).await,
    }
}

/// Wrap an error-first callback function so it returns a promise.
fn promisify(interp: &Interpreter, target: Value) -> Obj {
    interp.new_function(
        "promisified",
        native_fn(move |interp, this, mut args| {
            let target = target.clone();
            Box::pin(async move {
                let promise = interp.new_promise();
                let settle = {
                    let promise = promise.clone();
                    sync_fn(move |interp, _, args| {
                        let err = arg(&args, 0);
                        if err.truthy() {
                            interp.reject_promise(&promise, err);
                        } else {
                            interp.resolve_promise(&promise, arg(&args, 1));
                        }
                        Ok(Value::Undefined)
                    })
                };
                args.push(Value::from(interp.new_function("callback", settle)));
                if let Err(e) = interp.call(&target, this, args).await {
                    interp.reject_promise(&promise, e.value);
                }
                Ok(Value::from(promise))
            })
        }),
    )
}

pub fn module(interp: &Interpreter) -> Obj {
    let util = interp.new_object();
    interp.define_method(
        &util,
        "format",
        native_fn(|interp, _, args| Box::pin(async move { Ok(Value::from(format(interp, &args).await?)) })),
    );
    interp.define_method(
        &util,
        "inspect",
        native_fn(|interp, _, args| {
            Box::pin(async move { Ok(Value::from(inspect(interp, &arg(&args, 0)).await?)) })
        }),
    );
    interp.define_method(
        &util,
        "promisify",
        sync_fn(|interp, _, args| {
            let target = callback(interp, &args, 0)?;
            Ok(Value::from(promisify(interp, target)))
        }),
    );
    util
}
