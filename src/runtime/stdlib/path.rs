//! The `path` module: POSIX semantics over [`crate::core::paths`].

use crate::core::paths;
use crate::js::builtins::arg;
use crate::js::{sync_fn, Interpreter, JsResult, Obj, Value};

use super::string_arg;

fn all_strings(interp: &Interpreter, args: &[Value]) -> JsResult<Vec<String>> {
    (0..args.len())
        .map(|i| string_arg(interp, args, i, "path"))
        .collect()
}

/// `path.relative(from, to)` for absolute, normalized inputs.
fn relative(from: &str, to: &str) -> String {
    let from = paths::components(from);
    let to = paths::components(to);
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    parts.join("/")
}

pub fn module(interp: &Interpreter) -> Obj {
    let path = interp.new_object();

    interp.define_method(
        &path,
        "join",
        sync_fn(|interp, _, args| {
            let parts = all_strings(interp, &args)?;
            let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
            Ok(Value::from(paths::join(&parts)))
        }),
    );
    interp.define_method(
        &path,
        "resolve",
        sync_fn(|interp, _, args| {
            let parts = all_strings(interp, &args)?;
            let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
            Ok(Value::from(paths::resolve("/", &parts)))
        }),
    );
    interp.define_method(
        &path,
        "normalize",
        sync_fn(|interp, _, args| {
            Ok(Value::from(paths::normalize(&string_arg(interp, &args, 0, "path")?)))
        }),
    );
    interp.define_method(
        &path,
        "dirname",
        sync_fn(|interp, _, args| {
            Ok(Value::from(paths::dirname(&string_arg(interp, &args, 0, "path")?)))
        }),
    );
    interp.define_method(
        &path,
        "basename",
        sync_fn(|interp, _, args| {
            let target = string_arg(interp, &args, 0, "path")?;
            let ext = match arg(&args, 1) {
                Value::Undefined => None,
                _ => Some(string_arg(interp, &args, 1, "ext")?),
            };
            Ok(Value::from(paths::basename(&target, ext.as_deref())))
        }),
    );
    interp.define_method(
        &path,
        "extname",
        sync_fn(|interp, _, args| {
            Ok(Value::from(paths::extname(&string_arg(interp, &args, 0, "path")?)))
        }),
    );
    interp.define_method(
        &path,
        "isAbsolute",
        sync_fn(|interp, _, args| {
            Ok(Value::Bool(string_arg(interp, &args, 0, "path")?.starts_with('/')))
        }),
    );
    interp.define_method(
        &path,
        "relative",
        sync_fn(|interp, _, args| {
            let from = paths::resolve_from("/", &string_arg(interp, &args, 0, "from")?);
            let to = paths::resolve_from("/", &string_arg(interp, &args, 1, "to")?);
            Ok(Value::from(relative(&from, &to)))
        }),
    );

    path.set_own("sep", Value::from("/"));
    path.set_own("delimiter", Value::from(":"));
    path.set_own("posix", Value::from(path.clone()));
    path
}
