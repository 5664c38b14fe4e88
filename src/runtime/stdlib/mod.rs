//! runtime::stdlib
//!
//! Emulated Node built-in modules.
//!
//! Each module is a plain script object built on first `require`; the
//! loader caches it like any other module, so every `require('fs')` in a
//! runtime returns the same object.

pub mod fs;
pub mod os;
pub mod path;
pub mod util;

use std::rc::Rc;

use crate::js::{Interpreter, JsError, JsResult, Value};

use super::error::RuntimeError;
use super::loader::Host;

/// Build the built-in module `name`.
///
/// # Errors
///
/// [`RuntimeError::BuiltinNotImplemented`] for allow-listed names without
/// an implementation.
pub(crate) fn create(host: &Rc<Host>, interp: &Interpreter, name: &str) -> Result<Value, RuntimeError> {
    let module = match name {
        "fs" => fs::module(host, interp),
        "path" => path::module(interp),
        "os" => os::module(interp),
        "util" => util::module(interp),
        _ => {
            return Err(RuntimeError::BuiltinNotImplemented {
                name: name.to_string(),
            })
        }
    };
    Ok(Value::from(module))
}

/// Argument `i` as a string, or Node's `ERR_INVALID_ARG_TYPE`.
pub(crate) fn string_arg(interp: &Interpreter, args: &[Value], i: usize, name: &str) -> JsResult<String> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s.to_string()),
        other => Err(invalid_arg(interp, name, other)),
    }
}

fn invalid_arg(interp: &Interpreter, name: &str, received: Option<&Value>) -> JsError {
    let received = match received {
        None | Some(Value::Undefined) => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(value) => format!("type {}", value.type_of()),
    };
    interp.error_with_code(
        format!("The \"{name}\" argument must be of type string. Received {received}"),
        "ERR_INVALID_ARG_TYPE",
    )
}
