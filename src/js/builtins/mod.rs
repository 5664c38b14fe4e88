//! js::builtins
//!
//! Intrinsic objects installed into every interpreter's global scope.
//!
//! # Modules
//!
//! - [`object`] - `Object` and `Object.prototype`
//! - [`function`] - `Function.prototype.call/apply/bind`
//! - [`array`] - `Array` and its prototype
//! - [`string`] - `String` and its prototype
//! - [`number`] - `Number`, `Boolean` and the numeric globals
//! - [`math`] - `Math`
//! - [`json`] - `JSON`, plus conversions to and from `serde_json`
//! - [`promise`] - `Promise`
//! - [`error`] - `Error` and its subclasses
//! - [`date`] - `Date`
//! - [`global`] - timers and the value globals (`NaN`, `Infinity`)
//!
//! Host-specific globals (`console`, `require`, `process`) are not part of
//! the engine; the module runtime adds them per module.

pub mod array;
pub mod date;
pub mod error;
pub mod function;
pub mod global;
pub mod json;
pub mod math;
pub mod number;
pub mod object;
pub mod promise;
pub mod string;

use super::error::JsResult;
use super::interp::Interpreter;
use super::value::{NativeFn, Obj, Value};

/// Populate the global scope and the intrinsic prototypes.
pub fn install(interp: &Interpreter) {
    object::install(interp);
    function::install(interp);
    array::install(interp);
    string::install(interp);
    number::install(interp);
    math::install(interp);
    json::install(interp);
    promise::install(interp);
    error::install(interp);
    date::install(interp);
    global::install(interp);
}

/// Create a global constructor wired to `proto` (`C.prototype` and
/// `C.prototype.constructor`).
pub(crate) fn define_constructor(
    interp: &Interpreter,
    name: &str,
    call: NativeFn,
    proto: &Obj,
) -> Obj {
    let ctor = interp.new_function(name, call);
    ctor.define_hidden("prototype", Value::from(proto.clone()));
    proto.define_hidden("constructor", Value::from(ctor.clone()));
    interp.define_global(name, ctor.clone());
    ctor
}

/// Argument `i`, or `undefined`.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Argument `i` when it is callable, else a `TypeError` naming it.
pub(crate) fn callback(interp: &Interpreter, args: &[Value], i: usize) -> JsResult<Value> {
    let value = arg(args, i);
    if value.is_callable() {
        Ok(value)
    } else {
        Err(interp.type_error(format!(
            "{} is not a function",
            super::interp::describe(&value)
        )))
    }
}

/// Resolve a relative index argument (`slice(-2)`) against `len`.
pub(crate) fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_integer();
    let len_f = len as f64;
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}
