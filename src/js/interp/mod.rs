//! js::interp
//!
//! Async tree-walking interpreter.
//!
//! # Architecture
//!
//! Evaluation is split the way the syntax is:
//!
//! - [`scope`] - lexical environments and function frames
//! - `expr` - expression evaluation, including optional chains
//! - `stmt` - statements, hoisting and destructuring
//! - `ops` - operators and coercions
//! - `call` - function calls, construction and class creation
//! - `task` - async function bodies parked on `await`
//!
//! Every evaluation step returns a boxed local future so host functions
//! (module loading, filesystem access) can suspend, and so an `await` can
//! park the body it belongs to. The engine is single-threaded; nothing here
//! is `Send`.
//!
//! Nested calls recurse on the host stack. Embedders run deep scripts on a
//! thread with a large stack; the call-depth limit turns runaway recursion
//! into a `RangeError` before that stack runs out.
//!
//! # Example
//!
//! ```ignore
//! let interp = Interpreter::new(Options::default());
//! let program = parser::parse("1 + 2")?;
//! let value = interp.run_script(&program).await?;
//! ```

mod call;
mod expr;
mod ops;
pub mod scope;
mod stmt;
mod task;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use smol_str::SmolStr;

pub use scope::{Env, Frame, Scope};
pub use task::{TaskId, TaskTable};

use super::ast::Program;
use super::builtins;
use super::error::{ErrorKind, JsError, JsResult};
use super::promise::Job;
use super::timers::TimerQueue;
use super::value::{
    sync_fn, LocalBoxFuture, Native, NativeFn, Obj, ObjectKind, Property, Slot, Value,
};

/// Interpreter limits and clock.
#[derive(Debug, Clone)]
pub struct Options {
    /// Timer callbacks run before the event loop gives up
    pub max_timer_runs: usize,
    /// Nested calls before `RangeError`
    pub max_call_depth: usize,
    /// Wall-clock time at virtual time zero, in epoch milliseconds
    pub start_time_ms: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_timer_runs: 10_000,
            max_call_depth: 10_000,
            start_time_ms: chrono::Utc::now().timestamp_millis() as f64,
        }
    }
}

/// Intrinsic prototypes.
pub struct Realm {
    pub object_proto: Obj,
    pub function_proto: Obj,
    pub array_proto: Obj,
    pub string_proto: Obj,
    pub number_proto: Obj,
    pub boolean_proto: Obj,
    pub promise_proto: Obj,
    pub date_proto: Obj,
    pub bytes_proto: Obj,
    error_protos: Vec<(ErrorKind, Obj)>,
}

impl Realm {
    fn new() -> Self {
        let object_proto = Obj::new(ObjectKind::Ordinary, None);
        let function_proto = Obj::new(
            ObjectKind::Function(super::value::Function::Native(Native {
                name: SmolStr::default(),
                call: sync_fn(|_, _, _| Ok(Value::Undefined)),
            })),
            Some(object_proto.clone()),
        );
        let ordinary = || Obj::new(ObjectKind::Ordinary, Some(object_proto.clone()));
        let error_proto = ordinary();
        let error_protos = ErrorKind::ALL
            .iter()
            .map(|&kind| {
                let proto = if kind == ErrorKind::Error {
                    error_proto.clone()
                } else {
                    Obj::new(ObjectKind::Ordinary, Some(error_proto.clone()))
                };
                (kind, proto)
            })
            .collect();
        Self {
            array_proto: ordinary(),
            string_proto: ordinary(),
            number_proto: ordinary(),
            boolean_proto: ordinary(),
            promise_proto: ordinary(),
            date_proto: ordinary(),
            bytes_proto: ordinary(),
            error_protos,
            function_proto,
            object_proto,
        }
    }

    pub fn error_proto(&self, kind: ErrorKind) -> &Obj {
        self.error_protos
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(&self.error_protos[0].1, |(_, proto)| proto)
    }
}

/// The script engine.
pub struct Interpreter {
    realm: Realm,
    global: Env,
    pub(crate) jobs: RefCell<VecDeque<Job>>,
    pub(crate) timers: RefCell<TimerQueue>,
    /// Rejected promises nobody has observed yet
    pub(crate) rejections: RefCell<Vec<Obj>>,
    /// Errors thrown by timer callbacks
    pub(crate) uncaught: RefCell<Vec<JsError>>,
    tasks: RefCell<TaskTable>,
    depth: Cell<usize>,
    options: Options,
    weak_self: Weak<Interpreter>,
}

impl Interpreter {
    pub fn new(options: Options) -> Rc<Self> {
        let interp = Rc::new_cyclic(|weak_self| Self {
            realm: Realm::new(),
            global: Scope::root(),
            jobs: RefCell::default(),
            timers: RefCell::default(),
            rejections: RefCell::default(),
            uncaught: RefCell::default(),
            tasks: RefCell::default(),
            depth: Cell::new(0),
            options,
            weak_self: weak_self.clone(),
        });
        builtins::install(&interp);
        interp
    }

    /// A strong handle for task bodies that outlive the call starting them.
    pub(crate) fn handle(&self) -> JsResult<Rc<Interpreter>> {
        self.weak_self
            .upgrade()
            .ok_or_else(|| self.error(ErrorKind::Error, "interpreter has shut down"))
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn global(&self) -> &Env {
        &self.global
    }

    pub fn define_global(&self, name: &str, value: impl Into<Value>) {
        self.global.declare(name, value.into(), true);
    }

    /// Current virtual time in epoch milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.options.start_time_ms + self.timers.borrow().now() as f64
    }

    // ------------------------------------------------------------------
    // Object construction

    pub fn new_object(&self) -> Obj {
        Obj::new(ObjectKind::Ordinary, Some(self.realm.object_proto.clone()))
    }

    pub fn new_array(&self, items: Vec<Value>) -> Obj {
        Obj::new(ObjectKind::Array(items), Some(self.realm.array_proto.clone()))
    }

    pub fn new_bytes(&self, bytes: Vec<u8>) -> Obj {
        Obj::new(ObjectKind::Bytes(bytes), Some(self.realm.bytes_proto.clone()))
    }

    pub fn new_function(&self, name: &str, call: NativeFn) -> Obj {
        let func = Obj::new(
            ObjectKind::Function(super::value::Function::Native(Native {
                name: SmolStr::new(name),
                call,
            })),
            Some(self.realm.function_proto.clone()),
        );
        func.define_hidden("name", Value::from(name));
        func
    }

    /// Attach a native method to `target`.
    pub fn define_method(&self, target: &Obj, name: &str, call: NativeFn) {
        target.define_hidden(name, Value::from(self.new_function(name, call)));
    }

    pub fn make_error(&self, kind: ErrorKind, message: &str) -> Obj {
        let error = Obj::new(
            ObjectKind::Error,
            Some(self.realm.error_proto(kind).clone()),
        );
        error.define_hidden("message", Value::from(message));
        error.define_hidden("stack", Value::from(format!("{}: {message}", kind.name())));
        error
    }

    pub fn error(&self, kind: ErrorKind, message: impl AsRef<str>) -> JsError {
        JsError::new(Value::from(self.make_error(kind, message.as_ref())))
    }

    pub fn type_error(&self, message: impl AsRef<str>) -> JsError {
        self.error(ErrorKind::TypeError, message)
    }

    pub fn range_error(&self, message: impl AsRef<str>) -> JsError {
        self.error(ErrorKind::RangeError, message)
    }

    pub fn reference_error(&self, message: impl AsRef<str>) -> JsError {
        self.error(ErrorKind::ReferenceError, message)
    }

    /// An `Error` carrying a Node-style `code` property.
    pub fn error_with_code(&self, message: impl AsRef<str>, code: &str) -> JsError {
        let error = self.make_error(ErrorKind::Error, message.as_ref());
        error.set_own("code", Value::from(code));
        JsError::new(Value::from(error))
    }

    // ------------------------------------------------------------------
    // Property access

    fn proto_for(&self, value: &Value) -> Option<Obj> {
        match value {
            Value::String(_) => Some(self.realm.string_proto.clone()),
            Value::Number(_) => Some(self.realm.number_proto.clone()),
            Value::Bool(_) => Some(self.realm.boolean_proto.clone()),
            Value::Object(obj) => Some(obj.clone()),
            Value::Undefined | Value::Null => None,
        }
    }

    /// `target[key]`, running getters.
    pub fn get<'a>(&'a self, target: &Value, key: &str) -> LocalBoxFuture<'a, JsResult<Value>> {
        let target = target.clone();
        let key = SmolStr::new(key);
        Box::pin(async move {
            if let Value::String(s) = &target {
                if key == "length" {
                    return Ok(Value::from(s.encode_utf16().count()));
                }
                if let Some(i) = super::value::array_index(&key) {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map_or(Value::Undefined, |c| Value::from(c.to_string())));
                }
            }
            let Some(holder) = self.proto_for(&target) else {
                return Err(self.type_error(format!(
                    "Cannot read properties of {} (reading '{key}')",
                    target.to_display_string()
                )));
            };
            match holder.lookup(&key) {
                Some(Slot::Data(value)) => Ok(value),
                Some(Slot::Accessor { get: Some(getter), .. }) => {
                    self.call(&getter, target.clone(), Vec::new()).await
                }
                _ => Ok(Value::Undefined),
            }
        })
    }

    /// `target[key] = value`, running setters. Writes to frozen objects and
    /// primitives are ignored.
    pub fn set<'a>(
        &'a self,
        target: &Value,
        key: &str,
        value: Value,
    ) -> LocalBoxFuture<'a, JsResult<()>> {
        let target = target.clone();
        let key = SmolStr::new(key);
        Box::pin(async move {
            let obj = match &target {
                Value::Object(obj) => obj.clone(),
                Value::Undefined | Value::Null => {
                    return Err(self.type_error(format!(
                        "Cannot set properties of {} (setting '{key}')",
                        target.to_display_string()
                    )))
                }
                _ => return Ok(()),
            };
            if let Some(Slot::Accessor { set, .. }) = obj.lookup(&key) {
                if let Some(setter) = set {
                    self.call(&setter, target.clone(), vec![value]).await?;
                }
                return Ok(());
            }
            obj.set_own(key, value);
            Ok(())
        })
    }

    /// Own enumerable `[key, value]` pairs, read through getters.
    pub async fn entries(&self, obj: &Obj) -> JsResult<Vec<(SmolStr, Value)>> {
        let target = Value::from(obj.clone());
        let mut entries = Vec::new();
        for key in obj.own_keys() {
            let value = self.get(&target, &key).await?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Elements of an iterable value.
    pub async fn iterate(&self, value: &Value) -> JsResult<Vec<Value>> {
        match value {
            Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Object(obj) => {
                if let Some(items) = obj.array_elements() {
                    return Ok(items);
                }
                if let ObjectKind::Bytes(bytes) = &obj.borrow().kind {
                    return Ok(bytes.iter().map(|b| Value::from(f64::from(*b))).collect());
                }
                Err(self.type_error(format!("{} is not iterable", describe(value))))
            }
            _ => Err(self.type_error(format!("{} is not iterable", describe(value)))),
        }
    }

    /// Define a data property that is visible to enumeration.
    pub fn define_value(&self, target: &Obj, key: impl Into<SmolStr>, value: Value) {
        target.define(key, Property::data(value));
    }

    // ------------------------------------------------------------------
    // Entry points

    /// Run a program as a script in the global scope. Microtasks and timers
    /// run only while a top-level `await` is waiting.
    pub async fn run_script(&self, program: &Program) -> JsResult<Value> {
        let env = Scope::function(&self.global, Frame::with_this(Value::Undefined));
        self.run_toplevel(Box::pin(self.run_body(&program.body, &env)))
            .await
    }

    /// Run a program as a function body with the given parameters bound, as
    /// CommonJS module wrappers do. A top-level `return` ends the module; a
    /// top-level `await` drives the event loop until it is answered.
    pub async fn run_module(
        &self,
        program: &Program,
        params: &[(&str, Value)],
        this: Value,
    ) -> JsResult<Value> {
        let env = Scope::function(&self.global, Frame::with_this(this));
        for (name, value) in params {
            env.declare(*name, value.clone(), true);
        }
        self.run_toplevel(Box::pin(self.run_body(&program.body, &env)))
            .await
    }

    pub(crate) fn enter_call(&self) -> JsResult<CallGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.options.max_call_depth {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        self.depth.set(depth + 1);
        Ok(CallGuard { interp: self })
    }
}

/// Decrements the call depth on drop.
pub(crate) struct CallGuard<'a> {
    interp: &'a Interpreter,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.interp.depth.set(self.interp.depth.get().saturating_sub(1));
    }
}

/// Short rendering of a value for error messages.
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        Value::Object(obj) if obj.is_callable() => {
            format!("function {}", obj.function_name().unwrap_or_default())
        }
        Value::Object(obj) if obj.is_array() => "object".to_string(),
        Value::Object(_) => "#<Object>".to_string(),
        other => other.to_display_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::js::parser;

    /// Parse and run `source`, then drain the event loop.
    pub async fn eval(source: &str) -> JsResult<Value> {
        let interp = Interpreter::new(Options {
            start_time_ms: 0.0,
            max_call_depth: 32,
            ..Options::default()
        });
        eval_in(&interp, source).await
    }

    pub async fn eval_in(interp: &Interpreter, source: &str) -> JsResult<Value> {
        let program = parser::parse(source).expect("test source parses");
        let value = interp.run_script(&program).await?;
        interp.run_event_loop().await;
        Ok(value)
    }

    pub async fn eval_string(source: &str) -> String {
        match eval(source).await {
            Ok(value) => value.to_display_string(),
            Err(err) => format!("threw {}", err.value.to_display_string()),
        }
    }
}
