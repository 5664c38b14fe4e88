//! js::value
//!
//! The value model: primitives, reference-counted objects and functions.
//!
//! # Design
//!
//! Objects are `Rc<RefCell<Object>>` handles ([`Obj`]); identity is pointer
//! identity. Property order is insertion order (`IndexMap`), which is what
//! `Object.keys` and `JSON.stringify` expose. Arrays keep their elements in
//! a dense `Vec` and synthesize `length` and index keys.
//!
//! Conversions here are the synchronous ones. Conversions that may run user
//! code (a class-defined `toString`) live on the interpreter.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::ast::{ClassDef, Expr, FunctionDef};
use super::error::JsResult;
use super::interp::{Env, Interpreter};
use super::promise::PromiseState;

/// A boxed, non-`Send` future; the engine is single-threaded.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Host function signature.
pub type NativeFn =
    Rc<dyn for<'a> Fn(&'a Interpreter, Value, Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>>>;

/// Wrap an async host function.
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: for<'a> Fn(&'a Interpreter, Value, Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>>
        + 'static,
{
    Rc::new(f)
}

/// Wrap a host function that never suspends.
pub fn sync_fn<F>(f: F) -> NativeFn
where
    F: Fn(&Interpreter, Value, Vec<Value>) -> JsResult<Value> + 'static,
{
    native_fn(move |interp, this, args| Box::pin(std::future::ready(f(interp, this, args))))
}

/// A script value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(SmolStr),
    Object(Obj),
}

impl Value {
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) if obj.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&Obj> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(Obj::is_callable)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Date(ms) => *ms,
                _ => string_to_number(&self.to_display_string()),
            },
        }
    }

    pub fn to_int32(&self) -> i32 {
        to_uint32(self.to_number()) as i32
    }

    pub fn to_uint32(&self) -> u32 {
        to_uint32(self.to_number())
    }

    /// Integer conversion used by index arguments (`slice`, `at`, ...).
    pub fn to_integer(&self) -> f64 {
        let n = self.to_number();
        if n.is_nan() {
            0.0
        } else {
            n.trunc()
        }
    }

    /// String conversion that never calls back into script code.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Object(obj) => obj.display_string(),
        }
    }

    pub fn to_property_key(&self) -> SmolStr {
        match self {
            Value::String(s) => s.clone(),
            other => SmolStr::new(other.to_display_string()),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// SameValueZero, used by `includes`.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Object(_), Value::Object(_)) => self.strict_equals(other),
            (Value::Object(_), _) => Value::from(self.to_display_string()).loose_equals(other),
            (_, Value::Object(_)) => self.loose_equals(&Value::from(other.to_display_string())),
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Obj> for Value {
    fn from(obj: Obj) -> Self {
        Value::Object(obj)
    }
}

/// Format a number the way script code sees it.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 {
        return format!("{n:.0}");
    }
    format!("{n}")
}

/// String-to-number conversion (`Number("  12 ")`).
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = |digits: &str, radix: u32| {
        u64::from_str_radix(digits, radix).map_or(f64::NAN, |n| n as f64)
    };
    match s.get(..2) {
        Some("0x") | Some("0X") => return radix(&s[2..], 16),
        Some("0o") | Some("0O") => return radix(&s[2..], 8),
        Some("0b") | Some("0B") => return radix(&s[2..], 2),
        _ => {}
    }
    let valid = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Parse an array index key.
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// A property slot.
#[derive(Clone)]
pub enum Slot {
    Data(Value),
    Accessor {
        get: Option<Value>,
        set: Option<Value>,
    },
}

/// An own property.
#[derive(Clone)]
pub struct Property {
    pub slot: Slot,
    pub enumerable: bool,
}

impl Property {
    pub fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            enumerable: true,
        }
    }

    pub fn hidden(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            enumerable: false,
        }
    }
}

/// Native function object.
pub struct Native {
    pub name: SmolStr,
    pub call: NativeFn,
}

/// A script-defined function with its captured scope.
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
    /// Object whose prototype `super.x` reads from
    pub home: Option<Obj>,
}

/// An instance field of a class.
pub struct FieldInit {
    pub key: SmolStr,
    pub init: Option<Expr>,
}

/// A class constructor.
pub struct ClassCtor {
    pub def: Rc<ClassDef>,
    pub env: Env,
    pub constructor: Option<Rc<FunctionDef>>,
    pub fields: Vec<FieldInit>,
    pub derived: bool,
    /// The class prototype object
    pub home: Obj,
}

pub enum Function {
    Closure(Closure),
    Class(Rc<ClassCtor>),
    Native(Native),
}

impl Function {
    pub fn name(&self) -> SmolStr {
        match self {
            Function::Closure(c) => c.def.name.clone().unwrap_or_default(),
            Function::Class(c) => c.def.name.clone().unwrap_or_default(),
            Function::Native(n) => n.name.clone(),
        }
    }
}

/// Internal representation of an object.
pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Function),
    Error,
    Promise(PromiseState),
    /// Milliseconds since the epoch
    Date(f64),
    /// `Buffer` contents
    Bytes(Vec<u8>),
}

pub struct Object {
    pub kind: ObjectKind,
    pub proto: Option<Obj>,
    pub props: IndexMap<SmolStr, Property>,
    pub frozen: bool,
}

/// Shared handle to an object.
#[derive(Clone)]
pub struct Obj(Rc<RefCell<Object>>);

impl Obj {
    pub fn new(kind: ObjectKind, proto: Option<Obj>) -> Self {
        Obj(Rc::new(RefCell::new(Object {
            kind,
            proto,
            props: IndexMap::new(),
            frozen: false,
        })))
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity used for cycle detection.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn proto(&self) -> Option<Obj> {
        self.borrow().proto.clone()
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Array(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Error)
    }

    pub fn is_promise(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Promise(_))
    }

    /// Elements of an array object.
    pub fn array_elements(&self) -> Option<Vec<Value>> {
        match &self.borrow().kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// An own property slot, including synthesized array and buffer keys.
    pub fn get_own(&self, key: &str) -> Option<Slot> {
        let object = self.borrow();
        match &object.kind {
            ObjectKind::Array(items) => {
                if key == "length" {
                    return Some(Slot::Data(Value::from(items.len())));
                }
                if let Some(i) = array_index(key) {
                    return items.get(i).cloned().map(Slot::Data);
                }
            }
            ObjectKind::Bytes(bytes) => {
                if key == "length" {
                    return Some(Slot::Data(Value::from(bytes.len())));
                }
                if let Some(i) = array_index(key) {
                    return bytes.get(i).map(|b| Slot::Data(Value::from(f64::from(*b))));
                }
            }
            _ => {}
        }
        object.props.get(key).map(|p| p.slot.clone())
    }

    /// Find a slot along the prototype chain.
    pub fn lookup(&self, key: &str) -> Option<Slot> {
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            if let Some(slot) = obj.get_own(key) {
                return Some(slot);
            }
            current = obj.proto();
        }
        None
    }

    /// An own data property value.
    pub fn get_own_data(&self, key: &str) -> Option<Value> {
        match self.get_own(key) {
            Some(Slot::Data(value)) => Some(value),
            _ => None,
        }
    }

    /// A data property value along the prototype chain.
    pub fn get_data(&self, key: &str) -> Option<Value> {
        match self.lookup(key) {
            Some(Slot::Data(value)) => Some(value),
            _ => None,
        }
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.get_own(key).is_some()
    }

    /// Write an own data property, bypassing setters. Returns `false` when
    /// the object is frozen.
    pub fn set_own(&self, key: impl Into<SmolStr>, value: Value) -> bool {
        let key = key.into();
        let mut object = self.borrow_mut();
        if object.frozen {
            return false;
        }
        match &mut object.kind {
            ObjectKind::Array(items) => {
                if key == "length" {
                    let len = value.to_number();
                    if len >= 0.0 && len.fract() == 0.0 {
                        items.resize(len as usize, Value::Undefined);
                    }
                    return true;
                }
                if let Some(i) = array_index(&key) {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                    return true;
                }
            }
            ObjectKind::Bytes(bytes) => {
                if let Some(i) = array_index(&key) {
                    if let Some(b) = bytes.get_mut(i) {
                        *b = value.to_uint32() as u8;
                    }
                    return true;
                }
            }
            _ => {}
        }
        match object.props.get_mut(&key) {
            Some(existing) => existing.slot = Slot::Data(value),
            None => {
                object.props.insert(key, Property::data(value));
            }
        }
        true
    }

    /// Define a property with explicit attributes.
    pub fn define(&self, key: impl Into<SmolStr>, property: Property) {
        self.borrow_mut().props.insert(key.into(), property);
    }

    /// Define a non-enumerable data property.
    pub fn define_hidden(&self, key: impl Into<SmolStr>, value: Value) {
        self.define(key, Property::hidden(value));
    }

    /// Add a getter or setter half of an accessor.
    pub fn define_accessor(&self, key: impl Into<SmolStr>, getter: Option<Value>, setter: Option<Value>, enumerable: bool) {
        let key = key.into();
        let mut object = self.borrow_mut();
        let (get, set) = match object.props.get(&key).map(|p| p.slot.clone()) {
            Some(Slot::Accessor { get, set }) => (getter.or(get), setter.or(set)),
            _ => (getter, setter),
        };
        object.props.insert(
            key,
            Property {
                slot: Slot::Accessor { get, set },
                enumerable,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut object = self.borrow_mut();
        if object.frozen {
            return false;
        }
        if let ObjectKind::Array(items) = &mut object.kind {
            if let Some(i) = array_index(key) {
                if let Some(item) = items.get_mut(i) {
                    *item = Value::Undefined;
                }
                return true;
            }
        }
        object.props.shift_remove(key);
        true
    }

    /// Enumerable own keys: indices first, then properties in insertion order.
    pub fn own_keys(&self) -> Vec<SmolStr> {
        let object = self.borrow();
        let mut keys = Vec::new();
        match &object.kind {
            ObjectKind::Array(items) => keys.extend((0..items.len()).map(|i| SmolStr::new(i.to_string()))),
            ObjectKind::Bytes(bytes) => keys.extend((0..bytes.len()).map(|i| SmolStr::new(i.to_string()))),
            _ => {}
        }
        keys.extend(
            object
                .props
                .iter()
                .filter(|(_, p)| p.enumerable)
                .map(|(k, _)| k.clone()),
        );
        keys
    }

    /// Whether `proto` appears on this object's prototype chain.
    pub fn inherits_from(&self, proto: &Obj) -> bool {
        let mut current = self.proto();
        while let Some(obj) = current {
            if obj.ptr_eq(proto) {
                return true;
            }
            current = obj.proto();
        }
        false
    }

    pub fn function_name(&self) -> Option<SmolStr> {
        match &self.borrow().kind {
            ObjectKind::Function(f) => Some(f.name()),
            _ => None,
        }
    }

    fn display_string(&self) -> String {
        if let Some(items) = self.array_elements() {
            return items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                .collect::<Vec<_>>()
                .join(",");
        }
        if self.is_error() {
            let name = self
                .get_data("name")
                .map_or_else(|| "Error".to_string(), |v| v.to_display_string());
            let message = self
                .get_data("message")
                .map(|v| v.to_display_string())
                .unwrap_or_default();
            return if message.is_empty() {
                name
            } else {
                format!("{name}: {message}")
            };
        }
        match &self.borrow().kind {
            ObjectKind::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
            ObjectKind::Date(ms) => date_to_iso(*ms).unwrap_or_else(|| "Invalid Date".to_string()),
            ObjectKind::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ObjectKind::Promise(_) => "[object Promise]".to_string(),
            _ => "[object Object]".to_string(),
        }
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.borrow().kind {
            ObjectKind::Function(func) => write!(f, "[Function: {}]", func.name()),
            ObjectKind::Array(items) => write!(f, "[Array({})]", items.len()),
            _ => f.write_str("[object]"),
        }
    }
}

/// ISO-8601 rendering of an epoch-milliseconds time value.
pub fn date_to_iso(ms: f64) -> Option<String> {
    if !ms.is_finite() {
        return None;
    }
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(123456789012.0), "123456789012");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_conversion_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::from(1.0)));
        assert!(Value::Bool(true).loose_equals(&Value::from(1.0)));
        assert!(Value::from(f64::NAN).same_value_zero(&Value::from(f64::NAN)));
        assert!(!Value::from(f64::NAN).strict_equals(&Value::from(f64::NAN)));
    }

    #[test]
    fn arrays_synthesize_length_and_indices() {
        let arr = Obj::new(ObjectKind::Array(vec![Value::from(1.0)]), None);
        assert!(arr.set_own("3", Value::from("x")));
        assert_eq!(arr.get_own_data("length").unwrap().to_number(), 4.0);
        assert_eq!(arr.own_keys(), vec!["0", "1", "2", "3"]);
        assert_eq!(Value::from(arr).to_display_string(), "1,,,x");
    }

    #[test]
    fn frozen_objects_reject_writes() {
        let obj = Obj::new(ObjectKind::Ordinary, None);
        obj.set_own("a", Value::from(1.0));
        obj.borrow_mut().frozen = true;
        assert!(!obj.set_own("a", Value::from(2.0)));
        assert_eq!(obj.get_own_data("a").unwrap().to_number(), 1.0);
    }

    #[test]
    fn date_iso() {
        assert_eq!(date_to_iso(0.0).unwrap(), "1970-01-01T00:00:00.000Z");
    }
}
