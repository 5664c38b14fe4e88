//! js::error
//!
//! Error types of the script engine.
//!
//! [`ParseError`] is a Rust-side failure to understand source text.
//! [`JsError`] carries a thrown script value; it is what `throw` produces
//! and what `try/catch` observes.

use std::fmt;

use thiserror::Error;

use super::value::Value;

/// Result of evaluating script code.
pub type JsResult<T> = Result<T, JsError>;

/// Source text could not be tokenized or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({line}:{column})")]
pub struct ParseError {
    pub message: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column, in characters
    pub column: usize,
}

impl ParseError {
    /// Build an error at byte `offset` of `source`.
    pub fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// The standard error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
        }
    }

    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::SyntaxError,
        ErrorKind::ReferenceError,
    ];
}

/// A thrown script value.
#[derive(Clone)]
pub struct JsError {
    pub value: Value,
}

impl JsError {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The `message` of a thrown error object, or the thrown value as text.
    pub fn message(&self) -> String {
        if let Value::Object(obj) = &self.value {
            if obj.is_error() {
                if let Some(Value::String(message)) = obj.get_own_data("message") {
                    return message.to_string();
                }
            }
        }
        self.value.to_display_string()
    }

    /// The `code` property of a thrown error object, if any.
    pub fn code(&self) -> Option<String> {
        match &self.value {
            Value::Object(obj) => match obj.get_data("code") {
                Some(Value::String(code)) => Some(code.to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Debug for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsError({})", self.message())
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for JsError {}
