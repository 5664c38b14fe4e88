//! js
//!
//! The script engine behind the sandbox runtime.
//!
//! # Architecture
//!
//! - [`lexer`] - `logos` tokenizer, also used by the module transform stage
//! - [`parser`] - recursive descent to the [`ast`]
//! - [`interp`] - async tree-walking evaluation over [`value`]s
//! - [`promise`] / [`timers`] - microtask queue and the virtual clock
//! - [`builtins`] - the intrinsic objects every realm starts with
//!
//! The engine runs a subset of ECMAScript: no regular-expression literals,
//! generators or tagged templates, and no ES module syntax (module source is
//! rewritten to CommonJS before it reaches the parser).
//!
//! # Example
//!
//! ```ignore
//! use pyxis::js::{parse, Interpreter, Options};
//!
//! let interp = Interpreter::new(Options::default());
//! let value = interp.run_script(&parse("[1, 2, 3].map(n => n * 2).join()")?).await?;
//! assert_eq!(value.to_display_string(), "2,4,6");
//! ```

pub mod ast;
pub mod builtins;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod promise;
pub mod timers;
pub mod value;

pub use error::{ErrorKind, JsError, JsResult, ParseError};
pub use interp::{Interpreter, Options};
pub use parser::parse;
pub use value::{native_fn, sync_fn, NativeFn, Obj, ObjectKind, Value};
