//! runtime::error
//!
//! Errors raised while resolving, loading or executing modules.

use thiserror::Error;

use crate::js::{ErrorKind, Interpreter, JsError, ParseError};
use crate::vfs::FsError;

/// Errors from the module runtime.
///
/// Inside executing code these surface as script `Error` objects (see
/// [`RuntimeError::into_js`]); at the outermost boundary only the message
/// is kept.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// No built-in, local file or CDN endpoint provides the specifier.
    #[error("Cannot find module '{specifier}'")]
    ModuleNotFound { specifier: String },

    /// A `.json` / `package.json` module failed to parse.
    #[error("Invalid JSON in {path}: {message}")]
    InvalidJson { path: String, message: String },

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("SyntaxError: {0}")]
    Syntax(#[from] ParseError),

    /// Every CDN endpoint failed for a bare specifier.
    #[error("Failed to load module {specifier} from CDN")]
    Cdn { specifier: String },

    /// Module code threw, or could not be compiled.
    #[error("{message}")]
    Execution { message: String },

    #[error("Synchronous file operations are not supported. Use async versions.")]
    SyncUnsupported,

    /// A name on the built-in allow-list without an implementation.
    #[error("Built-in module '{name}' not implemented")]
    BuiltinNotImplemented { name: String },

    /// The thread that runs scripts could not be started.
    #[error("failed to start the script thread: {message}")]
    Worker { message: String },
}

impl RuntimeError {
    pub fn module_not_found(specifier: impl Into<String>) -> Self {
        RuntimeError::ModuleNotFound {
            specifier: specifier.into(),
        }
    }

    /// Node-style error code carried by the script-side error.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            RuntimeError::ModuleNotFound { .. } | RuntimeError::Cdn { .. } => {
                Some("MODULE_NOT_FOUND")
            }
            RuntimeError::Fs(err) => Some(err.code()),
            RuntimeError::SyncUnsupported => Some("ERR_METHOD_NOT_IMPLEMENTED"),
            _ => None,
        }
    }

    /// Convert to a throwable script error.
    pub fn into_js(self, interp: &Interpreter) -> JsError {
        match (&self, self.code()) {
            (RuntimeError::Syntax(err), _) => interp.error(ErrorKind::SyntaxError, err.to_string()),
            (_, Some(code)) => interp.error_with_code(self.to_string(), code),
            (_, None) => interp.error(ErrorKind::Error, self.to_string()),
        }
    }

    /// Wrap a failure of the module at `path`.
    pub(crate) fn module_failed(path: &str, reason: impl std::fmt::Display) -> Self {
        RuntimeError::Execution {
            message: format!("Failed to execute module '{path}': {reason}"),
        }
    }
}

impl From<JsError> for RuntimeError {
    fn from(err: JsError) -> Self {
        RuntimeError::Execution {
            message: err.message(),
        }
    }
}
