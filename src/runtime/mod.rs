//! runtime
//!
//! Module Resolver & Sandbox Runtime.
//!
//! Runs source text as a Node-style CommonJS module on the embedded
//! interpreter, with every file access going through a [`Filesystem`] and
//! every mutation reported to a [`ChangeSink`]:
//!
//! - [`resolve`] - specifier classification and probe order
//! - `loader` - the module cache, `require` and CDN fallback
//! - [`transform`] - ES module syntax rewritten to CommonJS, dependency scan
//! - [`cdn`] - package retrieval from public CDNs
//! - [`stdlib`] - emulated `fs`, `path`, `os`, `util`
//! - [`console`] - output channels; `process` and `Buffer` live in `globals`
//!
//! [`Filesystem`]: crate::vfs::Filesystem
//! [`ChangeSink`]: crate::notify::ChangeSink
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use pyxis::core::config::RuntimeSettings;
//! use pyxis::notify::NullSink;
//! use pyxis::runtime::{CapturedConsole, NodeRuntime, Stream};
//! use pyxis::vfs::MemoryFs;
//!
//! # tokio_test::block_on(async {
//! let fs = MemoryFs::with_files([("/lib/sum.js", "module.exports = (a, b) => a + b;")]);
//! let console = CapturedConsole::new();
//! let runtime = NodeRuntime::new(
//!     Arc::new(fs),
//!     Arc::new(NullSink),
//!     Arc::new(console.clone()),
//!     RuntimeSettings { cdn_fallback: false, ..RuntimeSettings::default() },
//! )
//! .unwrap();
//!
//! let result = runtime.execute_source("const sum = require('./lib/sum'); console.log(sum(2, 3))").await;
//! assert!(result.success);
//! assert_eq!(console.output(Stream::Log), vec!["5"]);
//! # });
//! ```

pub mod cdn;
pub mod console;
pub mod error;
mod globals;
mod loader;
mod node;
pub mod resolve;
pub mod stdlib;
pub mod transform;

pub use cdn::{CdnClient, FetchedModule};
pub use console::{CapturedConsole, Console, StdConsole, Stream};
pub use error::RuntimeError;
pub use node::{ExecutionResult, NodeRuntime};
