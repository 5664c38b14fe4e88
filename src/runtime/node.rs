//! runtime::node
//!
//! [`NodeRuntime`]: executes source text or project files as Node-style
//! modules against a [`Filesystem`].
//!
//! Scripts run on a dedicated thread with a large stack: nested script
//! calls recurse on the host stack, and the interpreter's call-depth limit
//! must trip before that stack runs out. The runtime handle forwards each
//! execution to the thread and awaits its result.

use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::core::config::RuntimeSettings;
use crate::core::paths;
use crate::js::{parse, Interpreter, Options, Value};
use crate::notify::ChangeSink;
use crate::vfs::Filesystem;

use super::console::{console_object, Console, Stream};
use super::error::RuntimeError;
use super::globals;
use super::loader::Host;
use super::transform::to_commonjs;

/// Stack reserved for the script thread.
const SCRIPT_STACK_BYTES: usize = 1024 * 1024 * 1024;

/// Outcome of a top-level execution.
///
/// Failures never escape as errors: the message is written to the console
/// error channel and returned here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Display form of a top-level `return` value, if any
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn ok(output: Option<String>) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(message),
        }
    }
}

enum Request {
    Source {
        code: String,
        reply: oneshot::Sender<ExecutionResult>,
    },
    File {
        path: String,
        reply: oneshot::Sender<ExecutionResult>,
    },
    Cwd {
        reply: oneshot::Sender<String>,
    },
}

/// A sandboxed module runtime. One instance owns one module cache and one
/// interpreter; state persists across executions.
pub struct NodeRuntime {
    requests: mpsc::UnboundedSender<Request>,
}

impl NodeRuntime {
    /// Start the script thread.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Worker`] when the thread or its executor cannot be
    /// created.
    pub fn new(
        fs: Arc<dyn Filesystem>,
        sink: Arc<dyn ChangeSink>,
        console: Arc<dyn Console>,
        settings: RuntimeSettings,
    ) -> Result<Self, RuntimeError> {
        let worker_error = |e: std::io::Error| RuntimeError::Worker {
            message: e.to_string(),
        };
        let executor = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(worker_error)?;
        let (requests, mut incoming) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("pyxis-script".into())
            .stack_size(SCRIPT_STACK_BYTES)
            .spawn(move || {
                let engine = Engine::new(fs, sink, console, settings);
                executor.block_on(async move {
                    while let Some(request) = incoming.recv().await {
                        engine.handle(request).await;
                    }
                });
                debug!("script thread finished");
            })
            .map_err(worker_error)?;
        Ok(Self { requests })
    }

    async fn request<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.requests.send(request(reply)).ok()?;
        response.await.ok()
    }

    /// Current working directory (`process.cwd()`).
    pub async fn cwd(&self) -> String {
        self.request(|reply| Request::Cwd { reply })
            .await
            .unwrap_or_else(|| "/".to_string())
    }

    /// Run `code` as the top-level module `<cwd>/script.js`.
    pub async fn execute_source(&self, code: &str) -> ExecutionResult {
        let code = code.to_string();
        self.request(|reply| Request::Source { code, reply })
            .await
            .unwrap_or_else(stopped)
    }

    /// Run a project file with the working directory set to its directory
    /// for the duration of the run.
    pub async fn execute_file(&self, path: &str) -> ExecutionResult {
        let path = path.to_string();
        self.request(|reply| Request::File { path, reply })
            .await
            .unwrap_or_else(stopped)
    }
}

fn stopped() -> ExecutionResult {
    ExecutionResult::failed("the script thread has stopped".to_string())
}

/// Interpreter and host state, owned by the script thread.
struct Engine {
    interp: Rc<Interpreter>,
    host: Rc<Host>,
}

impl Engine {
    fn new(
        fs: Arc<dyn Filesystem>,
        sink: Arc<dyn ChangeSink>,
        console: Arc<dyn Console>,
        settings: RuntimeSettings,
    ) -> Self {
        let interp = Interpreter::new(Options {
            max_timer_runs: settings.max_timer_runs,
            ..Options::default()
        });
        let host = Rc::new(Host::new(fs, sink, console.clone(), settings));
        interp.define_global("console", console_object(&interp, console));
        interp.define_global("process", globals::process_object(&interp, &host));
        globals::install_buffer(&interp);
        Self { interp, host }
    }

    async fn handle(&self, request: Request) {
        // A dropped receiver means the caller stopped waiting.
        match request {
            Request::Source { code, reply } => {
                let _ = reply.send(self.execute_source(&code).await);
            }
            Request::File { path, reply } => {
                let _ = reply.send(self.execute_file(&path).await);
            }
            Request::Cwd { reply } => {
                let _ = reply.send(self.host.cwd());
            }
        }
    }

    async fn execute_source(&self, code: &str) -> ExecutionResult {
        let dir = self.host.cwd();
        let filename = paths::join(&[&dir, "script.js"]);
        self.run_entry(code, &filename, &dir).await
    }

    async fn execute_file(&self, path: &str) -> ExecutionResult {
        let full = paths::resolve_from("/", path);
        let code = match self.host.fs.read_to_string(&full).await {
            Ok(code) => code,
            Err(e) => {
                let message = format!("Failed to execute file '{path}': {e}");
                self.host.console.write(Stream::Error, &message);
                return ExecutionResult::failed(message);
            }
        };
        self.host
            .console
            .write(Stream::Log, &format!("Executing: {path}"));

        let dir = paths::dirname(&full);
        let previous = self.host.replace_cwd(dir.clone());
        let result = self.run_entry(&code, &full, &dir).await;
        self.host.replace_cwd(previous);
        result
    }

    async fn run_entry(&self, code: &str, filename: &str, dir: &str) -> ExecutionResult {
        info!(file = filename, "executing");
        let value = match self.run_main(code, filename, dir).await {
            Ok(value) => value,
            Err(e) => {
                self.interp.cancel_timers();
                self.interp.discard_tasks();
                self.interp.take_uncaught();
                self.interp.take_unhandled_rejections();
                let message = e.to_string();
                self.host.console.write(Stream::Error, &message);
                return ExecutionResult::failed(message);
            }
        };

        self.interp.run_event_loop().await;
        let mut problems: Vec<String> = self
            .interp
            .take_uncaught()
            .into_iter()
            .map(|e| format!("Uncaught {}", e.value.to_display_string()))
            .collect();
        problems.extend(
            self.interp
                .take_unhandled_rejections()
                .into_iter()
                .map(|reason| format!("Uncaught (in promise) {}", reason.to_display_string())),
        );
        for problem in &problems {
            self.host.console.write(Stream::Error, problem);
        }
        match problems.into_iter().next() {
            Some(first) => ExecutionResult::failed(first),
            None => {
                let output = match value {
                    Value::Undefined => None,
                    other => Some(other.to_display_string()),
                };
                ExecutionResult::ok(output)
            }
        }
    }

    async fn run_main(&self, code: &str, filename: &str, dir: &str) -> Result<Value, RuntimeError> {
        self.host.preload(&self.interp, code, dir).await;
        let program = parse(&to_commonjs(code))?;
        let (module, exports) = self.host.module_objects(&self.interp, filename);
        let params = self
            .host
            .module_params(&self.interp, &module, &exports, filename, dir);
        let value = self
            .interp
            .run_module(&program, &params, Value::from(exports))
            .await
            .map_err(|e| RuntimeError::Execution {
                message: e.value.to_display_string(),
            })?;
        debug!(file = filename, "module body finished");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChangeEvent, RecordingSink};
    use crate::runtime::console::CapturedConsole;
    use crate::vfs::MemoryFs;

    struct Fixture {
        runtime: NodeRuntime,
        fs: MemoryFs,
        sink: RecordingSink,
        console: CapturedConsole,
    }

    fn fixture(fs: MemoryFs) -> Fixture {
        let sink = RecordingSink::new();
        let console = CapturedConsole::new();
        let runtime = NodeRuntime::new(
            Arc::new(fs.clone()),
            Arc::new(sink.clone()),
            Arc::new(console.clone()),
            RuntimeSettings {
                cdn_fallback: false,
                ..RuntimeSettings::default()
            },
        )
        .unwrap();
        Fixture {
            runtime,
            fs,
            sink,
            console,
        }
    }

    mod source {
        use super::*;

        #[tokio::test]
        async fn console_output_and_success() {
            let fx = fixture(MemoryFs::new());
            let result = fx.runtime.execute_source("console.log('hello', 1 + 1)").await;
            assert_eq!(result, ExecutionResult::ok(None));
            assert_eq!(fx.console.output(Stream::Log), vec!["hello 2"]);
        }

        #[tokio::test]
        async fn top_level_return_is_the_output() {
            let fx = fixture(MemoryFs::new());
            let result = fx.runtime.execute_source("return 6 * 7").await;
            assert_eq!(result.output.as_deref(), Some("42"));
        }

        #[tokio::test]
        async fn thrown_errors_become_failures() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source("throw new TypeError('bad input')")
                .await;
            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some("TypeError: bad input"));
            assert_eq!(fx.console.output(Stream::Error), vec!["TypeError: bad input"]);
        }

        #[tokio::test]
        async fn missing_modules_fail_with_the_specifier() {
            let fx = fixture(MemoryFs::new());
            let result = fx.runtime.execute_source("require('nowhere')").await;
            assert_eq!(result.error.as_deref(), Some("Error: Cannot find module 'nowhere'"));
        }

        #[tokio::test]
        async fn syntax_errors_are_reported() {
            let fx = fixture(MemoryFs::new());
            let result = fx.runtime.execute_source("const = 1").await;
            assert!(result.error.unwrap().starts_with("SyntaxError: "));
        }

        #[tokio::test]
        async fn timers_drain_after_the_body() {
            let fx = fixture(MemoryFs::new());
            fx.runtime
                .execute_source("setTimeout(() => console.log('later'), 100); console.log('now')")
                .await;
            assert_eq!(fx.console.output(Stream::Log), vec!["now", "later"]);
        }

        #[tokio::test]
        async fn uncaught_timer_errors_fail_the_run() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source("setTimeout(() => { throw new Error('late') }, 1)")
                .await;
            assert_eq!(result.error.as_deref(), Some("Uncaught Error: late"));
        }

        #[tokio::test]
        async fn unhandled_rejections_fail_the_run() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source("Promise.reject(new Error('nobody listens'))")
                .await;
            assert_eq!(
                result.error.as_deref(),
                Some("Uncaught (in promise) Error: nobody listens")
            );
        }

        #[tokio::test]
        async fn state_persists_between_runs() {
            let fx = fixture(MemoryFs::with_files([(
                "/counter.js",
                "let n = 0; module.exports = () => ++n;",
            )]));
            fx.runtime
                .execute_source("console.log(require('./counter')())")
                .await;
            fx.runtime
                .execute_source("console.log(require('./counter')())")
                .await;
            assert_eq!(fx.console.output(Stream::Log), vec!["1", "2"]);
        }

        #[tokio::test]
        async fn async_callers_run_first() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source(
                    "async function a() { await null; console.log('a2') }\n\
                     a()\n\
                     console.log('main')",
                )
                .await;
            assert!(result.success, "{result:?}");
            assert_eq!(fx.console.output(Stream::Log), vec!["main", "a2"]);
        }

        #[tokio::test]
        async fn polling_loops_see_later_timers() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source(
                    "const sleep = ms => new Promise(r => setTimeout(r, ms))\n\
                     let done = false\n\
                     async function wait() { while (!done) await sleep(10); console.log('done') }\n\
                     wait()\n\
                     setTimeout(() => { done = true }, 50)",
                )
                .await;
            assert!(result.success, "{result:?}");
            assert_eq!(fx.console.output(Stream::Log), vec!["done"]);
        }

        #[tokio::test]
        async fn deep_recursion() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source(
                    "function f(n) { return n === 0 ? 0 : 1 + f(n - 1) }\nreturn f(2000)",
                )
                .await;
            assert_eq!(result.output.as_deref(), Some("2000"), "{result:?}");
        }

        #[tokio::test]
        async fn unbounded_recursion_is_a_range_error() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source(
                    "function f() { return f() }\n\
                     try { f() } catch (e) { console.log(e instanceof RangeError, e.message) }",
                )
                .await;
            assert!(result.success, "{result:?}");
            assert_eq!(
                fx.console.output(Stream::Log),
                vec!["true Maximum call stack size exceeded"]
            );

            let result = fx.runtime.execute_source("function g() { return g() }\ng()").await;
            assert_eq!(
                result.error.as_deref(),
                Some("RangeError: Maximum call stack size exceeded")
            );
        }

        #[tokio::test]
        async fn esm_entry_points() {
            let fx = fixture(MemoryFs::with_files([(
                "/lib/greet.js",
                "export default function greet(name) { return `hi ${name}`; }",
            )]));
            fx.runtime
                .execute_source("import greet from './lib/greet'; console.log(greet('pyx'))")
                .await;
            assert_eq!(fx.console.output(Stream::Log), vec!["hi pyx"]);
        }

        #[tokio::test]
        async fn failed_preloads_are_not_fatal() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source("try { require('ghost') } catch (e) { console.log(e.code) }")
                .await;
            assert!(result.success);
            assert_eq!(fx.console.output(Stream::Log), vec!["MODULE_NOT_FOUND"]);
        }
    }

    mod files {
        use super::*;

        #[tokio::test]
        async fn execute_file_sets_and_restores_cwd() {
            let fx = fixture(MemoryFs::with_files([(
                "/tools/build.js",
                "console.log(process.cwd(), __dirname, __filename)",
            )]));
            let result = fx.runtime.execute_file("tools/build.js").await;
            assert!(result.success);
            assert_eq!(
                fx.console.output(Stream::Log),
                vec!["Executing: tools/build.js", "/tools /tools /tools/build.js"]
            );
            assert_eq!(fx.runtime.cwd().await, "/");
        }

        #[tokio::test]
        async fn missing_files_fail_cleanly() {
            let fx = fixture(MemoryFs::new());
            let result = fx.runtime.execute_file("/nope.js").await;
            assert_eq!(
                result.error.as_deref(),
                Some("Failed to execute file '/nope.js': ENOENT: no such file or directory, open '/nope.js'")
            );
        }

        #[tokio::test]
        async fn scripts_write_through_fs() {
            let fx = fixture(MemoryFs::new());
            let result = fx
                .runtime
                .execute_source(
                    "const fs = require('fs'); \
                     await fs.writeFile('/dist/out.txt', 'built'); \
                     console.log(await fs.readFile('/dist/out.txt'))",
                )
                .await;
            assert!(result.success, "{result:?}");
            assert_eq!(fx.fs.file_paths(), vec!["/dist/out.txt"]);
            assert_eq!(
                fx.sink.events(),
                vec![ChangeEvent::file("/dist/out.txt", "built").from_runtime()]
            );
            assert_eq!(
                fx.console.output(Stream::Log),
                vec!["File written: /dist/out.txt", "built"]
            );
        }
    }
}
