//! runtime::loader
//!
//! Module resolution, loading and the shared host state behind `require`.
//!
//! Resolution order for a specifier: the module cache, the built-in
//! modules, local candidate files (see [`super::resolve`]), then a CDN for
//! bare package names. Loaded modules are cached by the specifier text as
//! written; an entry is never replaced once set.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::config::RuntimeSettings;
use crate::core::paths;
use crate::js::builtins::json;
use crate::js::value::LocalBoxFuture;
use crate::js::{native_fn, parse, Interpreter, Obj, Value};
use crate::notify::{ChangeEvent, ChangeSink};
use crate::vfs::{Filesystem, FsError};

use super::cdn::CdnClient;
use super::console::Console;
use super::error::RuntimeError;
use super::resolve::{candidates, is_builtin, is_json, is_package_name};
use super::stdlib;
use super::transform::{scan_dependencies, to_commonjs};

/// State shared by the runtime, its `require` functions and the emulated
/// built-in modules.
pub(crate) struct Host {
    pub(crate) fs: Arc<dyn Filesystem>,
    pub(crate) sink: Arc<dyn ChangeSink>,
    pub(crate) console: Arc<dyn Console>,
    pub(crate) settings: RuntimeSettings,
    cdn: CdnClient,
    cache: RefCell<HashMap<String, Value>>,
    /// `module` objects of files still executing, by path
    loading: RefCell<HashMap<String, Obj>>,
    cwd: RefCell<String>,
}

impl Host {
    pub(crate) fn new(
        fs: Arc<dyn Filesystem>,
        sink: Arc<dyn ChangeSink>,
        console: Arc<dyn Console>,
        settings: RuntimeSettings,
    ) -> Self {
        let cdn = CdnClient::new(settings.cdn_endpoints.clone());
        Self {
            fs,
            sink,
            console,
            settings,
            cdn,
            cache: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashMap::new()),
            cwd: RefCell::new("/".to_string()),
        }
    }

    pub(crate) fn cwd(&self) -> String {
        self.cwd.borrow().clone()
    }

    /// Set the working directory, returning the previous one.
    pub(crate) fn replace_cwd(&self, dir: String) -> String {
        std::mem::replace(&mut *self.cwd.borrow_mut(), dir)
    }

    pub(crate) fn is_cached(&self, specifier: &str) -> bool {
        self.cache.borrow().contains_key(specifier)
    }

    // ------------------------------------------------------------------
    // Filesystem side effects

    pub(crate) async fn notify(&self, event: ChangeEvent) {
        self.sink.notify(event.from_runtime()).await;
    }

    /// Flush the filesystem and pause for the configured delay.
    pub(crate) async fn settle(&self) {
        if let Err(e) = self.fs.flush().await {
            warn!(error = %e, "filesystem flush failed");
        }
        if self.settings.flush_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.flush_delay_ms)).await;
        }
    }

    /// Create the parent directory of `path` when missing.
    pub(crate) async fn ensure_parent(&self, path: &str) -> Result<(), FsError> {
        let parent = paths::dirname(path);
        if parent != "/" && !self.fs.exists(&parent).await {
            self.fs.mkdir(&parent, true).await?;
        }
        Ok(())
    }

    /// Write a file the way executed code does: parent created, flushed,
    /// then reported with its content.
    pub(crate) async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        self.ensure_parent(path).await?;
        self.fs.write_file(path, data).await?;
        self.settle().await;
        self.notify(ChangeEvent::file(path, String::from_utf8_lossy(data)))
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resolution

    /// Resolve and load `specifier` as required from directory `dir`.
    pub(crate) fn resolve<'a>(
        self: &'a Rc<Self>,
        interp: &'a Interpreter,
        specifier: &'a str,
        dir: &'a str,
    ) -> LocalBoxFuture<'a, Result<Value, RuntimeError>> {
        Box::pin(async move {
            if let Some(hit) = self.cache.borrow().get(specifier).cloned() {
                debug!(module = specifier, "module cache hit");
                return Ok(hit);
            }
            let value = self.locate(interp, specifier, dir).await?;
            let value = self
                .cache
                .borrow_mut()
                .entry(specifier.to_string())
                .or_insert(value)
                .clone();
            Ok(value)
        })
    }

    async fn locate(
        self: &Rc<Self>,
        interp: &Interpreter,
        specifier: &str,
        dir: &str,
    ) -> Result<Value, RuntimeError> {
        if is_builtin(specifier) {
            return stdlib::create(self, interp, specifier);
        }

        for candidate in candidates(specifier, dir) {
            if let Ok(meta) = self.fs.stat(&candidate).await {
                if meta.is_file() {
                    debug!(module = specifier, path = %candidate, "resolved locally");
                    return self.load_file(interp, &candidate).await;
                }
            }
        }

        if is_package_name(specifier) && self.settings.cdn_fallback {
            match self.load_from_cdn(interp, specifier).await {
                Ok(value) => return Ok(value),
                Err(e @ RuntimeError::Cdn { .. }) => debug!(error = %e, "CDN fallback failed"),
                Err(e) => return Err(e),
            }
        }

        Err(RuntimeError::module_not_found(specifier))
    }

    async fn load_file(self: &Rc<Self>, interp: &Interpreter, path: &str) -> Result<Value, RuntimeError> {
        let code = self.fs.read_to_string(path).await?;
        if is_json(path) {
            let parsed: serde_json::Value =
                serde_json::from_str(&code).map_err(|e| RuntimeError::InvalidJson {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
            return Ok(json::from_json(interp, &parsed));
        }
        self.execute_module(interp, &code, path, false).await
    }

    async fn load_from_cdn(self: &Rc<Self>, interp: &Interpreter, name: &str) -> Result<Value, RuntimeError> {
        let fetched = self.cdn.fetch(name).await?;
        let filename = format!("/node_modules/{name}/index.js");
        if let Err(e) = self.write_file(&filename, fetched.code.as_bytes()).await {
            warn!(module = name, error = %e, "could not persist CDN module");
        }
        self.execute_module(interp, &fetched.code, &filename, true).await
    }

    /// Run `code` as the CommonJS module `filename` and return its exports.
    ///
    /// A module required while it is still executing gets its exports as
    /// they stand.
    async fn execute_module(
        self: &Rc<Self>,
        interp: &Interpreter,
        code: &str,
        filename: &str,
        with_global: bool,
    ) -> Result<Value, RuntimeError> {
        let pending = self.loading.borrow().get(filename).cloned();
        if let Some(module) = pending {
            debug!(path = filename, "circular require");
            return Ok(module.get_data("exports").unwrap_or_default());
        }

        let program = parse(&to_commonjs(code))
            .map_err(|e| RuntimeError::module_failed(filename, RuntimeError::Syntax(e)))?;
        let (module, exports) = self.module_objects(interp, filename);
        let dir = paths::dirname(filename);
        let mut params = self.module_params(interp, &module, &exports, filename, &dir);
        if with_global {
            params.push(("global", Value::from(interp.new_object())));
        }

        self.loading
            .borrow_mut()
            .insert(filename.to_string(), module.clone());
        let result = interp
            .run_module(&program, &params, Value::from(exports))
            .await;
        self.loading.borrow_mut().remove(filename);
        result.map_err(|e| RuntimeError::module_failed(filename, e.message()))?;

        let exports = interp
            .get(&Value::from(module), "exports")
            .await
            .map_err(|e| RuntimeError::module_failed(filename, e.message()))?;
        Ok(promote_default(exports))
    }

    /// Fresh `module` and `module.exports` objects.
    pub(crate) fn module_objects(&self, interp: &Interpreter, filename: &str) -> (Obj, Obj) {
        let module = interp.new_object();
        let exports = interp.new_object();
        module.set_own("exports", Value::from(exports.clone()));
        module.set_own("id", Value::from(filename));
        module.set_own("filename", Value::from(filename));
        (module, exports)
    }

    /// Bindings every module body receives.
    pub(crate) fn module_params(
        self: &Rc<Self>,
        interp: &Interpreter,
        module: &Obj,
        exports: &Obj,
        filename: &str,
        dir: &str,
    ) -> Vec<(&'static str, Value)> {
        vec![
            ("require", Value::from(self.require_fn(interp, dir.to_string()))),
            ("module", Value::from(module.clone())),
            ("exports", Value::from(exports.clone())),
            ("__filename", Value::from(filename)),
            ("__dirname", Value::from(dir)),
        ]
    }

    /// `require` bound to a module directory.
    pub(crate) fn require_fn(self: &Rc<Self>, interp: &Interpreter, dir: String) -> Obj {
        let host = self.clone();
        interp.new_function(
            "require",
            native_fn(move |interp, _, args| {
                let host = host.clone();
                let dir = dir.clone();
                Box::pin(async move {
                    let specifier = match args.first() {
                        Some(Value::String(s)) => s.to_string(),
                        other => {
                            let received = other.map(Value::type_of).unwrap_or("undefined");
                            return Err(interp.error_with_code(
                                format!(
                                    "The \"id\" argument must be of type string. Received {received}"
                                ),
                                "ERR_INVALID_ARG_TYPE",
                            ));
                        }
                    };
                    host.resolve(interp, &specifier, &dir)
                        .await
                        .map_err(|e| e.into_js(interp))
                })
            }),
        )
    }

    /// Load every dependency `source` names ahead of execution. Failures
    /// are logged and left for the `require` call to report.
    pub(crate) async fn preload(self: &Rc<Self>, interp: &Interpreter, source: &str, dir: &str) {
        for specifier in scan_dependencies(source) {
            if self.is_cached(&specifier) {
                continue;
            }
            if let Err(e) = self.resolve(interp, &specifier, dir).await {
                warn!(module = %specifier, error = %e, "failed to preload module");
            }
        }
    }
}

/// Exports whose only key is `default` stand for that value.
fn promote_default(exports: Value) -> Value {
    if let Value::Object(obj) = &exports {
        let keys = obj.own_keys();
        if !obj.is_callable() && !obj.is_array() && keys.len() == 1 && keys[0].as_str() == "default" {
            if let Some(inner) = obj.get_own_data("default") {
                return inner;
            }
        }
    }
    exports
}
