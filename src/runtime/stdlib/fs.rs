//! The `fs` module.
//!
//! Only the asynchronous API exists. Each operation takes an optional
//! trailing error-first callback; without one it returns a promise, so the
//! same object doubles as `fs.promises`. Paths are resolved against the
//! project root. Every mutation creates missing parents, flushes the
//! filesystem and reports a runtime-originated change.

use std::rc::Rc;

use tracing::debug;

use crate::core::paths;
use crate::js::builtins::arg;
use crate::js::value::LocalBoxFuture;
use crate::js::{native_fn, sync_fn, Interpreter, JsError, JsResult, Obj, ObjectKind, Value};
use crate::notify::ChangeEvent;
use crate::runtime::console::Stream;
use crate::runtime::error::RuntimeError;
use crate::runtime::loader::Host;
use crate::vfs::{FsError, GIT_DIR};

use super::string_arg;

type Operation = for<'a> fn(&'a Interpreter, Rc<Host>, Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>>;

const ASYNC_OPS: [(&str, Operation); 8] = [
    ("readFile", read_file),
    ("writeFile", write_file),
    ("appendFile", append_file),
    ("mkdir", mkdir),
    ("readdir", readdir),
    ("unlink", unlink),
    ("stat", stat),
    ("existsSync", exists),
];

const SYNC_OPS: [&str; 7] = [
    "readFileSync",
    "writeFileSync",
    "appendFileSync",
    "mkdirSync",
    "readdirSync",
    "unlinkSync",
    "statSync",
];

pub(crate) fn module(host: &Rc<Host>, interp: &Interpreter) -> Obj {
    let fs = interp.new_object();
    for (name, op) in ASYNC_OPS {
        let host = host.clone();
        let call = if name == "existsSync" {
            native_fn(move |interp, _, args| {
                let host = host.clone();
                Box::pin(async move {
                    let outcome = op(interp, host, args).await;
                    Ok(complete(interp, None, outcome))
                })
            })
        } else {
            native_fn(move |interp, _, args| {
                let host = host.clone();
                let (args, callback) = split_callback(args);
                Box::pin(async move {
                    let outcome = op(interp, host, args).await;
                    Ok(complete(interp, callback, outcome))
                })
            })
        };
        interp.define_method(&fs, name, call);
    }
    for name in SYNC_OPS {
        interp.define_method(
            &fs,
            name,
            sync_fn(|interp, _, _| Err(RuntimeError::SyncUnsupported.into_js(interp))),
        );
    }
    fs.define_hidden("promises", Value::from(fs.clone()));
    fs
}

/// Separate a trailing callback from the operation's arguments.
fn split_callback(mut args: Vec<Value>) -> (Vec<Value>, Option<Value>) {
    match args.last() {
        Some(last) if last.is_callable() => {
            let callback = args.pop();
            (args, callback)
        }
        _ => (args, None),
    }
}

/// Deliver an outcome: to the callback on a later tick, or as a promise.
fn complete(interp: &Interpreter, callback: Option<Value>, outcome: JsResult<Value>) -> Value {
    match (callback, outcome) {
        (Some(callback), Ok(value)) => {
            interp.set_timer(callback, vec![Value::Null, value], 0, false);
            Value::Undefined
        }
        (Some(callback), Err(err)) => {
            interp.set_timer(callback, vec![err.value], 0, false);
            Value::Undefined
        }
        (None, Ok(value)) => Value::from(interp.resolved_promise(value)),
        (None, Err(err)) => Value::from(interp.rejected_promise(err.value)),
    }
}

fn path_arg(interp: &Interpreter, args: &[Value]) -> JsResult<String> {
    Ok(paths::resolve_from("/", &string_arg(interp, args, 0, "path")?))
}

fn fs_error(interp: &Interpreter, err: FsError) -> JsError {
    RuntimeError::Fs(err).into_js(interp)
}

/// Contents to write: strings as UTF-8, buffers as-is, anything else by
/// string conversion.
async fn data_arg(interp: &Interpreter, value: &Value) -> JsResult<Vec<u8>> {
    if let Value::Object(obj) = value {
        if let ObjectKind::Bytes(bytes) = &obj.borrow().kind {
            return Ok(bytes.clone());
        }
    }
    Ok(interp.to_string(value).await?.into_bytes())
}

fn read_file<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        let text = host
            .fs
            .read_to_string(&path)
            .await
            .map_err(|e| fs_error(interp, e))?;
        Ok(Value::from(text))
    })
}

fn write_file<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        let data = data_arg(interp, &arg(&args, 1)).await?;
        host.write_file(&path, &data).await.map_err(|e| {
            let code = e.code();
            interp.error_with_code(format!("Failed to write file '{path}': {e}"), code)
        })?;
        host.console.write(Stream::Log, &format!("File written: {path}"));
        Ok(Value::Undefined)
    })
}

fn append_file<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        let mut data = host.fs.read_file(&path).await.unwrap_or_default();
        data.extend(data_arg(interp, &arg(&args, 1)).await?);
        host.write_file(&path, &data).await.map_err(|e| {
            let code = e.code();
            interp.error_with_code(format!("Failed to append to file '{path}': {e}"), code)
        })?;
        Ok(Value::Undefined)
    })
}

fn mkdir<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        let recursive = match arg(&args, 1) {
            options @ Value::Object(_) => interp.get(&options, "recursive").await?.truthy(),
            _ => false,
        };
        host.ensure_parent(&path)
            .await
            .map_err(|e| fs_error(interp, e))?;
        host.fs
            .mkdir(&path, recursive)
            .await
            .map_err(|e| fs_error(interp, e))?;
        host.settle().await;
        host.notify(ChangeEvent::folder(&path)).await;
        Ok(Value::Undefined)
    })
}

fn readdir<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        let names = host
            .fs
            .readdir(&path)
            .await
            .map_err(|e| fs_error(interp, e))?;
        let names = names
            .into_iter()
            .filter(|name| name != GIT_DIR)
            .map(Value::from)
            .collect();
        Ok(Value::from(interp.new_array(names)))
    })
}

fn unlink<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        host.fs
            .unlink(&path)
            .await
            .map_err(|e| fs_error(interp, e))?;
        host.settle().await;
        host.notify(ChangeEvent::delete(&path)).await;
        Ok(Value::Undefined)
    })
}

fn stat<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        let meta = host
            .fs
            .stat(&path)
            .await
            .map_err(|e| fs_error(interp, e))?;
        let stats = interp.new_object();
        stats.set_own("size", Value::from(meta.size as f64));
        let (is_file, is_dir) = (meta.is_file(), meta.is_directory());
        interp.define_method(&stats, "isFile", sync_fn(move |_, _, _| Ok(Value::Bool(is_file))));
        interp.define_method(&stats, "isDirectory", sync_fn(move |_, _, _| Ok(Value::Bool(is_dir))));
        Ok(Value::from(stats))
    })
}

fn exists<'a>(interp: &'a Interpreter, host: Rc<Host>, args: Vec<Value>) -> LocalBoxFuture<'a, JsResult<Value>> {
    Box::pin(async move {
        let path = path_arg(interp, &args)?;
        let found = host.fs.exists(&path).await;
        debug!(%path, found, "existsSync");
        Ok(Value::Bool(found))
    })
}
