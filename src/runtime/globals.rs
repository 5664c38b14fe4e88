//! runtime::globals
//!
//! `process` and `Buffer`, the Node globals that are not modules.

use std::rc::Rc;

use crate::js::builtins::{arg, callback, define_constructor};
use crate::js::{native_fn, sync_fn, Interpreter, JsResult, Obj, ObjectKind, Value};

use super::loader::Host;

/// The script-side `process` object. `cwd()` follows the runtime's working
/// directory.
pub(crate) fn process_object(interp: &Interpreter, host: &Rc<Host>) -> Obj {
    let process = interp.new_object();

    let cwd_host = host.clone();
    interp.define_method(
        &process,
        "cwd",
        sync_fn(move |_, _, _| Ok(Value::from(cwd_host.cwd()))),
    );

    let env = interp.new_object();
    env.set_own("NODE_ENV", Value::from("development"));
    process.set_own("env", Value::from(env));

    let version = host.settings.node_version.clone();
    let versions = interp.new_object();
    versions.set_own("node", Value::from(version.trim_start_matches('v')));
    process.set_own("version", Value::from(version));
    process.set_own("versions", Value::from(versions));
    process.set_own("platform", Value::from("browser"));
    process.set_own(
        "argv",
        Value::from(interp.new_array(vec![Value::from("node"), Value::from("script.js")])),
    );

    interp.define_method(
        &process,
        "nextTick",
        sync_fn(|interp, _, args| {
            let target = callback(interp, &args, 0)?;
            let extra: Vec<Value> = args.into_iter().skip(1).collect();
            let run = interp.new_function(
                "tick",
                native_fn(move |interp, _, _| {
                    let target = target.clone();
                    let extra = extra.clone();
                    Box::pin(async move { interp.call(&target, Value::Undefined, extra).await })
                }),
            );
            let ready = interp.resolved_promise(Value::Undefined);
            interp.promise_then(&ready, Value::from(run), Value::Undefined);
            Ok(Value::Undefined)
        }),
    );
    process
}

fn bytes_of(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Bytes(bytes) => Some(bytes.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn is_hex(encoding: &Value) -> bool {
    encoding.as_str() == Some("hex")
}

fn buffer_from(interp: &Interpreter, args: &[Value]) -> JsResult<Value> {
    let source = arg(args, 0);
    let bytes = match &source {
        Value::String(s) if is_hex(&arg(args, 1)) => hex::decode(s.as_str())
            .map_err(|e| interp.type_error(format!("Invalid hex string: {e}")))?,
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Object(obj) if obj.is_array() => obj
            .array_elements()
            .unwrap_or_default()
            .iter()
            .map(|v| (v.to_uint32() & 0xff) as u8)
            .collect(),
        other => bytes_of(other).ok_or_else(|| {
            interp.type_error(
                "The first argument must be of type string or an instance of Buffer or Array",
            )
        })?,
    };
    Ok(Value::from(interp.new_bytes(bytes)))
}

/// Install the `Buffer` constructor and the buffer prototype methods.
pub(crate) fn install_buffer(interp: &Interpreter) {
    let proto = interp.realm().bytes_proto.clone();
    let ctor = define_constructor(
        interp,
        "Buffer",
        sync_fn(|interp, _, _| {
            Err(interp.type_error("Buffer() is not supported; use Buffer.from() or Buffer.alloc()"))
        }),
        &proto,
    );

    interp.define_method(&ctor, "from", sync_fn(|interp, _, args| buffer_from(interp, &args)));
    interp.define_method(
        &ctor,
        "isBuffer",
        sync_fn(|_, _, args| Ok(Value::Bool(bytes_of(&arg(&args, 0)).is_some()))),
    );
    interp.define_method(
        &ctor,
        "alloc",
        sync_fn(|interp, _, args| {
            let size = arg(&args, 0).to_number();
            if !(size.is_finite() && size >= 0.0) {
                return Err(interp.range_error(format!("Invalid buffer size: {}", arg(&args, 0).to_display_string())));
            }
            let fill = (arg(&args, 1).to_uint32() & 0xff) as u8;
            Ok(Value::from(interp.new_bytes(vec![fill; size as usize])))
        }),
    );
    interp.define_method(
        &ctor,
        "concat",
        sync_fn(|interp, _, args| {
            let list = arg(&args, 0)
                .as_object()
                .and_then(Obj::array_elements)
                .ok_or_else(|| interp.type_error("The \"list\" argument must be an Array of Buffers"))?;
            let mut joined = Vec::new();
            for item in &list {
                let bytes = bytes_of(item)
                    .ok_or_else(|| interp.type_error("The \"list\" argument must be an Array of Buffers"))?;
                joined.extend(bytes);
            }
            Ok(Value::from(interp.new_bytes(joined)))
        }),
    );
    interp.define_method(
        &ctor,
        "byteLength",
        sync_fn(|_, _, args| match arg(&args, 0) {
            Value::String(s) => Ok(Value::from(s.len())),
            other => Ok(Value::from(bytes_of(&other).map_or(0, |b| b.len()))),
        }),
    );

    interp.define_method(
        &proto,
        "toString",
        sync_fn(|_, this, args| {
            let bytes = bytes_of(&this).unwrap_or_default();
            let text = if is_hex(&arg(&args, 0)) {
                hex::encode(&bytes)
            } else {
                String::from_utf8_lossy(&bytes).into_owned()
            };
            Ok(Value::from(text))
        }),
    );
    interp.define_method(
        &proto,
        "equals",
        sync_fn(|_, this, args| {
            let equal = matches!(
                (bytes_of(&this), bytes_of(&arg(&args, 0))),
                (Some(a), Some(b)) if a == b
            );
            Ok(Value::Bool(equal))
        }),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::config::RuntimeSettings;
    use crate::js::{parse, Options};
    use crate::notify::NullSink;
    use crate::runtime::console::CapturedConsole;
    use crate::vfs::MemoryFs;

    async fn eval(source: &str) -> String {
        let host = Rc::new(Host::new(
            Arc::new(MemoryFs::new()),
            Arc::new(NullSink),
            Arc::new(CapturedConsole::new()),
            RuntimeSettings::default(),
        ));
        host.replace_cwd("/src".to_string());
        let interp = Interpreter::new(Options::default());
        interp.define_global("process", process_object(&interp, &host));
        install_buffer(&interp);
        let program = parse(source).unwrap();
        let value = interp.run_script(&program).await.unwrap();
        interp.run_event_loop().await;
        match value.as_object().and_then(Obj::array_elements) {
            Some(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            None => value.to_display_string(),
        }
    }

    mod process {
        use super::*;

        #[tokio::test]
        async fn descriptors() {
            assert_eq!(
                eval("[process.cwd(), process.env.NODE_ENV, process.version, process.versions.node, process.platform, process.argv.join(' ')].join('|')").await,
                "/src|development|v18.0.0|18.0.0|browser|node script.js"
            );
        }

        #[tokio::test]
        async fn next_tick_runs_before_timers() {
            assert_eq!(
                eval("const seen = []; setTimeout(() => seen.push('timer'), 0); process.nextTick(v => seen.push(v), 'tick'); seen").await,
                "tick,timer"
            );
        }
    }

    mod buffer {
        use super::*;

        #[tokio::test]
        async fn from_string_and_array() {
            assert_eq!(eval("Buffer.from('hi').toString()").await, "hi");
            assert_eq!(eval("Buffer.from([104, 105]).toString('hex')").await, "6869");
            assert_eq!(eval("Buffer.from('6869', 'hex').toString()").await, "hi");
            assert_eq!(eval("Buffer.from('héllo').length").await, "6");
        }

        #[tokio::test]
        async fn type_checks() {
            assert_eq!(
                eval("[Buffer.isBuffer(Buffer.alloc(2)), Buffer.isBuffer('x'), Buffer.from('a') instanceof Buffer].join()").await,
                "true,false,true"
            );
        }

        #[tokio::test]
        async fn concat_and_equals() {
            assert_eq!(
                eval("Buffer.concat([Buffer.from('a'), Buffer.from('b')]).equals(Buffer.from('ab'))").await,
                "true"
            );
        }
    }
}
