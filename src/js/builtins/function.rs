//! js::builtins::function
//!
//! `Function.prototype`: `call`, `apply`, `bind`, `toString`.

use super::{arg, define_constructor};
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, sync_fn, Value};

pub fn install(interp: &Interpreter) {
    let proto = interp.realm().function_proto.clone();
    define_constructor(
        interp,
        "Function",
        sync_fn(|interp, _, _| {
            Err(interp.error(
                crate::js::error::ErrorKind::Error,
                "Code generation from strings is not supported",
            ))
        }),
        &proto,
    );

    interp.define_method(
        &proto,
        "call",
        native_fn(|interp, this, args| {
            Box::pin(async move {
                let mut args = args.into_iter();
                let receiver = args.next().unwrap_or_default();
                interp.call(&this, receiver, args.collect()).await
            })
        }),
    );
    interp.define_method(
        &proto,
        "apply",
        native_fn(|interp, this, args| {
            Box::pin(async move {
                let list = match arg(&args, 1) {
                    Value::Undefined | Value::Null => Vec::new(),
                    list => interp.iterate(&list).await?,
                };
                interp.call(&this, arg(&args, 0), list).await
            })
        }),
    );
    interp.define_method(
        &proto,
        "bind",
        sync_fn(|interp, this, args| {
            if !this.is_callable() {
                return Err(interp.type_error("Bind must be called on a function"));
            }
            let name = this
                .as_object()
                .and_then(|f| f.function_name())
                .unwrap_or_default();
            let mut args = args.into_iter();
            let receiver = args.next().unwrap_or_default();
            let bound: Vec<Value> = args.collect();
            let target = this.clone();
            let call = native_fn(move |interp, _, args| {
                let target = target.clone();
                let receiver = receiver.clone();
                let mut full = bound.clone();
                full.extend(args);
                Box::pin(async move { interp.call(&target, receiver, full).await })
            });
            Ok(Value::from(interp.new_function(&format!("bound {name}"), call)))
        }),
    );
    interp.define_method(
        &proto,
        "toString",
        sync_fn(|_, this, _| Ok(Value::from(this.to_display_string()))),
    );
}
