//! js::builtins::error
//!
//! `Error` and its subclasses.
//!
//! Constructing an error (directly, or through `super()` from a class that
//! extends one) turns the receiver into an error object, so `stack` and the
//! engine's own error rendering work for user-defined subclasses too.

use super::{arg, define_constructor};
use crate::js::error::ErrorKind;
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, Obj, ObjectKind, Value};

pub fn install(interp: &Interpreter) {
    for kind in ErrorKind::ALL {
        let proto = interp.realm().error_proto(kind).clone();
        proto.define_hidden("name", Value::from(kind.name()));
        proto.define_hidden("message", Value::from(""));
        let ctor = define_constructor(
            interp,
            kind.name(),
            native_fn(move |interp, this, args| {
                Box::pin(async move {
                    let error = receiver(interp, &this, kind);
                    let message = arg(&args, 0);
                    if !message.is_undefined() {
                        let text = interp.to_string(&message).await?;
                        error.define_hidden("message", Value::from(text));
                    }
                    if let Value::Object(options) = arg(&args, 1) {
                        if options.has_property("cause") {
                            let cause = interp.get(&Value::from(options.clone()), "cause").await?;
                            error.define_hidden("cause", cause);
                        }
                    }
                    let name = interp.get(&Value::from(error.clone()), "name").await?;
                    let message = interp.get(&Value::from(error.clone()), "message").await?;
                    let header = match message.to_display_string() {
                        m if m.is_empty() => name.to_display_string(),
                        m => format!("{}: {m}", name.to_display_string()),
                    };
                    error.define_hidden("stack", Value::from(format!("{header}\n    at <anonymous>")));
                    Ok(Value::from(error))
                })
            }),
            &proto,
        );
        if kind != ErrorKind::Error {
            let base = interp.realm().error_proto(ErrorKind::Error).clone();
            if let Some(base_ctor) = base.get_own_data("constructor").and_then(|c| c.as_object().cloned()) {
                ctor.borrow_mut().proto = Some(base_ctor);
            }
        }
    }

    let base = interp.realm().error_proto(ErrorKind::Error).clone();
    interp.define_method(
        &base,
        "toString",
        native_fn(|interp, this, _| {
            Box::pin(async move {
                if !matches!(this, Value::Object(_)) {
                    return Err(interp.type_error("Error.prototype.toString called on non-object"));
                }
                let name = match interp.get(&this, "name").await? {
                    Value::Undefined => "Error".to_string(),
                    v => interp.to_string(&v).await?,
                };
                let message = match interp.get(&this, "message").await? {
                    Value::Undefined => String::new(),
                    v => interp.to_string(&v).await?,
                };
                Ok(Value::from(match (name.is_empty(), message.is_empty()) {
                    (_, true) => name,
                    (true, false) => message,
                    (false, false) => format!("{name}: {message}"),
                }))
            })
        }),
    );
}

/// The object a constructor call initializes: the `new`-created receiver,
/// or a fresh error when called as a plain function.
fn receiver(interp: &Interpreter, this: &Value, kind: ErrorKind) -> Obj {
    if let Value::Object(obj) = this {
        let base = interp.realm().error_proto(ErrorKind::Error);
        let ordinary = matches!(obj.borrow().kind, ObjectKind::Ordinary);
        if ordinary && obj.inherits_from(base) {
            obj.borrow_mut().kind = ObjectKind::Error;
            return obj.clone();
        }
    }
    interp.make_error(kind, "")
}
