//! js::builtins::object
//!
//! `Object` statics and `Object.prototype`.

use smol_str::SmolStr;

use super::{arg, define_constructor};
use crate::js::error::JsResult;
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, sync_fn, ObjectKind, Obj, Property, Slot, Value};

pub fn install(interp: &Interpreter) {
    let proto = interp.realm().object_proto.clone();
    let ctor = define_constructor(
        interp,
        "Object",
        sync_fn(|interp, _, args| match arg(&args, 0) {
            value @ Value::Object(_) => Ok(value),
            _ => Ok(Value::from(interp.new_object())),
        }),
        &proto,
    );

    interp.define_method(
        &ctor,
        "keys",
        sync_fn(|interp, _, args| {
            let obj = require_object(interp, &arg(&args, 0))?;
            let keys = obj.own_keys().into_iter().map(Value::from).collect();
            Ok(Value::from(interp.new_array(keys)))
        }),
    );
    interp.define_method(
        &ctor,
        "values",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                let obj = require_object(interp, &arg(&args, 0))?;
                let values = interp.entries(&obj).await?.into_iter().map(|(_, v)| v).collect();
                Ok(Value::from(interp.new_array(values)))
            })
        }),
    );
    interp.define_method(
        &ctor,
        "entries",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                let obj = require_object(interp, &arg(&args, 0))?;
                let pairs = interp
                    .entries(&obj)
                    .await?
                    .into_iter()
                    .map(|(k, v)| Value::from(interp.new_array(vec![Value::from(k), v])))
                    .collect();
                Ok(Value::from(interp.new_array(pairs)))
            })
        }),
    );
    interp.define_method(
        &ctor,
        "assign",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                let target = require_object(interp, &arg(&args, 0))?;
                for source in args.iter().skip(1) {
                    interp.copy_properties(&target, source).await?;
                }
                Ok(Value::from(target))
            })
        }),
    );
    interp.define_method(
        &ctor,
        "freeze",
        sync_fn(|_, _, args| {
            let value = arg(&args, 0);
            if let Value::Object(obj) = &value {
                obj.borrow_mut().frozen = true;
            }
            Ok(value)
        }),
    );
    interp.define_method(
        &ctor,
        "isFrozen",
        sync_fn(|_, _, args| {
            Ok(Value::Bool(match arg(&args, 0) {
                Value::Object(obj) => obj.borrow().frozen,
                _ => true,
            }))
        }),
    );
    interp.define_method(
        &ctor,
        "fromEntries",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                let obj = interp.new_object();
                for entry in interp.iterate(&arg(&args, 0)).await? {
                    let key = interp.get(&entry, "0").await?;
                    let value = interp.get(&entry, "1").await?;
                    let key = interp.to_property_key(&key).await?;
                    obj.set_own(key, value);
                }
                Ok(Value::from(obj))
            })
        }),
    );
    interp.define_method(
        &ctor,
        "create",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                let proto = match arg(&args, 0) {
                    Value::Object(proto) => Some(proto),
                    Value::Null => None,
                    other => {
                        return Err(interp.type_error(format!(
                            "Object prototype may only be an Object or null: {}",
                            other.to_display_string()
                        )))
                    }
                };
                let obj = Obj::new(ObjectKind::Ordinary, proto);
                if let Value::Object(props) = arg(&args, 1) {
                    for (key, descriptor) in interp.entries(&props).await? {
                        define_from_descriptor(interp, &obj, key, &descriptor).await?;
                    }
                }
                Ok(Value::from(obj))
            })
        }),
    );
    interp.define_method(
        &ctor,
        "getPrototypeOf",
        sync_fn(|interp, _, args| {
            let obj = require_object(interp, &arg(&args, 0))?;
            Ok(obj.proto().map_or(Value::Null, Value::from))
        }),
    );
    interp.define_method(
        &ctor,
        "setPrototypeOf",
        sync_fn(|_, _, args| {
            let target = arg(&args, 0);
            if let Value::Object(obj) = &target {
                obj.borrow_mut().proto = arg(&args, 1).as_object().cloned();
            }
            Ok(target)
        }),
    );
    interp.define_method(
        &ctor,
        "defineProperty",
        native_fn(|interp, _, args| {
            Box::pin(async move {
                let target = arg(&args, 0);
                let Value::Object(obj) = &target else {
                    return Err(interp.type_error("Object.defineProperty called on non-object"));
                };
                let key = interp.to_property_key(&arg(&args, 1)).await?;
                define_from_descriptor(interp, obj, key, &arg(&args, 2)).await?;
                Ok(target)
            })
        }),
    );
    interp.define_method(
        &ctor,
        "getOwnPropertyNames",
        sync_fn(|interp, _, args| {
            let obj = require_object(interp, &arg(&args, 0))?;
            let mut names = obj.own_keys();
            if obj.is_array() {
                names.push(SmolStr::new_inline("length"));
            }
            for key in obj.borrow().props.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            let names = names.into_iter().map(Value::from).collect();
            Ok(Value::from(interp.new_array(names)))
        }),
    );

    interp.define_method(
        &proto,
        "hasOwnProperty",
        native_fn(|interp, this, args| {
            Box::pin(async move {
                let key = interp.to_property_key(&arg(&args, 0)).await?;
                Ok(Value::Bool(match &this {
                    Value::Object(obj) => obj.has_own(&key),
                    Value::String(s) => {
                        key == "length"
                            || crate::js::value::array_index(&key)
                                .is_some_and(|i| i < s.chars().count())
                    }
                    _ => false,
                }))
            })
        }),
    );
    interp.define_method(
        &proto,
        "isPrototypeOf",
        sync_fn(|_, this, args| {
            Ok(Value::Bool(match (&this, &arg(&args, 0)) {
                (Value::Object(proto), Value::Object(obj)) => obj.inherits_from(proto),
                _ => false,
            }))
        }),
    );
    interp.define_method(
        &proto,
        "toString",
        sync_fn(|_, this, _| Ok(Value::from(object_tag(&this)))),
    );
    interp.define_method(&proto, "valueOf", sync_fn(|_, this, _| Ok(this)));
}

/// `Object.prototype.toString` rendering (`[object Array]`).
pub fn object_tag(value: &Value) -> String {
    let tag = match value {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Date(_) => "Date",
            ObjectKind::Bytes(_) => "Uint8Array",
            ObjectKind::Ordinary => "Object",
        },
    };
    format!("[object {tag}]")
}

fn require_object(interp: &Interpreter, value: &Value) -> JsResult<Obj> {
    match value {
        Value::Object(obj) => Ok(obj.clone()),
        Value::Undefined | Value::Null => {
            Err(interp.type_error("Cannot convert undefined or null to object"))
        }
        Value::String(s) => {
            let chars = s.chars().map(|c| Value::from(c.to_string())).collect();
            Ok(interp.new_array(chars))
        }
        _ => Ok(interp.new_object()),
    }
}

/// Apply a property descriptor (`{ value, get, set, enumerable }`).
async fn define_from_descriptor(
    interp: &Interpreter,
    obj: &Obj,
    key: SmolStr,
    descriptor: &Value,
) -> JsResult<()> {
    if !matches!(descriptor, Value::Object(_)) {
        return Err(interp.type_error(format!(
            "Property description must be an object: {}",
            descriptor.to_display_string()
        )));
    }
    let enumerable = interp.get(descriptor, "enumerable").await?.truthy();
    let getter = Some(interp.get(descriptor, "get").await?).filter(Value::is_callable);
    let setter = Some(interp.get(descriptor, "set").await?).filter(Value::is_callable);
    if getter.is_some() || setter.is_some() {
        obj.define_accessor(key, getter, setter, enumerable);
        return Ok(());
    }
    let value = interp.get(descriptor, "value").await?;
    if obj.is_array() && crate::js::value::array_index(&key).is_some() {
        obj.set_own(key, value);
        return Ok(());
    }
    obj.define(
        key,
        Property {
            slot: Slot::Data(value),
            enumerable,
        },
    );
    Ok(())
}
