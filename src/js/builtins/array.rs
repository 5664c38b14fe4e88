//! js::builtins::array
//!
//! `Array` and `Array.prototype`.
//!
//! Callback methods iterate over a snapshot of the elements taken when the
//! method starts, so callbacks that mutate the array do not disturb the
//! walk. `sort` is a stable bottom-up merge sort; comparators may be any
//! script function, so every comparison is a suspension point.

use std::cmp::Ordering;

use super::{arg, callback, define_constructor, relative_index};
use crate::js::error::JsResult;
use crate::js::interp::Interpreter;
use crate::js::value::{native_fn, sync_fn, NativeFn, Obj, ObjectKind, Value};

pub fn install(interp: &Interpreter) {
    let proto = interp.realm().array_proto.clone();
    let ctor = define_constructor(
        interp,
        "Array",
        sync_fn(|interp, _, args| {
            if let [Value::Number(n)] = args.as_slice() {
                if n.fract() != 0.0 || *n < 0.0 || *n > f64::from(u32::MAX) {
                    return Err(interp.range_error("Invalid array length"));
                }
                return Ok(Value::from(interp.new_array(vec![Value::Undefined; *n as usize])));
            }
            Ok(Value::from(interp.new_array(args)))
        }),
        &proto,
    );

    interp.define_method(
        &ctor,
        "isArray",
        sync_fn(|_, _, args| Ok(Value::Bool(arg(&args, 0).as_object().is_some_and(Obj::is_array)))),
    );
    interp.define_method(
        &ctor,
        "of",
        sync_fn(|interp, _, args| Ok(Value::from(interp.new_array(args)))),
    );
    interp.define_method(
        &ctor,
        "from",
        native_fn(|interp, _, args| Box::pin(array_from(interp, args))),
    );

    let methods: [(&str, NativeFn); 33] = [
        ("push", sync_fn(push)),
        ("pop", sync_fn(pop)),
        ("shift", sync_fn(shift)),
        ("unshift", sync_fn(unshift)),
        ("slice", sync_fn(slice)),
        ("splice", sync_fn(splice)),
        ("concat", sync_fn(concat)),
        ("reverse", sync_fn(reverse)),
        ("fill", sync_fn(fill)),
        ("at", sync_fn(at)),
        ("flat", sync_fn(flat)),
        ("indexOf", sync_fn(index_of)),
        ("lastIndexOf", sync_fn(last_index_of)),
        ("includes", sync_fn(includes)),
        ("keys", sync_fn(keys)),
        ("entries", sync_fn(entries)),
        ("join", native_fn(|i, t, a| Box::pin(join(i, t, a)))),
        ("toString", native_fn(|i, t, _| Box::pin(join(i, t, Vec::new())))),
        ("forEach", native_fn(|i, t, a| Box::pin(for_each(i, t, a)))),
        ("map", native_fn(|i, t, a| Box::pin(map(i, t, a)))),
        ("filter", native_fn(|i, t, a| Box::pin(filter(i, t, a)))),
        ("find", native_fn(|i, t, a| Box::pin(find(i, t, a, Find::Value)))),
        ("findIndex", native_fn(|i, t, a| Box::pin(find(i, t, a, Find::Index)))),
        ("findLast", native_fn(|i, t, a| Box::pin(find(i, t, a, Find::LastValue)))),
        ("findLastIndex", native_fn(|i, t, a| Box::pin(find(i, t, a, Find::LastIndex)))),
        ("some", native_fn(|i, t, a| Box::pin(some(i, t, a)))),
        ("every", native_fn(|i, t, a| Box::pin(every(i, t, a)))),
        ("reduce", native_fn(|i, t, a| Box::pin(reduce(i, t, a, false)))),
        ("reduceRight", native_fn(|i, t, a| Box::pin(reduce(i, t, a, true)))),
        ("flatMap", native_fn(|i, t, a| Box::pin(flat_map(i, t, a)))),
        ("sort", native_fn(|i, t, a| Box::pin(sort(i, t, a)))),
        ("toSorted", native_fn(|i, t, a| Box::pin(to_sorted(i, t, a)))),
        ("toReversed", sync_fn(to_reversed)),
    ];
    for (name, call) in methods {
        interp.define_method(&proto, name, call);
    }
}

/// The receiver as an array object.
fn this_array(interp: &Interpreter, this: &Value, method: &str) -> JsResult<Obj> {
    match this.as_object() {
        Some(obj) if obj.is_array() => Ok(obj.clone()),
        _ => Err(interp.type_error(format!(
            "Array.prototype.{method} called on non-array"
        ))),
    }
}

fn snapshot(interp: &Interpreter, this: &Value, method: &str) -> JsResult<(Obj, Vec<Value>)> {
    let obj = this_array(interp, this, method)?;
    let items = obj.array_elements().unwrap_or_default();
    Ok((obj, items))
}

/// Run `f` against the receiver's element vector.
fn with_items<R>(
    interp: &Interpreter,
    this: &Value,
    method: &str,
    f: impl FnOnce(&mut Vec<Value>) -> R,
) -> JsResult<R> {
    let obj = this_array(interp, this, method)?;
    let mut object = obj.borrow_mut();
    if object.frozen {
        return Err(interp.type_error(format!(
            "Cannot modify a frozen array with {method}"
        )));
    }
    match &mut object.kind {
        ObjectKind::Array(items) => Ok(f(items)),
        _ => Err(interp.type_error(format!("Array.prototype.{method} called on non-array"))),
    }
}

async fn array_from(interp: &Interpreter, args: Vec<Value>) -> JsResult<Value> {
    let source = arg(&args, 0);
    let items = match &source {
        Value::Object(obj) if !obj.is_array() && !matches!(obj.borrow().kind, ObjectKind::Bytes(_)) => {
            let len = interp.get(&source, "length").await?.to_integer().max(0.0) as usize;
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                items.push(interp.get(&source, &i.to_string()).await?);
            }
            items
        }
        Value::Undefined | Value::Null => {
            return Err(interp.type_error(format!(
                "{} is not iterable",
                source.to_display_string()
            )))
        }
        _ => interp.iterate(&source).await?,
    };
    let mapper = arg(&args, 1);
    if !mapper.is_callable() {
        return Ok(Value::from(interp.new_array(items)));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        mapped.push(interp.call(&mapper, Value::Undefined, vec![item, Value::from(i)]).await?);
    }
    Ok(Value::from(interp.new_array(mapped)))
}

fn push(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    with_items(interp, &this, "push", |items| {
        items.extend(args);
        Value::from(items.len())
    })
}

fn pop(interp: &Interpreter, this: Value, _: Vec<Value>) -> JsResult<Value> {
    with_items(interp, &this, "pop", |items| items.pop().unwrap_or_default())
}

fn shift(interp: &Interpreter, this: Value, _: Vec<Value>) -> JsResult<Value> {
    with_items(interp, &this, "shift", |items| {
        if items.is_empty() {
            Value::Undefined
        } else {
            items.remove(0)
        }
    })
}

fn unshift(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    with_items(interp, &this, "unshift", |items| {
        items.splice(0..0, args);
        Value::from(items.len())
    })
}

fn slice(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "slice")?;
    let start = relative_index(&arg(&args, 0), items.len(), 0);
    let end = relative_index(&arg(&args, 1), items.len(), items.len());
    let part = if start < end { items[start..end].to_vec() } else { Vec::new() };
    Ok(Value::from(interp.new_array(part)))
}

fn splice(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let removed = with_items(interp, &this, "splice", |items| {
        let len = items.len();
        let start = relative_index(&arg(&args, 0), len, 0);
        let count = match args.len() {
            0 => 0,
            1 => len - start,
            _ => (arg(&args, 1).to_integer().max(0.0) as usize).min(len - start),
        };
        let inserted = args.iter().skip(2).cloned();
        items.splice(start..start + count, inserted).collect::<Vec<_>>()
    })?;
    Ok(Value::from(interp.new_array(removed)))
}

fn concat(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, mut items) = snapshot(interp, &this, "concat")?;
    for value in args {
        match value.as_object().and_then(Obj::array_elements) {
            Some(more) => items.extend(more),
            None => items.push(value),
        }
    }
    Ok(Value::from(interp.new_array(items)))
}

fn reverse(interp: &Interpreter, this: Value, _: Vec<Value>) -> JsResult<Value> {
    with_items(interp, &this, "reverse", |items| items.reverse())?;
    Ok(this)
}

fn to_reversed(interp: &Interpreter, this: Value, _: Vec<Value>) -> JsResult<Value> {
    let (_, mut items) = snapshot(interp, &this, "toReversed")?;
    items.reverse();
    Ok(Value::from(interp.new_array(items)))
}

fn fill(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    with_items(interp, &this, "fill", |items| {
        let len = items.len();
        let start = relative_index(&arg(&args, 1), len, 0);
        let end = relative_index(&arg(&args, 2), len, len);
        for item in items.iter_mut().take(end).skip(start) {
            *item = arg(&args, 0);
        }
    })?;
    Ok(this)
}

fn at(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "at")?;
    let n = arg(&args, 0).to_integer();
    let index = if n < 0.0 { items.len() as f64 + n } else { n };
    if index < 0.0 {
        return Ok(Value::Undefined);
    }
    Ok(items.get(index as usize).cloned().unwrap_or_default())
}

fn flatten_into(items: Vec<Value>, depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item.as_object().and_then(Obj::array_elements) {
            Some(inner) if depth >= 1.0 => flatten_into(inner, depth - 1.0, out),
            _ => out.push(item),
        }
    }
}

fn flat(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "flat")?;
    let depth = match arg(&args, 0) {
        Value::Undefined => 1.0,
        depth => depth.to_integer(),
    };
    let mut out = Vec::new();
    flatten_into(items, depth, &mut out);
    Ok(Value::from(interp.new_array(out)))
}

fn index_of(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "indexOf")?;
    let target = arg(&args, 0);
    let from = relative_index(&arg(&args, 1), items.len(), 0);
    let found = items
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, v)| v.strict_equals(&target));
    Ok(Value::Number(found.map_or(-1.0, |(i, _)| i as f64)))
}

fn last_index_of(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "lastIndexOf")?;
    let target = arg(&args, 0);
    let found = items.iter().rposition(|v| v.strict_equals(&target));
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn includes(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "includes")?;
    let target = arg(&args, 0);
    Ok(Value::Bool(items.iter().any(|v| v.same_value_zero(&target))))
}

fn keys(interp: &Interpreter, this: Value, _: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "keys")?;
    let keys = (0..items.len()).map(Value::from).collect();
    Ok(Value::from(interp.new_array(keys)))
}

fn entries(interp: &Interpreter, this: Value, _: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "entries")?;
    let pairs = items
        .into_iter()
        .enumerate()
        .map(|(i, v)| Value::from(interp.new_array(vec![Value::from(i), v])))
        .collect();
    Ok(Value::from(interp.new_array(pairs)))
}

async fn join(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "join")?;
    let separator = match arg(&args, 0) {
        Value::Undefined => ",".to_string(),
        sep => interp.to_string(&sep).await?,
    };
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        if item.is_nullish() {
            parts.push(String::new());
        } else {
            parts.push(interp.to_string(item).await?);
        }
    }
    Ok(Value::from(parts.join(&separator)))
}

/// Call `callback(item, index, array)` with the optional `thisArg`.
async fn visit(
    interp: &Interpreter,
    callback: &Value,
    this_arg: &Value,
    item: &Value,
    index: usize,
    array: &Obj,
) -> JsResult<Value> {
    interp
        .call(
            callback,
            this_arg.clone(),
            vec![item.clone(), Value::from(index), Value::from(array.clone())],
        )
        .await
}

async fn for_each(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "forEach")?;
    let f = callback(interp, &args, 0)?;
    for (i, item) in items.iter().enumerate() {
        visit(interp, &f, &arg(&args, 1), item, i, &obj).await?;
    }
    Ok(Value::Undefined)
}

async fn map(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "map")?;
    let f = callback(interp, &args, 0)?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        out.push(visit(interp, &f, &arg(&args, 1), item, i, &obj).await?);
    }
    Ok(Value::from(interp.new_array(out)))
}

async fn filter(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "filter")?;
    let f = callback(interp, &args, 0)?;
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if visit(interp, &f, &arg(&args, 1), item, i, &obj).await?.truthy() {
            out.push(item.clone());
        }
    }
    Ok(Value::from(interp.new_array(out)))
}

async fn flat_map(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "flatMap")?;
    let f = callback(interp, &args, 0)?;
    let mut mapped = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        mapped.push(visit(interp, &f, &arg(&args, 1), item, i, &obj).await?);
    }
    let mut out = Vec::new();
    flatten_into(mapped, 1.0, &mut out);
    Ok(Value::from(interp.new_array(out)))
}

#[derive(Clone, Copy)]
enum Find {
    Value,
    Index,
    LastValue,
    LastIndex,
}

async fn find(interp: &Interpreter, this: Value, args: Vec<Value>, mode: Find) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "find")?;
    let f = callback(interp, &args, 0)?;
    let order: Vec<usize> = match mode {
        Find::Value | Find::Index => (0..items.len()).collect(),
        Find::LastValue | Find::LastIndex => (0..items.len()).rev().collect(),
    };
    for i in order {
        if visit(interp, &f, &arg(&args, 1), &items[i], i, &obj).await?.truthy() {
            return Ok(match mode {
                Find::Value | Find::LastValue => items[i].clone(),
                Find::Index | Find::LastIndex => Value::from(i),
            });
        }
    }
    Ok(match mode {
        Find::Value | Find::LastValue => Value::Undefined,
        Find::Index | Find::LastIndex => Value::Number(-1.0),
    })
}

async fn some(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "some")?;
    let f = callback(interp, &args, 0)?;
    for (i, item) in items.iter().enumerate() {
        if visit(interp, &f, &arg(&args, 1), item, i, &obj).await?.truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

async fn every(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "every")?;
    let f = callback(interp, &args, 0)?;
    for (i, item) in items.iter().enumerate() {
        if !visit(interp, &f, &arg(&args, 1), item, i, &obj).await?.truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

async fn reduce(interp: &Interpreter, this: Value, args: Vec<Value>, right: bool) -> JsResult<Value> {
    let (obj, items) = snapshot(interp, &this, "reduce")?;
    let f = callback(interp, &args, 0)?;
    let mut order: Vec<usize> = (0..items.len()).collect();
    if right {
        order.reverse();
    }
    let mut order = order.into_iter();
    let mut acc = if args.len() >= 2 {
        arg(&args, 1)
    } else {
        match order.next() {
            Some(i) => items[i].clone(),
            None => return Err(interp.type_error("Reduce of empty array with no initial value")),
        }
    };
    for i in order {
        acc = interp
            .call(
                &f,
                Value::Undefined,
                vec![acc, items[i].clone(), Value::from(i), Value::from(obj.clone())],
            )
            .await?;
    }
    Ok(acc)
}

/// Default sort order: string comparison by UTF-16 code units.
async fn compare(interp: &Interpreter, a: &Value, b: &Value, comparator: &Value) -> JsResult<Ordering> {
    if comparator.is_callable() {
        let n = interp
            .call(comparator, Value::Undefined, vec![a.clone(), b.clone()])
            .await?
            .to_number();
        return Ok(n.partial_cmp(&0.0).unwrap_or(Ordering::Equal));
    }
    let a = interp.to_string(a).await?;
    let b = interp.to_string(b).await?;
    Ok(a.encode_utf16().cmp(b.encode_utf16()))
}

/// Stable sort; `undefined` elements go last without being compared.
pub(crate) async fn sort_values(
    interp: &Interpreter,
    items: Vec<Value>,
    comparator: &Value,
) -> JsResult<Vec<Value>> {
    let (mut items, undefined): (Vec<Value>, Vec<Value>) =
        items.into_iter().partition(|v| !v.is_undefined());
    let n = items.len();
    let mut width = 1;
    while width < n {
        let mut merged = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if compare(interp, &items[j], &items[i], comparator).await? == Ordering::Less {
                    merged.push(items[j].clone());
                    j += 1;
                } else {
                    merged.push(items[i].clone());
                    i += 1;
                }
            }
            merged.extend_from_slice(&items[i..mid]);
            merged.extend_from_slice(&items[j..end]);
            start = end;
        }
        items = merged;
        width *= 2;
    }
    items.extend(undefined);
    Ok(items)
}

async fn sort(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let comparator = arg(&args, 0);
    if !comparator.is_undefined() && !comparator.is_callable() {
        return Err(interp.type_error(
            "The comparison function must be either a function or undefined",
        ));
    }
    let (_, items) = snapshot(interp, &this, "sort")?;
    let sorted = sort_values(interp, items, &comparator).await?;
    with_items(interp, &this, "sort", |items| *items = sorted)?;
    Ok(this)
}

async fn to_sorted(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let (_, items) = snapshot(interp, &this, "toSorted")?;
    let sorted = sort_values(interp, items, &arg(&args, 0)).await?;
    Ok(Value::from(interp.new_array(sorted)))
}
