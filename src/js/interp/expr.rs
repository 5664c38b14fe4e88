//! js::interp::expr
//!
//! Expression evaluation.
//!
//! Member access and calls are evaluated as chains so `a?.b.c()` can stop
//! at the first nullish link: [`Interpreter::eval_chain`] yields `None` once
//! a chain has short-circuited and the whole chain evaluates to `undefined`.

use smol_str::SmolStr;

use super::scope::{AssignError, Env, LookupError, Scope};
use super::stmt::Binding;
use super::Interpreter;
use crate::js::ast::{
    Arg, ArrayElem, AssignOp, Expr, LogicalOp, MemberProp, MethodKind, ObjectProp,
    Pattern, UnaryOp,
};
use crate::js::error::{ErrorKind, JsResult};
use crate::js::value::{LocalBoxFuture, Obj, Slot, Value};

/// A resolved assignment target.
enum Place {
    Binding(SmolStr),
    Property(Value, SmolStr),
}

impl Interpreter {
    pub(crate) fn eval_expr<'a>(
        &'a self,
        expr: &'a Expr,
        env: &'a Env,
    ) -> LocalBoxFuture<'a, JsResult<Value>> {
        Box::pin(async move {
            match expr {
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::String(s) => Ok(Value::String(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Template { quasis, exprs } => {
                    let mut out = String::new();
                    for (i, quasi) in quasis.iter().enumerate() {
                        out.push_str(quasi);
                        if let Some(expr) = exprs.get(i) {
                            let value = self.eval_expr(expr, env).await?;
                            out.push_str(&self.to_string(&value).await?);
                        }
                    }
                    Ok(Value::from(out))
                }
                Expr::Ident(name) => self.lookup(name, env),
                Expr::This => self.this_value(env),
                Expr::Array(elems) => {
                    let mut items = Vec::with_capacity(elems.len());
                    for elem in elems {
                        match elem {
                            ArrayElem::Expr(expr) => items.push(self.eval_expr(expr, env).await?),
                            ArrayElem::Spread(expr) => {
                                let value = self.eval_expr(expr, env).await?;
                                items.extend(self.iterate(&value).await?);
                            }
                            ArrayElem::Hole => items.push(Value::Undefined),
                        }
                    }
                    Ok(Value::from(self.new_array(items)))
                }
                Expr::Object(props) => self.eval_object(props, env).await,
                Expr::Function(def) => {
                    let func = match (&def.name, def.is_arrow) {
                        (Some(name), false) => {
                            let scope = Scope::child(env);
                            let func = self.make_closure(def, &scope, None);
                            scope.declare(name.clone(), Value::from(func.clone()), false);
                            func
                        }
                        _ => self.make_closure(def, env, None),
                    };
                    Ok(Value::from(func))
                }
                Expr::Class(def) => Ok(Value::from(self.create_class(def, env).await?)),
                Expr::Unary { op, arg } => self.eval_unary(*op, arg, env).await,
                Expr::Update {
                    increment,
                    prefix,
                    target,
                } => {
                    let place = self.place_of_expr(target, env).await?;
                    let old = self.read_place(&place, env).await?;
                    let old = self.to_number(&old).await?;
                    let new = if *increment { old + 1.0 } else { old - 1.0 };
                    self.write_place(&place, Value::Number(new), env).await?;
                    Ok(Value::Number(if *prefix { new } else { old }))
                }
                Expr::Binary { op, left, right } => {
                    let left = self.eval_expr(left, env).await?;
                    let right = self.eval_expr(right, env).await?;
                    self.binary(*op, &left, &right).await
                }
                Expr::Logical { op, left, right } => {
                    let left = self.eval_expr(left, env).await?;
                    let short_circuit = match op {
                        LogicalOp::And => !left.truthy(),
                        LogicalOp::Or => left.truthy(),
                        LogicalOp::Nullish => !left.is_nullish(),
                    };
                    if short_circuit {
                        Ok(left)
                    } else {
                        self.eval_expr(right, env).await
                    }
                }
                Expr::Assign { op, target, value } => {
                    self.eval_assign(*op, target, value, env).await
                }
                Expr::Conditional {
                    test,
                    then,
                    otherwise,
                } => {
                    if self.eval_expr(test, env).await?.truthy() {
                        self.eval_expr(then, env).await
                    } else {
                        self.eval_expr(otherwise, env).await
                    }
                }
                Expr::Member { .. } | Expr::Call { .. } => {
                    Ok(self.eval_chain(expr, env).await?.unwrap_or_default())
                }
                Expr::SuperMember(prop) => {
                    let key = self.member_key(prop, env).await?;
                    self.super_get(&key, env).await
                }
                Expr::SuperCall(args) => {
                    let args = self.eval_args(args, env).await?;
                    self.super_call(env, args).await
                }
                Expr::New { callee, args } => {
                    let func = self.eval_expr(callee, env).await?;
                    if !func.is_callable() {
                        return Err(self.type_error(format!(
                            "{} is not a constructor",
                            expr_text(callee)
                        )));
                    }
                    let args = self.eval_args(args, env).await?;
                    self.construct(&func, args, None).await
                }
                Expr::Sequence(exprs) => {
                    let mut last = Value::Undefined;
                    for expr in exprs {
                        last = self.eval_expr(expr, env).await?;
                    }
                    Ok(last)
                }
                Expr::Await(arg) => {
                    let value = self.eval_expr(arg, env).await?;
                    self.await_value(value).await
                }
                Expr::Paren(inner) => self.eval_expr(inner, env).await,
            }
        })
    }

    /// Evaluate a member/call chain. `None` means an optional link hit a
    /// nullish value.
    fn eval_chain<'a>(
        &'a self,
        expr: &'a Expr,
        env: &'a Env,
    ) -> LocalBoxFuture<'a, JsResult<Option<Value>>> {
        Box::pin(async move {
            match expr {
                Expr::Member {
                    object,
                    prop,
                    optional,
                } => {
                    let Some(target) = self.eval_link(object, env).await? else {
                        return Ok(None);
                    };
                    if *optional && target.is_nullish() {
                        return Ok(None);
                    }
                    let key = self.member_key(prop, env).await?;
                    Ok(Some(self.get(&target, &key).await?))
                }
                Expr::Call {
                    callee,
                    args,
                    optional,
                } => {
                    let (func, this) = match &**callee {
                        Expr::Member {
                            object,
                            prop,
                            optional: member_optional,
                        } => {
                            let Some(target) = self.eval_link(object, env).await? else {
                                return Ok(None);
                            };
                            if *member_optional && target.is_nullish() {
                                return Ok(None);
                            }
                            let key = self.member_key(prop, env).await?;
                            (self.get(&target, &key).await?, target)
                        }
                        Expr::SuperMember(prop) => {
                            let key = self.member_key(prop, env).await?;
                            (self.super_get(&key, env).await?, self.this_value(env)?)
                        }
                        other => {
                            let Some(func) = self.eval_link(other, env).await? else {
                                return Ok(None);
                            };
                            (func, Value::Undefined)
                        }
                    };
                    if *optional && func.is_nullish() {
                        return Ok(None);
                    }
                    if !func.is_callable() {
                        return Err(
                            self.type_error(format!("{} is not a function", expr_text(callee)))
                        );
                    }
                    let args = self.eval_args(args, env).await?;
                    Ok(Some(self.call(&func, this, args).await?))
                }
                other => Ok(Some(self.eval_expr(other, env).await?)),
            }
        })
    }

    /// Evaluate the object part of a chain link, continuing the chain.
    async fn eval_link(&self, expr: &Expr, env: &Env) -> JsResult<Option<Value>> {
        match expr {
            Expr::Member { .. } | Expr::Call { .. } => self.eval_chain(expr, env).await,
            other => Ok(Some(self.eval_expr(other, env).await?)),
        }
    }

    pub(super) async fn eval_args(&self, args: &[Arg], env: &Env) -> JsResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Expr(expr) => values.push(self.eval_expr(expr, env).await?),
                Arg::Spread(expr) => {
                    let value = self.eval_expr(expr, env).await?;
                    values.extend(self.iterate(&value).await?);
                }
            }
        }
        Ok(values)
    }

    pub(super) async fn member_key(&self, prop: &MemberProp, env: &Env) -> JsResult<SmolStr> {
        match prop {
            MemberProp::Static(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => {
                let key = self.eval_expr(expr, env).await?;
                self.to_property_key(&key).await
            }
        }
    }

    pub(super) fn lookup(&self, name: &str, env: &Env) -> JsResult<Value> {
        if name == "undefined" && !env.has(name) {
            return Ok(Value::Undefined);
        }
        env.get(name).map_err(|err| match err {
            LookupError::NotDefined => self.reference_error(format!("{name} is not defined")),
            LookupError::Uninitialized => {
                self.reference_error(format!("Cannot access '{name}' before initialization"))
            }
        })
    }

    pub(super) fn assign_binding(&self, name: &str, value: Value, env: &Env) -> JsResult<()> {
        env.assign(name, value).map_err(|err| match err {
            AssignError::Constant => self.type_error("Assignment to constant variable."),
            AssignError::Uninitialized => {
                self.reference_error(format!("Cannot access '{name}' before initialization"))
            }
        })
    }

    fn this_value(&self, env: &Env) -> JsResult<Value> {
        let Some(frame) = env.frame() else {
            return Ok(Value::Undefined);
        };
        let this = frame.this.borrow().clone();
        this.ok_or_else(|| {
            self.reference_error(
                "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
            )
        })
    }

    async fn super_get(&self, key: &str, env: &Env) -> JsResult<Value> {
        let home = env.frame().and_then(|frame| frame.home.clone());
        let Some(parent) = home.and_then(|home| home.proto()) else {
            return Ok(Value::Undefined);
        };
        let this = self.this_value(env)?;
        match parent.lookup(key) {
            Some(Slot::Data(value)) => Ok(value),
            Some(Slot::Accessor {
                get: Some(getter), ..
            }) => self.call(&getter, this, Vec::new()).await,
            _ => Ok(Value::Undefined),
        }
    }

    async fn eval_object(&self, props: &[ObjectProp], env: &Env) -> JsResult<Value> {
        let obj = self.new_object();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(key, expr) => {
                    let key = self.prop_key(key, env).await?;
                    let value = self.eval_expr(expr, env).await?;
                    self.define_value(&obj, key, value);
                }
                ObjectProp::Shorthand(name) => {
                    let value = self.lookup(name, env)?;
                    self.define_value(&obj, name.clone(), value);
                }
                ObjectProp::Method(key, kind, def) => {
                    let key = self.prop_key(key, env).await?;
                    let func = Value::from(self.make_closure(def, env, Some(obj.clone())));
                    match kind {
                        MethodKind::Method => self.define_value(&obj, key, func),
                        MethodKind::Getter => obj.define_accessor(key, Some(func), None, true),
                        MethodKind::Setter => obj.define_accessor(key, None, Some(func), true),
                    }
                }
                ObjectProp::Spread(expr) => {
                    let source = self.eval_expr(expr, env).await?;
                    self.copy_properties(&obj, &source).await?;
                }
            }
        }
        Ok(Value::from(obj))
    }

    /// Copy own enumerable properties of `source` onto `target`.
    pub(crate) async fn copy_properties(
        &self,
        target: &Obj,
        source: &Value,
    ) -> JsResult<()> {
        match source {
            Value::Object(src) => {
                for (key, value) in self.entries(src).await? {
                    target.set_own(key, value);
                }
            }
            Value::String(s) => {
                for (i, c) in s.chars().enumerate() {
                    target.set_own(SmolStr::new(i.to_string()), Value::from(c.to_string()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn eval_unary(&self, op: UnaryOp, arg: &Expr, env: &Env) -> JsResult<Value> {
        match op {
            UnaryOp::Typeof => {
                if let Expr::Ident(name) = arg {
                    if !env.has(name) {
                        return Ok(Value::from("undefined"));
                    }
                }
                let value = self.eval_expr(arg, env).await?;
                Ok(Value::from(value.type_of()))
            }
            UnaryOp::Delete => match arg {
                Expr::Member { object, prop, .. } => {
                    let target = self.eval_expr(object, env).await?;
                    let key = self.member_key(prop, env).await?;
                    match target {
                        Value::Object(obj) => Ok(Value::Bool(obj.delete(&key))),
                        Value::Undefined | Value::Null => Err(self.type_error(format!(
                            "Cannot convert undefined or null to object (deleting '{key}')"
                        ))),
                        _ => Ok(Value::Bool(true)),
                    }
                }
                _ => Ok(Value::Bool(true)),
            },
            UnaryOp::Void => {
                self.eval_expr(arg, env).await?;
                Ok(Value::Undefined)
            }
            UnaryOp::Not => Ok(Value::Bool(!self.eval_expr(arg, env).await?.truthy())),
            UnaryOp::Neg => {
                let value = self.eval_expr(arg, env).await?;
                Ok(Value::Number(-self.to_number(&value).await?))
            }
            UnaryOp::Plus => {
                let value = self.eval_expr(arg, env).await?;
                Ok(Value::Number(self.to_number(&value).await?))
            }
            UnaryOp::BitNot => {
                let value = self.eval_expr(arg, env).await?;
                let n = Value::Number(self.to_number(&value).await?).to_int32();
                Ok(Value::Number(f64::from(!n)))
            }
        }
    }

    async fn eval_assign(
        &self,
        op: AssignOp,
        target: &Pattern,
        value: &Expr,
        env: &Env,
    ) -> JsResult<Value> {
        if op == AssignOp::Assign {
            let value = self.eval_expr(value, env).await?;
            self.bind_pattern(target, value.clone(), env, Binding::Assign)
                .await?;
            return Ok(value);
        }
        let place = match target {
            Pattern::Ident(name) => Place::Binding(name.clone()),
            Pattern::Expr(expr) => self.place_of_expr(expr, env).await?,
            _ => {
                return Err(self.error(
                    ErrorKind::SyntaxError,
                    "Invalid left-hand side in assignment",
                ))
            }
        };
        let current = self.read_place(&place, env).await?;
        let result = match op {
            AssignOp::Logical(logical) => {
                let keep = match logical {
                    LogicalOp::And => !current.truthy(),
                    LogicalOp::Or => current.truthy(),
                    LogicalOp::Nullish => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.eval_expr(value, env).await?
            }
            AssignOp::Binary(binary) => {
                let right = self.eval_expr(value, env).await?;
                self.binary(binary, &current, &right).await?
            }
            AssignOp::Assign => self.eval_expr(value, env).await?,
        };
        self.write_place(&place, result.clone(), env).await?;
        Ok(result)
    }

    async fn place_of_expr(&self, expr: &Expr, env: &Env) -> JsResult<Place> {
        match expr {
            Expr::Ident(name) => Ok(Place::Binding(name.clone())),
            Expr::Member { object, prop, .. } => {
                let target = self.eval_expr(object, env).await?;
                let key = self.member_key(prop, env).await?;
                Ok(Place::Property(target, key))
            }
            _ => Err(self.error(
                ErrorKind::SyntaxError,
                "Invalid left-hand side in assignment",
            )),
        }
    }

    async fn read_place(&self, place: &Place, env: &Env) -> JsResult<Value> {
        match place {
            Place::Binding(name) => self.lookup(name, env),
            Place::Property(target, key) => self.get(target, key).await,
        }
    }

    async fn write_place(&self, place: &Place, value: Value, env: &Env) -> JsResult<()> {
        match place {
            Place::Binding(name) => self.assign_binding(name, value, env),
            Place::Property(target, key) => self.set(target, key, value).await,
        }
    }

    /// `[[Get]]` through the prototype chain of a function's `prototype`,
    /// used by `instanceof`.
    pub(super) async fn instance_of(&self, value: &Value, ctor: &Value) -> JsResult<bool> {
        if !ctor.is_callable() {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        match self.get(ctor, "prototype").await? {
            Value::Object(proto) => Ok(obj.inherits_from(&proto)),
            _ => Ok(false),
        }
    }
}

/// Source-like rendering of a callee for error messages.
pub(super) fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::This => "this".to_string(),
        Expr::Member { object, prop, .. } => match prop {
            MemberProp::Static(name) => format!("{}.{name}", expr_text(object)),
            MemberProp::Computed(_) => format!("{}[...]", expr_text(object)),
        },
        Expr::Call { callee, .. } => format!("{}(...)", expr_text(callee)),
        Expr::Paren(inner) => expr_text(inner),
        Expr::SuperMember(MemberProp::Static(name)) => format!("super.{name}"),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::js::interp::test_support::eval_string;

    #[tokio::test]
    async fn optional_chaining_short_circuits() {
        assert_eq!(
            eval_string("const o = { a: null }\nreturn String(o.a?.b.c) + String(o.missing?.())").await,
            "undefinedundefined"
        );
        assert_eq!(
            eval_string("const o = { f() { return this.v }, v: 7 }\nreturn o?.f()").await,
            "7"
        );
    }

    #[tokio::test]
    async fn calling_non_function_names_the_callee() {
        assert_eq!(
            eval_string("const o = {}\no.missing()").await,
            "threw TypeError: o.missing is not a function"
        );
    }

    #[tokio::test]
    async fn reading_from_undefined() {
        assert_eq!(
            eval_string("let u\nu.x").await,
            "threw TypeError: Cannot read properties of undefined (reading 'x')"
        );
    }

    #[tokio::test]
    async fn logical_assignment() {
        assert_eq!(
            eval_string("let a = null, b = 0, c = 1\na ??= 5; b ||= 6; c &&= 7\nreturn [a, b, c].join()").await,
            "5,6,7"
        );
    }

    #[tokio::test]
    async fn compound_assignment_on_members() {
        assert_eq!(
            eval_string("const o = { n: 1, s: 'a' }\no.n += 2; o['s'] += 'b'; o.n **= 2\nreturn o.n + o.s").await,
            "9ab"
        );
    }

    #[tokio::test]
    async fn update_expressions() {
        assert_eq!(
            eval_string("let i = 1\nconst a = i++\nconst b = ++i\nreturn [a, b, i].join()").await,
            "1,3,3"
        );
    }

    #[tokio::test]
    async fn templates_and_spread() {
        assert_eq!(
            eval_string("const xs = [1, 2]\nconst o = { ...{ a: 1 }, b: 2 }\nreturn `${[...xs, 3].join('-')} ${Object.keys(o)}`").await,
            "1-2-3 a,b"
        );
    }

    #[tokio::test]
    async fn typeof_undeclared() {
        assert_eq!(eval_string("return typeof nope").await, "undefined");
        assert_eq!(
            eval_string("nope").await,
            "threw ReferenceError: nope is not defined"
        );
    }

    #[tokio::test]
    async fn const_reassignment() {
        assert_eq!(
            eval_string("const k = 1\nk = 2").await,
            "threw TypeError: Assignment to constant variable."
        );
    }

    #[tokio::test]
    async fn named_function_expression_sees_itself() {
        assert_eq!(
            eval_string("const fact = function f(n) { return n <= 1 ? 1 : n * f(n - 1) }\nreturn fact(5)").await,
            "120"
        );
    }
}
