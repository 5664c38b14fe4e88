//! js::interp::call
//!
//! Function invocation, `new`, and class creation.

use std::rc::Rc;

use smol_str::SmolStr;

use super::scope::{Env, Frame, Scope};
use super::{describe, Interpreter};
use crate::js::ast::{ClassDef, ClassMemberKind, FunctionBody, FunctionDef, MethodKind, PropKey};
use crate::js::error::{JsError, JsResult};
use crate::js::value::{
    ClassCtor, Closure, FieldInit, Function, LocalBoxFuture, Obj, ObjectKind, Value,
};

/// What a callable object does when invoked.
enum Callee {
    Native(crate::js::value::NativeFn),
    Closure(Rc<FunctionDef>, Env, Option<Obj>),
    Class(Rc<ClassCtor>),
}

fn callee_of(obj: &Obj) -> Option<Callee> {
    match &obj.borrow().kind {
        ObjectKind::Function(Function::Native(native)) => Some(Callee::Native(native.call.clone())),
        ObjectKind::Function(Function::Closure(closure)) => Some(Callee::Closure(
            closure.def.clone(),
            closure.env.clone(),
            closure.home.clone(),
        )),
        ObjectKind::Function(Function::Class(class)) => Some(Callee::Class(class.clone())),
        _ => None,
    }
}

impl Interpreter {
    /// Call `func` with `this` and `args`.
    pub fn call<'a>(
        &'a self,
        func: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> LocalBoxFuture<'a, JsResult<Value>> {
        let func = func.clone();
        Box::pin(async move {
            let Some(obj) = func.as_object().cloned() else {
                return Err(self.type_error(format!("{} is not a function", describe(&func))));
            };
            let Some(callee) = callee_of(&obj) else {
                return Err(self.type_error(format!("{} is not a function", describe(&func))));
            };
            let _guard = self.enter_call()?;
            match callee {
                Callee::Native(call) => call(self, this, args).await,
                Callee::Closure(def, env, home) => {
                    let frame = Frame {
                        this: std::cell::RefCell::new(Some(this)),
                        home,
                        ..Frame::default()
                    };
                    self.invoke_closure(&def, &env, frame, args).await
                }
                Callee::Class(class) => Err(self.type_error(format!(
                    "Class constructor {} cannot be invoked without 'new'",
                    class.def.name.as_deref().unwrap_or("")
                ))),
            }
        })
    }

    /// `new func(...args)`. `new_proto` overrides the prototype of the
    /// created object, as `super()` does.
    pub fn construct<'a>(
        &'a self,
        func: &Value,
        args: Vec<Value>,
        new_proto: Option<Obj>,
    ) -> LocalBoxFuture<'a, JsResult<Value>> {
        let func = func.clone();
        Box::pin(async move {
            let not_constructor =
                || self.type_error(format!("{} is not a constructor", describe(&func)));
            let Some(obj) = func.as_object().cloned() else {
                return Err(not_constructor());
            };
            let Some(callee) = callee_of(&obj) else {
                return Err(not_constructor());
            };
            let proto = match new_proto {
                Some(proto) => proto,
                None => match self.get(&func, "prototype").await? {
                    Value::Object(proto) => proto,
                    _ => self.realm().object_proto.clone(),
                },
            };
            let _guard = self.enter_call()?;
            match callee {
                Callee::Native(call) => {
                    let this = Value::from(Obj::new(ObjectKind::Ordinary, Some(proto)));
                    let result = call(self, this.clone(), args).await?;
                    Ok(if matches!(result, Value::Object(_)) { result } else { this })
                }
                Callee::Closure(def, env, home) => {
                    if def.is_arrow || def.is_async {
                        return Err(not_constructor());
                    }
                    let this = Value::from(Obj::new(ObjectKind::Ordinary, Some(proto)));
                    let frame = Frame {
                        this: std::cell::RefCell::new(Some(this.clone())),
                        home,
                        ..Frame::default()
                    };
                    let result = self.invoke_closure(&def, &env, frame, args).await?;
                    Ok(if matches!(result, Value::Object(_)) { result } else { this })
                }
                Callee::Class(class) => self.construct_class(&obj, &class, args, proto).await,
            }
        })
    }

    async fn construct_class(
        &self,
        class_obj: &Obj,
        class: &ClassCtor,
        args: Vec<Value>,
        proto: Obj,
    ) -> JsResult<Value> {
        let frame = Frame {
            this: std::cell::RefCell::new(None),
            class: Some(class_obj.clone()),
            home: Some(class.home.clone()),
            new_proto: Some(proto.clone()),
        };
        if !class.derived {
            let this = Value::from(Obj::new(ObjectKind::Ordinary, Some(proto)));
            *frame.this.borrow_mut() = Some(this.clone());
            self.init_fields(class, &this).await?;
            let Some(ctor) = &class.constructor else {
                return Ok(this);
            };
            let result = self.invoke_closure(ctor, &class.env, frame, args).await?;
            return Ok(if matches!(result, Value::Object(_)) { result } else { this });
        }

        let Some(ctor) = &class.constructor else {
            // Implicit `constructor(...args) { super(...args) }`
            let parent = self.class_parent(class_obj)?;
            let this = self.construct(&parent, args, Some(proto)).await?;
            self.init_fields(class, &this).await?;
            return Ok(this);
        };
        let env = Scope::function(&class.env, frame);
        let result = self.invoke_in(ctor, &env, args).await?;
        if matches!(result, Value::Object(_)) {
            return Ok(result);
        }
        let this = env.frame().and_then(|f| f.this.borrow().clone());
        this.ok_or_else(|| {
            self.reference_error(
                "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
            )
        })
    }

    fn class_parent(&self, class_obj: &Obj) -> JsResult<Value> {
        match class_obj.proto() {
            Some(parent) if parent.is_callable() => Ok(Value::from(parent)),
            _ => Err(self.type_error("Super constructor is not a constructor")),
        }
    }

    /// `super(...args)` inside a derived constructor.
    pub(super) async fn super_call(&self, env: &Env, args: Vec<Value>) -> JsResult<Value> {
        let Some(frame) = env.frame() else {
            return Err(self.error(
                crate::js::error::ErrorKind::SyntaxError,
                "'super' keyword unexpected here",
            ));
        };
        let Some(class_obj) = frame.class.clone() else {
            return Err(self.error(
                crate::js::error::ErrorKind::SyntaxError,
                "'super' keyword unexpected here",
            ));
        };
        if frame.this.borrow().is_some() {
            return Err(self.reference_error("Super constructor may only be called once"));
        }
        let parent = self.class_parent(&class_obj)?;
        let this = self.construct(&parent, args, frame.new_proto.clone()).await?;
        *frame.this.borrow_mut() = Some(this.clone());
        let class = match &class_obj.borrow().kind {
            ObjectKind::Function(Function::Class(class)) => Some(class.clone()),
            _ => None,
        };
        if let Some(class) = class {
            self.init_fields(&class, &this).await?;
        }
        Ok(this)
    }

    async fn init_fields(&self, class: &ClassCtor, this: &Value) -> JsResult<()> {
        for field in &class.fields {
            let env = Scope::function(
                &class.env,
                Frame {
                    this: std::cell::RefCell::new(Some(this.clone())),
                    home: Some(class.home.clone()),
                    ..Frame::default()
                },
            );
            let value = match &field.init {
                Some(init) => self.eval_expr(init, &env).await?,
                None => Value::Undefined,
            };
            if let Value::Object(obj) = this {
                self.define_value(obj, field.key.clone(), value);
            }
        }
        Ok(())
    }

    async fn invoke_closure(
        &self,
        def: &Rc<FunctionDef>,
        env: &Env,
        frame: Frame,
        args: Vec<Value>,
    ) -> JsResult<Value> {
        let scope = if def.is_arrow {
            Scope::child(env)
        } else {
            Scope::function(env, frame)
        };
        self.invoke_in(def, &scope, args).await
    }

    /// Bind parameters in `scope` and run the body. An async function's body
    /// becomes a task and the call returns its promise as soon as the body
    /// finishes or parks.
    async fn invoke_in(
        &self,
        def: &Rc<FunctionDef>,
        scope: &Env,
        args: Vec<Value>,
    ) -> JsResult<Value> {
        if !def.is_async {
            return self.run_function(def, scope, args).await;
        }
        let interp = self.handle()?;
        let promise = self.new_promise();
        let (def, scope, target) = (def.clone(), scope.clone(), promise.clone());
        self.start_task(Box::pin(async move {
            match interp.run_function(&def, &scope, args).await {
                Ok(value) => interp.resolve_promise(&target, value),
                Err(JsError { value }) => interp.reject_promise(&target, value),
            }
        }))
        .await;
        Ok(Value::from(promise))
    }

    async fn run_function(&self, def: &FunctionDef, scope: &Env, args: Vec<Value>) -> JsResult<Value> {
        if !def.is_arrow {
            scope.declare("arguments", Value::from(self.new_array(args.clone())), true);
        }
        let mut args = args.into_iter();
        for param in &def.params {
            let value = if param.rest {
                Value::from(self.new_array(args.by_ref().collect()))
            } else {
                let mut value = args.next().unwrap_or_default();
                if value.is_undefined() {
                    if let Some(default) = &param.default {
                        value = self.eval_expr(default, scope).await?;
                    }
                }
                value
            };
            self.bind_pattern(&param.pattern, value, scope, super::stmt::Binding::Declare)
                .await?;
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr, scope).await,
            FunctionBody::Block(body) => self.run_body(body, scope).await,
        }
    }

    /// Create a function object for a script function.
    pub fn make_closure(&self, def: &Rc<FunctionDef>, env: &Env, home: Option<Obj>) -> Obj {
        let func = Obj::new(
            ObjectKind::Function(Function::Closure(Closure {
                def: def.clone(),
                env: env.clone(),
                home,
            })),
            Some(self.realm().function_proto.clone()),
        );
        func.define_hidden("name", Value::from(def.name.clone().unwrap_or_default()));
        if !def.is_arrow && !def.is_async {
            let prototype = self.new_object();
            prototype.define_hidden("constructor", Value::from(func.clone()));
            func.define_hidden("prototype", Value::from(prototype));
        }
        func
    }

    /// Evaluate a class definition to its constructor.
    pub(super) async fn create_class(&self, def: &Rc<ClassDef>, env: &Env) -> JsResult<Obj> {
        let (proto_parent, ctor_parent) = match &def.superclass {
            None => (
                Some(self.realm().object_proto.clone()),
                self.realm().function_proto.clone(),
            ),
            Some(expr) => {
                let parent = self.eval_expr(expr, env).await?;
                match &parent {
                    Value::Null => (None, self.realm().function_proto.clone()),
                    Value::Object(obj) if obj.is_callable() => {
                        let proto = match self.get(&parent, "prototype").await? {
                            Value::Object(proto) => Some(proto),
                            Value::Null => None,
                            _ => {
                                return Err(self.type_error(
                                    "Class extends value does not have valid prototype property",
                                ))
                            }
                        };
                        (proto, obj.clone())
                    }
                    other => {
                        return Err(self.type_error(format!(
                            "Class extends value {} is not a constructor or null",
                            describe(other)
                        )))
                    }
                }
            }
        };

        let class_env = Scope::child(env);
        if let Some(name) = &def.name {
            class_env.declare_uninitialized(name.clone(), false);
        }
        let prototype = Obj::new(ObjectKind::Ordinary, proto_parent);

        let mut fields = Vec::new();
        for member in &def.members {
            if let (false, ClassMemberKind::Field(init)) = (member.is_static, &member.kind) {
                fields.push(FieldInit {
                    key: self.prop_key(&member.key, &class_env).await?,
                    init: init.clone(),
                });
            }
        }

        let class = Obj::new(
            ObjectKind::Function(Function::Class(Rc::new(ClassCtor {
                def: def.clone(),
                env: class_env.clone(),
                constructor: def.constructor.clone(),
                fields,
                derived: def.superclass.is_some(),
                home: prototype.clone(),
            }))),
            Some(ctor_parent),
        );
        class.define_hidden("name", Value::from(def.name.clone().unwrap_or_default()));
        class.define_hidden("prototype", Value::from(prototype.clone()));
        prototype.define_hidden("constructor", Value::from(class.clone()));

        for member in &def.members {
            let target = if member.is_static { &class } else { &prototype };
            match &member.kind {
                ClassMemberKind::Method(kind, func) => {
                    let key = self.prop_key(&member.key, &class_env).await?;
                    let method = Value::from(self.make_closure(func, &class_env, Some(target.clone())));
                    match kind {
                        MethodKind::Method => target.define_hidden(key, method),
                        MethodKind::Getter => target.define_accessor(key, Some(method), None, false),
                        MethodKind::Setter => target.define_accessor(key, None, Some(method), false),
                    }
                }
                ClassMemberKind::Field(init) if member.is_static => {
                    let key = self.prop_key(&member.key, &class_env).await?;
                    let scope = Scope::function(
                        &class_env,
                        Frame {
                            home: Some(class.clone()),
                            ..Frame::with_this(Value::from(class.clone()))
                        },
                    );
                    let value = match init {
                        Some(init) => self.eval_expr(init, &scope).await?,
                        None => Value::Undefined,
                    };
                    self.define_value(&class, key, value);
                }
                ClassMemberKind::Field(_) => {}
            }
        }

        if let Some(name) = &def.name {
            class_env.initialize(name, Value::from(class.clone()));
        }
        Ok(class)
    }

    pub(super) async fn prop_key(&self, key: &PropKey, env: &Env) -> JsResult<SmolStr> {
        match key {
            PropKey::Static(name) => Ok(name.clone()),
            PropKey::Computed(expr) => {
                let value = self.eval_expr(expr, env).await?;
                self.to_property_key(&value).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::js::interp::test_support::eval_string;

    #[tokio::test]
    async fn closures_capture_environment() {
        let out = eval_string(
            "function counter() { let n = 0; return () => ++n }\nconst c = counter(); c(); c(); return c()",
        )
        .await;
        assert_eq!(out, "3");
    }

    #[tokio::test]
    async fn default_and_rest_parameters() {
        let out = eval_string("function f(a, b = a * 2, ...rest) { return [a, b, rest.length] }\nreturn f(1).join() + '|' + f(1, 5, 7, 8).join()").await;
        assert_eq!(out, "1,2,0|1,5,2");
    }

    #[tokio::test]
    async fn classes_with_inheritance() {
        let out = eval_string(
            r#"
            class Animal {
              legs = 4
              constructor(name) { this.name = name }
              speak() { return `${this.name} makes a sound` }
              static create(name) { return new this(name) }
            }
            class Bird extends Animal {
              legs = 2
              speak() { return super.speak() + ' (tweet)' }
            }
            const b = Bird.create('Polly')
            return [b.speak(), b.legs, b instanceof Animal].join('|')
            "#,
        )
        .await;
        assert_eq!(out, "Polly makes a sound (tweet)|2|true");
    }

    #[tokio::test]
    async fn getters_and_setters() {
        let out = eval_string(
            "class T { get double() { return this.v * 2 } set double(n) { this.v = n / 2 } }\nconst t = new T(); t.double = 10; return t.v + ':' + t.double",
        )
        .await;
        assert_eq!(out, "5:10");
    }

    #[tokio::test]
    async fn derived_constructor_must_call_super() {
        let out = eval_string("class A {}\nclass B extends A { constructor() { } }\nnew B()").await;
        assert!(out.starts_with("threw ReferenceError: Must call super constructor"));
    }

    #[tokio::test]
    async fn calling_class_without_new() {
        let out = eval_string("class A {}\nA()").await;
        assert_eq!(
            out,
            "threw TypeError: Class constructor A cannot be invoked without 'new'"
        );
    }

    #[tokio::test]
    async fn error_subclass() {
        let out = eval_string(
            "class HttpError extends Error { constructor(status) { super('status ' + status); this.status = status } }\nconst e = new HttpError(404)\nreturn [e.message, e.status, e instanceof Error].join()",
        )
        .await;
        assert_eq!(out, "status 404,404,true");
    }

    #[tokio::test]
    async fn recursion_limit() {
        let out = eval_string("function f() { return f() }\nf()").await;
        assert_eq!(out, "threw RangeError: Maximum call stack size exceeded");
    }

    #[tokio::test]
    async fn recursion_limit_is_catchable() {
        let out = eval_string(
            "function f(n) { return f(n + 1) }\ntry { f(0) } catch (e) { return e instanceof RangeError }",
        )
        .await;
        assert_eq!(out, "true");
    }

    #[tokio::test]
    async fn async_functions_return_pending_promises() {
        let out = eval_string(
            "async function f() { await null; return 1 }\nconst p = f()\nconst before = typeof p.then\nreturn before + ':' + (await p)",
        )
        .await;
        assert_eq!(out, "function:1");
    }
}
