//! js::interp::stmt
//!
//! Statement execution, hoisting and destructuring.

use smol_str::SmolStr;

use super::scope::{Env, Scope};
use super::Interpreter;
use crate::js::ast::{
    CatchClause, Expr, ForHead, ForInit, Pattern, Stmt, SwitchCase, VarDeclarator, VarKind,
};
use crate::js::error::{ErrorKind, JsResult};
use crate::js::value::{LocalBoxFuture, Value};

/// How a statement finished.
#[derive(Debug, Clone)]
pub(crate) enum Completion {
    Normal,
    Return(Value),
    Break(Option<SmolStr>),
    Continue(Option<SmolStr>),
}

/// How a pattern introduces its names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Assign to existing bindings (or properties)
    Assign,
    /// Fresh mutable bindings in the given scope
    Declare,
    /// Fresh immutable bindings in the given scope
    DeclareConst,
    /// End the dead zone of hoisted `let`/`const` bindings
    Initialize,
}

fn targets_loop(target: &Option<SmolStr>, label: Option<&SmolStr>) -> bool {
    match target {
        None => true,
        Some(target) => label == Some(target),
    }
}

impl Interpreter {
    /// Run a function or module body: hoist, execute, and produce the
    /// returned value.
    pub(crate) async fn run_body(&self, body: &[Stmt], env: &Env) -> JsResult<Value> {
        let mut vars = Vec::new();
        collect_var_names(body, &mut vars);
        let var_scope = env.var_scope();
        for name in &vars {
            var_scope.declare_var(name);
        }
        self.hoist_lexical(body, env);
        match self.exec_list(body, env).await? {
            Completion::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn hoist_lexical(&self, stmts: &[Stmt], env: &Env) {
        for stmt in stmts {
            match stmt {
                Stmt::Var(kind @ (VarKind::Let | VarKind::Const), decls) => {
                    for decl in decls {
                        for name in pattern_names(&decl.target) {
                            env.declare_uninitialized(name, *kind == VarKind::Let);
                        }
                    }
                }
                Stmt::Class(def) => {
                    if let Some(name) = &def.name {
                        env.declare_uninitialized(name.clone(), true);
                    }
                }
                Stmt::Function(def) => {
                    if let Some(name) = &def.name {
                        let func = self.make_closure(def, env, None);
                        env.declare(name.clone(), Value::from(func), true);
                    }
                }
                _ => {}
            }
        }
    }

    async fn exec_list(&self, stmts: &[Stmt], env: &Env) -> JsResult<Completion> {
        for stmt in stmts {
            match self.exec_stmt(stmt, env, None).await? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    async fn exec_block(&self, stmts: &[Stmt], env: &Env) -> JsResult<Completion> {
        let scope = Scope::child(env);
        self.hoist_lexical(stmts, &scope);
        self.exec_list(stmts, &scope).await
    }

    fn exec_stmt<'a>(
        &'a self,
        stmt: &'a Stmt,
        env: &'a Env,
        label: Option<&'a SmolStr>,
    ) -> LocalBoxFuture<'a, JsResult<Completion>> {
        Box::pin(async move {
            match stmt {
                Stmt::Empty | Stmt::Function(_) => Ok(Completion::Normal),
                Stmt::Expr(expr) => {
                    self.eval_expr(expr, env).await?;
                    Ok(Completion::Normal)
                }
                Stmt::Var(kind, decls) => {
                    self.exec_var_decls(*kind, decls, env).await?;
                    Ok(Completion::Normal)
                }
                Stmt::Class(def) => {
                    let class = self.create_class(def, env).await?;
                    if let Some(name) = &def.name {
                        env.initialize(name, Value::from(class));
                    }
                    Ok(Completion::Normal)
                }
                Stmt::Block(stmts) => self.exec_block(stmts, env).await,
                Stmt::If {
                    test,
                    then,
                    otherwise,
                } => {
                    if self.eval_expr(test, env).await?.truthy() {
                        self.exec_stmt(then, env, None).await
                    } else if let Some(otherwise) = otherwise {
                        self.exec_stmt(otherwise, env, None).await
                    } else {
                        Ok(Completion::Normal)
                    }
                }
                Stmt::For {
                    init,
                    test,
                    update,
                    body,
                } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, env, label).await,
                Stmt::ForIn { head, object, body } => {
                    let object = self.eval_expr(object, env).await?;
                    let keys = enumerable_keys(&object)
                        .into_iter()
                        .map(Value::from)
                        .collect();
                    self.exec_for_each(head, keys, body, env, label).await
                }
                Stmt::ForOf {
                    head,
                    iterable,
                    body,
                } => {
                    let iterable = self.eval_expr(iterable, env).await?;
                    let items = self.iterate(&iterable).await?;
                    self.exec_for_each(head, items, body, env, label).await
                }
                Stmt::While { test, body } => {
                    while self.eval_expr(test, env).await?.truthy() {
                        match self.exec_stmt(body, env, None).await? {
                            Completion::Break(target) if targets_loop(&target, label) => break,
                            Completion::Continue(target) if targets_loop(&target, label) => {}
                            Completion::Normal => {}
                            other => return Ok(other),
                        }
                    }
                    Ok(Completion::Normal)
                }
                Stmt::DoWhile { body, test } => {
                    loop {
                        match self.exec_stmt(body, env, None).await? {
                            Completion::Break(target) if targets_loop(&target, label) => break,
                            Completion::Continue(target) if targets_loop(&target, label) => {}
                            Completion::Normal => {}
                            other => return Ok(other),
                        }
                        if !self.eval_expr(test, env).await?.truthy() {
                            break;
                        }
                    }
                    Ok(Completion::Normal)
                }
                Stmt::Switch {
                    discriminant,
                    cases,
                } => self.exec_switch(discriminant, cases, env).await,
                Stmt::Break(target) => Ok(Completion::Break(target.clone())),
                Stmt::Continue(target) => Ok(Completion::Continue(target.clone())),
                Stmt::Return(arg) => {
                    let value = match arg {
                        Some(expr) => self.eval_expr(expr, env).await?,
                        None => Value::Undefined,
                    };
                    Ok(Completion::Return(value))
                }
                Stmt::Throw(expr) => {
                    let value = self.eval_expr(expr, env).await?;
                    Err(crate::js::error::JsError::new(value))
                }
                Stmt::Try {
                    block,
                    handler,
                    finalizer,
                } => {
                    let mut result = self.exec_block(block, env).await;
                    if let Some(handler) = handler {
                        if let Err(err) = result {
                            result = self.exec_catch(handler, err.value, env).await;
                        }
                    }
                    if let Some(finalizer) = finalizer {
                        match self.exec_block(finalizer, env).await? {
                            Completion::Normal => {}
                            other => return Ok(other),
                        }
                    }
                    result
                }
                Stmt::Labeled { label, body } => match self.exec_stmt(body, env, Some(label)).await? {
                    Completion::Break(Some(target)) if &target == label => Ok(Completion::Normal),
                    other => Ok(other),
                },
            }
        })
    }

    async fn exec_catch(
        &self,
        handler: &CatchClause,
        thrown: Value,
        env: &Env,
    ) -> JsResult<Completion> {
        let scope = Scope::child(env);
        if let Some(param) = &handler.param {
            self.bind_pattern(param, thrown, &scope, Binding::Declare)
                .await?;
        }
        self.exec_block(&handler.body, &scope).await
    }

    async fn exec_var_decls(
        &self,
        kind: VarKind,
        decls: &[VarDeclarator],
        env: &Env,
    ) -> JsResult<()> {
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval_expr(init, env).await?,
                None if kind == VarKind::Var => continue,
                None => Value::Undefined,
            };
            let mode = if kind == VarKind::Var {
                Binding::Assign
            } else {
                Binding::Initialize
            };
            self.bind_pattern(&decl.target, value, env, mode).await?;
        }
        Ok(())
    }

    async fn exec_for(
        &self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: &Env,
        label: Option<&SmolStr>,
    ) -> JsResult<Completion> {
        let loop_env = Scope::child(env);
        let mut per_iteration = false;
        match init {
            Some(ForInit::Var(kind, decls)) => {
                if *kind != VarKind::Var {
                    per_iteration = true;
                    for decl in decls {
                        for name in pattern_names(&decl.target) {
                            loop_env.declare_uninitialized(name, *kind == VarKind::Let);
                        }
                    }
                }
                self.exec_var_decls(*kind, decls, &loop_env).await?;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval_expr(expr, &loop_env).await?;
            }
            None => {}
        }

        let mut iter_env = if per_iteration {
            loop_env.fork()
        } else {
            loop_env
        };
        loop {
            if let Some(test) = test {
                if !self.eval_expr(test, &iter_env).await?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &iter_env, None).await? {
                Completion::Break(target) if targets_loop(&target, label) => break,
                Completion::Continue(target) if targets_loop(&target, label) => {}
                Completion::Normal => {}
                other => return Ok(other),
            }
            if per_iteration {
                iter_env = iter_env.fork();
            }
            if let Some(update) = update {
                self.eval_expr(update, &iter_env).await?;
            }
        }
        Ok(Completion::Normal)
    }

    async fn exec_for_each(
        &self,
        head: &ForHead,
        items: Vec<Value>,
        body: &Stmt,
        env: &Env,
        label: Option<&SmolStr>,
    ) -> JsResult<Completion> {
        let mode = match head.kind {
            None | Some(VarKind::Var) => Binding::Assign,
            Some(VarKind::Let) => Binding::Declare,
            Some(VarKind::Const) => Binding::DeclareConst,
        };
        for item in items {
            let iter_env = Scope::child(env);
            self.bind_pattern(&head.target, item, &iter_env, mode).await?;
            match self.exec_stmt(body, &iter_env, None).await? {
                Completion::Break(target) if targets_loop(&target, label) => break,
                Completion::Continue(target) if targets_loop(&target, label) => {}
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    async fn exec_switch(
        &self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        env: &Env,
    ) -> JsResult<Completion> {
        let value = self.eval_expr(discriminant, env).await?;
        let scope = Scope::child(env);
        for case in cases {
            self.hoist_lexical(&case.body, &scope);
        }
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if value.strict_equals(&self.eval_expr(test, &scope).await?) {
                    start = Some(i);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|c| c.test.is_none())) else {
            return Ok(Completion::Normal);
        };
        for case in &cases[start..] {
            for stmt in &case.body {
                match self.exec_stmt(stmt, &scope, None).await? {
                    Completion::Normal => {}
                    Completion::Break(None) => return Ok(Completion::Normal),
                    other => return Ok(other),
                }
            }
        }
        Ok(Completion::Normal)
    }

    /// Bind `value` to `pattern`, destructuring as needed.
    pub(crate) fn bind_pattern<'a>(
        &'a self,
        pattern: &'a Pattern,
        value: Value,
        env: &'a Env,
        mode: Binding,
    ) -> LocalBoxFuture<'a, JsResult<()>> {
        Box::pin(async move {
            match pattern {
                Pattern::Ident(name) => {
                    match mode {
                        Binding::Assign => self.assign_binding(name, value, env)?,
                        Binding::Declare => env.declare(name.clone(), value, true),
                        Binding::DeclareConst => env.declare(name.clone(), value, false),
                        Binding::Initialize => env.initialize(name, value),
                    }
                    Ok(())
                }
                Pattern::Expr(expr) => match &**expr {
                    Expr::Member { object, prop, .. } => {
                        let target = self.eval_expr(object, env).await?;
                        let key = self.member_key(prop, env).await?;
                        self.set(&target, &key, value).await
                    }
                    _ => Err(self.error(
                        ErrorKind::SyntaxError,
                        "Invalid destructuring assignment target",
                    )),
                },
                Pattern::Object { props, rest } => {
                    if value.is_nullish() {
                        let shown = value.to_display_string();
                        return Err(self.type_error(format!(
                            "Cannot destructure '{shown}' as it is {shown}."
                        )));
                    }
                    let mut used = Vec::with_capacity(props.len());
                    for prop in props {
                        let key = self.prop_key(&prop.key, env).await?;
                        let mut item = self.get(&value, &key).await?;
                        if item.is_undefined() {
                            if let Some(default) = &prop.default {
                                item = self.eval_expr(default, env).await?;
                            }
                        }
                        self.bind_pattern(&prop.value, item, env, mode).await?;
                        used.push(key);
                    }
                    if let Some(rest) = rest {
                        let remaining = self.new_object();
                        if let Value::Object(source) = &value {
                            for (key, item) in self.entries(source).await? {
                                if !used.contains(&key) {
                                    remaining.set_own(key, item);
                                }
                            }
                        }
                        self.bind_pattern(rest, Value::from(remaining), env, mode)
                            .await?;
                    }
                    Ok(())
                }
                Pattern::Array { elems, rest } => {
                    let mut items = self.iterate(&value).await?.into_iter();
                    for elem in elems {
                        let item = items.next().unwrap_or_default();
                        let Some(elem) = elem else {
                            continue;
                        };
                        let item = match (&elem.default, item.is_undefined()) {
                            (Some(default), true) => self.eval_expr(default, env).await?,
                            _ => item,
                        };
                        self.bind_pattern(&elem.pattern, item, env, mode).await?;
                    }
                    if let Some(rest) = rest {
                        let remaining = self.new_array(items.collect());
                        self.bind_pattern(rest, Value::from(remaining), env, mode)
                            .await?;
                    }
                    Ok(())
                }
            }
        })
    }
}

/// Keys visited by `for...in`.
fn enumerable_keys(value: &Value) -> Vec<SmolStr> {
    match value {
        Value::String(s) => (0..s.chars().count())
            .map(|i| SmolStr::new(i.to_string()))
            .collect(),
        Value::Object(obj) => {
            let mut keys = obj.own_keys();
            let mut current = obj.proto();
            while let Some(proto) = current {
                for key in proto.own_keys() {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                current = proto.proto();
            }
            keys
        }
        _ => Vec::new(),
    }
}

/// Names bound by a pattern.
pub(crate) fn pattern_names(pattern: &Pattern) -> Vec<SmolStr> {
    let mut names = Vec::new();
    collect_pattern_names(pattern, &mut names);
    names
}

fn collect_pattern_names(pattern: &Pattern, out: &mut Vec<SmolStr>) {
    match pattern {
        Pattern::Ident(name) => out.push(name.clone()),
        Pattern::Object { props, rest } => {
            for prop in props {
                collect_pattern_names(&prop.value, out);
            }
            if let Some(rest) = rest {
                collect_pattern_names(rest, out);
            }
        }
        Pattern::Array { elems, rest } => {
            for elem in elems.iter().flatten() {
                collect_pattern_names(&elem.pattern, out);
            }
            if let Some(rest) = rest {
                collect_pattern_names(rest, out);
            }
        }
        Pattern::Expr(_) => {}
    }
}

/// `var` names declared anywhere in a body, not crossing function
/// boundaries.
fn collect_var_names(stmts: &[Stmt], out: &mut Vec<SmolStr>) {
    for stmt in stmts {
        collect_stmt_vars(stmt, out);
    }
}

fn collect_stmt_vars(stmt: &Stmt, out: &mut Vec<SmolStr>) {
    match stmt {
        Stmt::Var(VarKind::Var, decls) => {
            for decl in decls {
                collect_pattern_names(&decl.target, out);
            }
        }
        Stmt::Block(body) => collect_var_names(body, out),
        Stmt::If {
            then, otherwise, ..
        } => {
            collect_stmt_vars(then, out);
            if let Some(otherwise) = otherwise {
                collect_stmt_vars(otherwise, out);
            }
        }
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Var(VarKind::Var, decls)) = init {
                for decl in decls {
                    collect_pattern_names(&decl.target, out);
                }
            }
            collect_stmt_vars(body, out);
        }
        Stmt::ForIn { head, body, .. } | Stmt::ForOf { head, body, .. } => {
            if head.kind == Some(VarKind::Var) {
                collect_pattern_names(&head.target, out);
            }
            collect_stmt_vars(body, out);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            collect_stmt_vars(body, out);
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                collect_var_names(&case.body, out);
            }
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            collect_var_names(block, out);
            if let Some(handler) = handler {
                collect_var_names(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                collect_var_names(finalizer, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::js::interp::test_support::eval_string;

    mod control_flow {
        use super::*;

        #[tokio::test]
        async fn loops_and_labels() {
            let out = eval_string(
                r#"
                const seen = []
                outer: for (let i = 0; i < 3; i++) {
                  for (let j = 0; j < 3; j++) {
                    if (j === 1) continue outer
                    if (i === 2) break outer
                    seen.push(`${i}${j}`)
                  }
                }
                let n = 0
                do { n++ } while (n < 5)
                while (true) { if (--n === 2) break }
                return seen.join() + '|' + n
                "#,
            )
            .await;
            assert_eq!(out, "00,10|2");
        }

        #[tokio::test]
        async fn let_bindings_are_per_iteration() {
            let out = eval_string(
                "const fs = []\nfor (let i = 0; i < 3; i++) fs.push(() => i)\nreturn fs.map(f => f()).join()",
            )
            .await;
            assert_eq!(out, "0,1,2");
        }

        #[tokio::test]
        async fn var_is_function_scoped_and_hoisted() {
            let out = eval_string(
                "function f() { if (true) { var x = 1 } return typeof y + x; var y }\nreturn f() + hoisted()\nfunction hoisted() { return '!' }",
            )
            .await;
            assert_eq!(out, "undefined1!");
        }

        #[tokio::test]
        async fn temporal_dead_zone() {
            let out = eval_string("{ x; let x = 1 }").await;
            assert_eq!(
                out,
                "threw ReferenceError: Cannot access 'x' before initialization"
            );
        }

        #[tokio::test]
        async fn switch_falls_through() {
            let out = eval_string(
                "function f(v) { let r = ''; switch (v) { case 1: r += 'a'; case 2: r += 'b'; break; default: r += 'd' } return r }\nreturn [f(1), f(2), f(3)].join()",
            )
            .await;
            assert_eq!(out, "ab,b,d");
        }

        #[tokio::test]
        async fn try_catch_finally() {
            let out = eval_string(
                r#"
                const log = []
                function f() {
                  try { throw new TypeError('bad') }
                  catch ({ name, message }) { log.push(name + ':' + message); return 'caught' }
                  finally { log.push('finally') }
                }
                const r = f()
                try { null.x } catch (e) { log.push(e instanceof TypeError) }
                return r + '|' + log.join()
                "#,
            )
            .await;
            assert_eq!(out, "caught|TypeError:bad,finally,true");
        }

        #[tokio::test]
        async fn for_in_and_for_of() {
            let out = eval_string(
                "const o = { a: 1, b: 2 }\nlet ks = ''\nfor (const k in o) ks += k\nlet s = 0\nfor (const [, v] of Object.entries(o)) s += v\nfor (const c of 'xy') ks += c\nreturn ks + s",
            )
            .await;
            assert_eq!(out, "abxy3");
        }
    }

    mod destructuring {
        use super::*;

        #[tokio::test]
        async fn nested_defaults_and_rest() {
            let out = eval_string(
                "const { a, b: { c = 3 } = {}, ...rest } = { a: 1, d: 4, e: 5 }\nconst [x, , y = 9, ...tail] = [1, 2, undefined, 4, 5]\nreturn [a, c, Object.keys(rest), x, y, tail].join('|')",
            )
            .await;
            assert_eq!(out, "1|3|d,e|1|9|4,5");
        }

        #[tokio::test]
        async fn destructuring_undefined_throws() {
            let out = eval_string("const { a } = undefined").await;
            assert_eq!(
                out,
                "threw TypeError: Cannot destructure 'undefined' as it is undefined."
            );
        }

        #[tokio::test]
        async fn swap_via_assignment_pattern() {
            let out = eval_string("let a = 1, b = 2\n;[a, b] = [b, a]\nreturn a * 10 + b").await;
            assert_eq!(out, "21");
        }
    }
}
