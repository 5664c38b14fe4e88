//! js::interp::scope
//!
//! Lexical environments.
//!
//! A [`Scope`] holds the bindings of one block or function body and links to
//! its parent. Function scopes also carry a [`Frame`] describing `this` and
//! the `super` home object; arrow functions get a plain scope so both resolve
//! lexically.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::js::value::{Obj, Value};

/// Shared handle to a scope.
pub type Env = Rc<Scope>;

#[derive(Clone)]
struct Binding {
    value: Value,
    mutable: bool,
    initialized: bool,
}

/// Activation data of a non-arrow function.
#[derive(Default)]
pub struct Frame {
    /// `None` until `super()` returns in a derived constructor
    pub this: RefCell<Option<Value>>,
    /// Class whose constructor is running
    pub class: Option<Obj>,
    /// Object whose prototype `super.x` reads from
    pub home: Option<Obj>,
    /// Prototype for the instance built by `super()`
    pub new_proto: Option<Obj>,
}

impl Frame {
    pub fn with_this(this: Value) -> Self {
        Self {
            this: RefCell::new(Some(this)),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    NotDefined,
    Uninitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Constant,
    Uninitialized,
}

pub struct Scope {
    vars: RefCell<HashMap<SmolStr, Binding>>,
    parent: Option<Env>,
    frame: Option<Frame>,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(Self {
            vars: RefCell::default(),
            parent: None,
            frame: None,
        })
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(Self {
            vars: RefCell::default(),
            parent: Some(parent.clone()),
            frame: None,
        })
    }

    pub fn function(parent: &Env, frame: Frame) -> Env {
        Rc::new(Self {
            vars: RefCell::default(),
            parent: Some(parent.clone()),
            frame: Some(frame),
        })
    }

    pub fn declare(&self, name: impl Into<SmolStr>, value: Value, mutable: bool) {
        self.vars.borrow_mut().insert(
            name.into(),
            Binding {
                value,
                mutable,
                initialized: true,
            },
        );
    }

    /// Declare a `let`/`const`/`class` binding in its temporal dead zone.
    pub fn declare_uninitialized(&self, name: impl Into<SmolStr>, mutable: bool) {
        self.vars.borrow_mut().insert(
            name.into(),
            Binding {
                value: Value::Undefined,
                mutable,
                initialized: false,
            },
        );
    }

    /// Declare `var` bindings that do not exist yet.
    pub fn declare_var(&self, name: &str) {
        let mut vars = self.vars.borrow_mut();
        if !vars.contains_key(name) {
            vars.insert(
                SmolStr::new(name),
                Binding {
                    value: Value::Undefined,
                    mutable: true,
                    initialized: true,
                },
            );
        }
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    /// End the dead zone of the nearest binding called `name`.
    pub fn initialize(&self, name: &str, value: Value) {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.vars.borrow_mut().get_mut(name) {
                binding.value = value;
                binding.initialized = true;
                return;
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        self.declare(name, value, true);
    }

    pub fn get(&self, name: &str) -> Result<Value, LookupError> {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.vars.borrow().get(name) {
                return if binding.initialized {
                    Ok(binding.value.clone())
                } else {
                    Err(LookupError::Uninitialized)
                };
            }
            scope = scope.parent.as_deref().ok_or(LookupError::NotDefined)?;
        }
    }

    pub fn has(&self, name: &str) -> bool {
        !matches!(self.get(name), Err(LookupError::NotDefined))
    }

    /// Assign to the nearest binding. Undeclared names become globals.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), AssignError> {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.vars.borrow_mut().get_mut(name) {
                if !binding.initialized {
                    return Err(AssignError::Uninitialized);
                }
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                binding.value = value;
                return Ok(());
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => {
                    scope.declare(name, value, true);
                    return Ok(());
                }
            }
        }
    }

    /// The nearest function frame.
    pub fn frame(&self) -> Option<&Frame> {
        let mut scope = self;
        loop {
            if let Some(frame) = &scope.frame {
                return Some(frame);
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// The scope that receives `var` declarations.
    pub fn var_scope(&self) -> &Scope {
        let mut scope = self;
        while scope.frame.is_none() {
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        scope
    }

    /// A sibling scope holding copies of this scope's own bindings; used to
    /// give each `for` iteration fresh `let` bindings.
    pub fn fork(&self) -> Env {
        Rc::new(Self {
            vars: RefCell::new(self.vars.borrow().clone()),
            parent: self.parent.clone(),
            frame: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents() {
        let root = Scope::root();
        root.declare("a", Value::from(1.0), true);
        let child = Scope::child(&root);
        assert_eq!(child.get("a").unwrap().to_number(), 1.0);
        assert_eq!(child.get("b").unwrap_err(), LookupError::NotDefined);
    }

    #[test]
    fn dead_zone_and_constants() {
        let root = Scope::root();
        root.declare_uninitialized("x", false);
        assert_eq!(root.get("x").unwrap_err(), LookupError::Uninitialized);
        root.initialize("x", Value::from(2.0));
        assert_eq!(
            root.assign("x", Value::from(3.0)).unwrap_err(),
            AssignError::Constant
        );
    }

    #[test]
    fn undeclared_assignment_defines_global() {
        let root = Scope::root();
        let inner = Scope::child(&Scope::child(&root));
        inner.assign("leak", Value::from(true)).unwrap();
        assert!(root.has_own("leak"));
    }

    #[test]
    fn fork_copies_bindings() {
        let root = Scope::root();
        let loop_scope = Scope::child(&root);
        loop_scope.declare("i", Value::from(0.0), true);
        let next = loop_scope.fork();
        next.assign("i", Value::from(1.0)).unwrap();
        assert_eq!(loop_scope.get("i").unwrap().to_number(), 0.0);
        assert_eq!(next.get("i").unwrap().to_number(), 1.0);
    }

    #[test]
    fn var_scope_stops_at_frame() {
        let root = Scope::root();
        let func = Scope::function(&root, Frame::with_this(Value::Undefined));
        let block = Scope::child(&func);
        block.var_scope().declare_var("v");
        assert!(func.has_own("v"));
        assert!(func.frame().is_some());
    }
}
