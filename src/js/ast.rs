//! js::ast
//!
//! Syntax tree produced by the parser and walked by the interpreter.

use std::rc::Rc;

use smol_str::SmolStr;

/// A parsed script or module body.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub struct VarDeclarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Var(VarKind, Vec<VarDeclarator>),
    Expr(Expr),
}

/// Left side of `for...in` / `for...of`.
#[derive(Debug, Clone)]
pub struct ForHead {
    /// `None` when the loop assigns to an existing target
    pub kind: Option<VarKind>,
    pub target: Pattern,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Var(VarKind, Vec<VarDeclarator>),
    Function(Rc<FunctionDef>),
    Class(Rc<ClassDef>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        head: ForHead,
        object: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        head: ForHead,
        iterable: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Break(Option<SmolStr>),
    Continue(Option<SmolStr>),
    Return(Option<Expr>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Labeled {
        label: SmolStr,
        body: Box<Stmt>,
    },
    Empty,
}

/// Binding or assignment target.
#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(SmolStr),
    Object {
        props: Vec<PatternProp>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elems: Vec<Option<PatternElem>>,
        rest: Option<Box<Pattern>>,
    },
    /// Member expression target (assignment patterns only)
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct PatternProp {
    pub key: PropKey,
    pub value: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct PatternElem {
    pub pattern: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub pattern: Pattern,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Concise arrow body
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<SmolStr>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_arrow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
}

#[derive(Debug, Clone)]
pub enum ClassMemberKind {
    Method(MethodKind, Rc<FunctionDef>),
    Field(Option<Expr>),
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub key: PropKey,
    pub is_static: bool,
    pub kind: ClassMemberKind,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: Option<SmolStr>,
    pub superclass: Option<Expr>,
    pub constructor: Option<Rc<FunctionDef>>,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone)]
pub enum PropKey {
    Static(SmolStr),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ObjectProp {
    KeyValue(PropKey, Expr),
    Shorthand(SmolStr),
    Method(PropKey, MethodKind, Rc<FunctionDef>),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum ArrayElem {
    Expr(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone)]
pub enum Arg {
    Expr(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum MemberProp {
    Static(SmolStr),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// `=` or a compound assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Binary(BinaryOp),
    Logical(LogicalOp),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    String(SmolStr),
    Template {
        quasis: Vec<SmolStr>,
        exprs: Vec<Expr>,
    },
    Bool(bool),
    Null,
    Ident(SmolStr),
    This,
    Array(Vec<ArrayElem>),
    Object(Vec<ObjectProp>),
    Function(Rc<FunctionDef>),
    Class(Rc<ClassDef>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        prop: MemberProp,
        optional: bool,
    },
    SuperMember(MemberProp),
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        optional: bool,
    },
    SuperCall(Vec<Arg>),
    New {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Sequence(Vec<Expr>),
    Await(Box<Expr>),
    /// Parenthesized expression; ends an optional chain
    Paren(Box<Expr>),
}
