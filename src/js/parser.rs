//! js::parser
//!
//! Recursive-descent parser from tokens to [`ast`](super::ast).
//!
//! # Design
//!
//! The token vector is fully materialized so that arrow functions can be
//! recognized by scanning ahead to the matching `)` and checking for `=>`.
//! Binary operators use precedence climbing. Automatic semicolon insertion
//! follows the usual rule: a statement may end at `;`, at `}`, at end of
//! input, or before a token that starts a new line. `return`, `throw`,
//! `break`, `continue` and postfix `++`/`--` are restricted productions.

use std::rc::Rc;

use smol_str::SmolStr;

use super::ast::*;
use super::error::ParseError;
use super::lexer::{self, TemplatePart, Token, TokenKind};
use super::value::number_to_string;

/// Parse a whole program.
///
/// # Errors
///
/// Returns the first lexical or syntax error.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(source)?;
    let mut body = Vec::new();
    while !parser.at(TokenKind::Eof) {
        body.push(parser.parse_statement()?);
    }
    Ok(Program { body })
}

/// Parse a single expression (used for template holes).
///
/// # Errors
///
/// Returns the first lexical or syntax error, or trailing tokens.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression()?;
    if !parser.at(TokenKind::Eof) {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

type PResult<T> = Result<T, ParseError>;

/// Statements, expressions and patterns nested deeper than this are
/// rejected before the recursive descent can exhaust the stack.
pub const MAX_NESTING: usize = 1_000;

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    /// Disallow `in` as a binary operator (for-loop heads)
    no_in: bool,
    depth: usize,
    /// Whether each enclosing function is async; empty at the top level
    functions: Vec<bool>,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> PResult<Self> {
        Ok(Self {
            source,
            tokens: lexer::tokenize(source)?,
            pos: 0,
            no_in: false,
            depth: 0,
            functions: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Token helpers

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn text(&self, token: &Token) -> &'src str {
        &self.source[token.span.clone()]
    }

    fn at_word(&self, word: &str) -> bool {
        self.at(TokenKind::Ident) && self.text(self.peek()) == word
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", self.text(token))
        };
        ParseError::at(
            self.source,
            token.span.start,
            format!("{}, found {found}", message.into()),
        )
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        let message = if token.kind == TokenKind::Eof {
            "unexpected end of input".to_string()
        } else {
            format!("unexpected token '{}'", self.text(token))
        };
        ParseError::at(self.source, token.span.start, message)
    }

    fn unsupported(&self, what: &str) -> ParseError {
        ParseError::at(
            self.source,
            self.peek().span.start,
            format!("{what} are not supported"),
        )
    }

    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat(TokenKind::Semicolon) {
            return Ok(());
        }
        let token = self.peek();
        if matches!(token.kind, TokenKind::RBrace | TokenKind::Eof) || token.newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn binding_name(&mut self) -> PResult<SmolStr> {
        let token = self.expect(TokenKind::Ident, "identifier")?;
        Ok(SmolStr::new(self.text(&token)))
    }

    fn is_property_name(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Ident | TokenKind::String | TokenKind::Number | TokenKind::LBracket
        ) || kind.is_keyword()
    }

    fn property_name(&mut self) -> PResult<SmolStr> {
        let token = self.peek().clone();
        if token.kind == TokenKind::Ident || token.kind.is_keyword() {
            self.advance();
            Ok(SmolStr::new(self.text(&token)))
        } else {
            Err(self.error("expected property name"))
        }
    }

    /// Index of the token closing the bracket opened at `open`.
    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn with_in<T>(&mut self, allow: bool, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = self.no_in;
        self.no_in = !allow;
        let result = f(self);
        self.no_in = saved;
        result
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("maximum nesting depth exceeded"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Parse a function's parameters and body with `await` allowed only
    /// when it is async.
    fn in_function<T>(&mut self, is_async: bool, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.functions.push(is_async);
        let result = f(self);
        self.functions.pop();
        result
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_statement(&mut self) -> PResult<Stmt> {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        match self.peek_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let kind = self.var_kind();
                let decls = self.parse_declarators(kind)?;
                self.consume_semicolon()?;
                Ok(Stmt::Var(kind, decls))
            }
            TokenKind::Function => {
                self.advance();
                Ok(Stmt::Function(self.parse_function(false, true)?))
            }
            TokenKind::Class => Ok(Stmt::Class(self.parse_class(true)?)),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => {
                self.advance();
                let test = self.parse_paren_expression()?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            TokenKind::Do => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.expect(TokenKind::While, "'while'")?;
                let test = self.parse_paren_expression()?;
                self.eat(TokenKind::Semicolon);
                Ok(Stmt::DoWhile { body, test })
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break | TokenKind::Continue => {
                let is_break = self.advance().kind == TokenKind::Break;
                let label = if self.at(TokenKind::Ident) && !self.peek().newline_before {
                    Some(self.binding_name()?)
                } else {
                    None
                };
                self.consume_semicolon()?;
                Ok(if is_break {
                    Stmt::Break(label)
                } else {
                    Stmt::Continue(label)
                })
            }
            TokenKind::Return => {
                self.advance();
                let token = self.peek();
                let arg = if token.newline_before
                    || matches!(
                        token.kind,
                        TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                    ) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(arg))
            }
            TokenKind::Throw => {
                self.advance();
                if self.peek().newline_before {
                    return Err(self.error("expected expression after 'throw' on the same line"));
                }
                let arg = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(arg))
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::With => Err(self.unsupported("'with' statements")),
            TokenKind::Yield => Err(self.unsupported("generators")),
            TokenKind::Import | TokenKind::Export => Err(self.error(
                "import/export declarations must be rewritten before execution",
            )),
            TokenKind::Ident
                if self.at_word("async")
                    && self.peek_at(1).kind == TokenKind::Function
                    && !self.peek_at(1).newline_before =>
            {
                self.advance();
                self.advance();
                Ok(Stmt::Function(self.parse_function(true, true)?))
            }
            TokenKind::Ident if self.peek_at(1).kind == TokenKind::Colon => {
                let label = self.binding_name()?;
                self.advance();
                if !matches!(
                    self.peek_kind(),
                    TokenKind::For | TokenKind::While | TokenKind::Do
                ) {
                    return Err(self.unsupported("labels on non-loop statements"));
                }
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::Labeled { label, body })
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.error("expected '}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn var_kind(&mut self) -> VarKind {
        match self.advance().kind {
            TokenKind::Let => VarKind::Let,
            TokenKind::Const => VarKind::Const,
            _ => VarKind::Var,
        }
    }

    fn parse_declarators(&mut self, kind: VarKind) -> PResult<Vec<VarDeclarator>> {
        let mut decls = Vec::new();
        loop {
            let target = self.parse_binding_pattern()?;
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if init.is_none() && (kind == VarKind::Const || !matches!(target, Pattern::Ident(_))) {
                return Err(self.error("missing initializer in declaration"));
            }
            decls.push(VarDeclarator { target, init });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_paren_expression(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LParen, "'('")?;
        let expr = self.with_in(true, Self::parse_expression)?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(expr)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.advance();
        let test = self.parse_paren_expression()?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.advance();
        if self.at(TokenKind::Await) {
            return Err(self.unsupported("'for await' loops"));
        }
        self.expect(TokenKind::LParen, "'('")?;

        let mut init = None;
        if matches!(
            self.peek_kind(),
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            let kind = self.var_kind();
            let target = self.parse_binding_pattern()?;
            if self.at_word("of") || self.at(TokenKind::In) {
                let head = ForHead {
                    kind: Some(kind),
                    target,
                };
                return self.parse_for_in_of(head);
            }
            let first_init = if self.eat(TokenKind::Assign) {
                Some(self.with_in(false, Self::parse_assignment)?)
            } else {
                None
            };
            let mut decls = vec![VarDeclarator {
                target,
                init: first_init,
            }];
            if self.eat(TokenKind::Comma) {
                decls.extend(self.with_in(false, |p| p.parse_declarators(kind))?);
            }
            init = Some(ForInit::Var(kind, decls));
        } else if !self.at(TokenKind::Semicolon) {
            let expr = self.with_in(false, Self::parse_expression)?;
            if self.at_word("of") || self.at(TokenKind::In) {
                let head = ForHead {
                    kind: None,
                    target: self.expr_to_pattern(expr)?,
                };
                return self.parse_for_in_of(head);
            }
            init = Some(ForInit::Expr(expr));
        }

        self.expect(TokenKind::Semicolon, "';'")?;
        let test = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        let update = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_for_in_of(&mut self, head: ForHead) -> PResult<Stmt> {
        let is_of = self.advance().kind == TokenKind::Ident;
        let right = if is_of {
            self.with_in(true, Self::parse_assignment)?
        } else {
            self.with_in(true, Self::parse_expression)?
        };
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(if is_of {
            Stmt::ForOf {
                head,
                iterable: right,
                body,
            }
        } else {
            Stmt::ForIn {
                head,
                object: right,
                body,
            }
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.advance();
        let discriminant = self.parse_paren_expression()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut cases = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            let test = match self.peek_kind() {
                TokenKind::Case => {
                    self.advance();
                    Some(self.parse_expression()?)
                }
                TokenKind::Default => {
                    self.advance();
                    None
                }
                _ => return Err(self.error("expected 'case' or 'default'")),
            };
            self.expect(TokenKind::Colon, "':'")?;
            let mut body = Vec::new();
            while !matches!(
                self.peek_kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        self.advance();
        let block = self.parse_block()?;
        let handler = if self.eat(TokenKind::Catch) {
            let param = if self.eat(TokenKind::LParen) {
                let pattern = self.parse_binding_pattern()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(pattern)
            } else {
                None
            };
            Some(CatchClause {
                param,
                body: self.parse_block()?,
            })
        } else {
            None
        };
        let finalizer = if self.eat(TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("expected 'catch' or 'finally'"));
        }
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    // ------------------------------------------------------------------
    // Patterns

    fn parse_binding_pattern(&mut self) -> PResult<Pattern> {
        self.nested(Self::binding_pattern)
    }

    fn binding_pattern(&mut self) -> PResult<Pattern> {
        match self.peek_kind() {
            TokenKind::Ident => Ok(Pattern::Ident(self.binding_name()?)),
            TokenKind::LBrace => {
                self.advance();
                let mut props = Vec::new();
                let mut rest = None;
                while !self.eat(TokenKind::RBrace) {
                    if self.eat(TokenKind::Ellipsis) {
                        rest = Some(Box::new(Pattern::Ident(self.binding_name()?)));
                        self.expect(TokenKind::RBrace, "'}' after rest element")?;
                        break;
                    }
                    let shorthand = self.at(TokenKind::Ident);
                    let key = self.parse_prop_key()?;
                    let value = if self.eat(TokenKind::Colon) {
                        self.parse_binding_pattern()?
                    } else {
                        match (&key, shorthand) {
                            (PropKey::Static(name), true) => Pattern::Ident(name.clone()),
                            _ => return Err(self.error("expected ':'")),
                        }
                    };
                    let default = self.parse_default()?;
                    props.push(PatternProp {
                        key,
                        value,
                        default,
                    });
                    if !self.at(TokenKind::RBrace) {
                        self.expect(TokenKind::Comma, "','")?;
                    }
                }
                Ok(Pattern::Object { props, rest })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                let mut rest = None;
                while !self.eat(TokenKind::RBracket) {
                    if self.eat(TokenKind::Comma) {
                        elems.push(None);
                        continue;
                    }
                    if self.eat(TokenKind::Ellipsis) {
                        rest = Some(Box::new(self.parse_binding_pattern()?));
                        self.expect(TokenKind::RBracket, "']' after rest element")?;
                        break;
                    }
                    let pattern = self.parse_binding_pattern()?;
                    let default = self.parse_default()?;
                    elems.push(Some(PatternElem { pattern, default }));
                    if !self.at(TokenKind::RBracket) {
                        self.expect(TokenKind::Comma, "','")?;
                    }
                }
                Ok(Pattern::Array { elems, rest })
            }
            _ => Err(self.error("expected binding pattern")),
        }
    }

    fn parse_default(&mut self) -> PResult<Option<Expr>> {
        if self.eat(TokenKind::Assign) {
            Ok(Some(self.with_in(true, Self::parse_assignment)?))
        } else {
            Ok(None)
        }
    }

    fn parse_prop_key(&mut self) -> PResult<PropKey> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::String => {
                self.advance();
                Ok(PropKey::Static(SmolStr::new(self.string_value(&token)?)))
            }
            TokenKind::Number => {
                self.advance();
                let n = self.number_value(&token)?;
                Ok(PropKey::Static(SmolStr::new(number_to_string(n))))
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.with_in(true, Self::parse_assignment)?;
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(PropKey::Computed(Box::new(expr)))
            }
            _ => Ok(PropKey::Static(self.property_name()?)),
        }
    }

    /// Reinterpret an expression as an assignment target.
    fn expr_to_pattern(&self, expr: Expr) -> PResult<Pattern> {
        match expr {
            Expr::Ident(name) => Ok(Pattern::Ident(name)),
            Expr::Member {
                optional: false, ..
            } => Ok(Pattern::Expr(Box::new(expr))),
            Expr::Paren(inner) if matches!(*inner, Expr::Ident(_) | Expr::Member { .. }) => {
                self.expr_to_pattern(*inner)
            }
            Expr::Array(items) => {
                let mut elems = Vec::new();
                let mut rest = None;
                let count = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        ArrayElem::Hole => elems.push(None),
                        ArrayElem::Expr(e) => {
                            let (pattern, default) = self.split_default(e)?;
                            elems.push(Some(PatternElem { pattern, default }));
                        }
                        ArrayElem::Spread(e) if i + 1 == count => {
                            rest = Some(Box::new(self.expr_to_pattern(e)?));
                        }
                        ArrayElem::Spread(_) => {
                            return Err(self.error("rest element must be last"));
                        }
                    }
                }
                Ok(Pattern::Array { elems, rest })
            }
            Expr::Object(items) => {
                let mut props = Vec::new();
                let mut rest = None;
                for item in items {
                    match item {
                        ObjectProp::KeyValue(key, e) => {
                            let (value, default) = self.split_default(e)?;
                            props.push(PatternProp {
                                key,
                                value,
                                default,
                            });
                        }
                        ObjectProp::Shorthand(name) => props.push(PatternProp {
                            key: PropKey::Static(name.clone()),
                            value: Pattern::Ident(name),
                            default: None,
                        }),
                        ObjectProp::Spread(e) => rest = Some(Box::new(self.expr_to_pattern(e)?)),
                        ObjectProp::Method(..) => {
                            return Err(self.error("invalid destructuring target"))
                        }
                    }
                }
                Ok(Pattern::Object { props, rest })
            }
            _ => Err(self.error("invalid assignment target")),
        }
    }

    fn split_default(&self, expr: Expr) -> PResult<(Pattern, Option<Expr>)> {
        match expr {
            Expr::Assign {
                op: AssignOp::Assign,
                target,
                value,
            } => Ok((*target, Some(*value))),
            other => Ok((self.expr_to_pattern(other)?, None)),
        }
    }

    // ------------------------------------------------------------------
    // Functions and classes

    fn parse_function(&mut self, is_async: bool, require_name: bool) -> PResult<Rc<FunctionDef>> {
        if self.at(TokenKind::Star) {
            return Err(self.unsupported("generators"));
        }
        let name = if self.at(TokenKind::Ident) {
            Some(self.binding_name()?)
        } else if require_name {
            return Err(self.error("expected function name"));
        } else {
            None
        };
        let (params, body) = self.in_function(is_async, |p| {
            Ok((p.parse_params()?, p.parse_function_body()?))
        })?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            is_async,
            is_arrow: false,
        }))
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.eat(TokenKind::RParen) {
            if self.eat(TokenKind::Ellipsis) {
                params.push(Param {
                    pattern: self.parse_binding_pattern()?,
                    default: None,
                    rest: true,
                });
                self.expect(TokenKind::RParen, "')' after rest parameter")?;
                break;
            }
            let pattern = self.parse_binding_pattern()?;
            let default = self.parse_default()?;
            params.push(Param {
                pattern,
                default,
                rest: false,
            });
            if !self.at(TokenKind::RParen) {
                self.expect(TokenKind::Comma, "','")?;
            }
        }
        Ok(params)
    }

    fn parse_function_body(&mut self) -> PResult<Vec<Stmt>> {
        let saved = self.no_in;
        self.no_in = false;
        let body = self.parse_block();
        self.no_in = saved;
        body
    }

    fn parse_method(&mut self, name: Option<SmolStr>, is_async: bool) -> PResult<Rc<FunctionDef>> {
        let (params, body) = self.in_function(is_async, |p| {
            Ok((p.parse_params()?, p.parse_function_body()?))
        })?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            is_async,
            is_arrow: false,
        }))
    }

    fn parse_class(&mut self, require_name: bool) -> PResult<Rc<ClassDef>> {
        self.expect(TokenKind::Class, "'class'")?;
        let name = if self.at(TokenKind::Ident) {
            Some(self.binding_name()?)
        } else if require_name {
            return Err(self.error("expected class name"));
        } else {
            None
        };
        let superclass = if self.eat(TokenKind::Extends) {
            Some(self.parse_lhs()?)
        } else {
            None
        };

        self.expect(TokenKind::LBrace, "'{'")?;
        let mut constructor = None;
        let mut members = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            let is_static = self.at_word("static")
                && !matches!(
                    self.peek_at(1).kind,
                    TokenKind::LParen | TokenKind::Assign | TokenKind::Semicolon
                );
            if is_static {
                self.advance();
            }
            let (kind, is_async) = self.method_modifier();
            let key = self.parse_prop_key()?;

            if self.at(TokenKind::LParen) {
                let name = match &key {
                    PropKey::Static(name) => Some(name.clone()),
                    PropKey::Computed(_) => None,
                };
                let is_ctor = !is_static
                    && kind == MethodKind::Method
                    && name.as_deref() == Some("constructor");
                let func = self.parse_method(if is_ctor { name.clone() } else { name }, is_async)?;
                if is_ctor {
                    constructor = Some(func);
                } else {
                    members.push(ClassMember {
                        key,
                        is_static,
                        kind: ClassMemberKind::Method(kind, func),
                    });
                }
                continue;
            }

            let init = if self.eat(TokenKind::Assign) {
                Some(self.with_in(true, Self::parse_assignment)?)
            } else {
                None
            };
            self.consume_semicolon()?;
            members.push(ClassMember {
                key,
                is_static,
                kind: ClassMemberKind::Field(init),
            });
        }

        Ok(Rc::new(ClassDef {
            name,
            superclass,
            constructor,
            members,
        }))
    }

    /// Consume a `get`/`set`/`async` prefix when it modifies a following
    /// property name.
    fn method_modifier(&mut self) -> (MethodKind, bool) {
        let next = self.peek_at(1);
        let modifies = Self::is_property_name(next.kind) && !next.newline_before;
        if !modifies {
            return (MethodKind::Method, false);
        }
        if self.at_word("get") {
            self.advance();
            (MethodKind::Getter, false)
        } else if self.at_word("set") {
            self.advance();
            (MethodKind::Setter, false)
        } else if self.at_word("async") {
            self.advance();
            (MethodKind::Method, true)
        } else {
            (MethodKind::Method, false)
        }
    }

    fn arrow_ahead(&self) -> bool {
        let is_arrow_at = |i: usize| {
            self.tokens
                .get(i)
                .is_some_and(|t| t.kind == TokenKind::Arrow && !t.newline_before)
        };
        let mut i = self.pos;
        if self.at_word("async")
            && !self.peek_at(1).newline_before
            && matches!(self.peek_at(1).kind, TokenKind::Ident | TokenKind::LParen)
        {
            i += 1;
        }
        match self.tokens.get(i).map(|t| t.kind) {
            Some(TokenKind::Ident) => is_arrow_at(i + 1),
            Some(TokenKind::LParen) => self.matching_close(i).is_some_and(|j| is_arrow_at(j + 1)),
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> PResult<Expr> {
        let is_async = self.at_word("async") && self.peek_at(1).kind != TokenKind::Arrow;
        if is_async {
            self.advance();
        }
        let (params, body) = self.in_function(is_async, |p| {
            let params = if p.at(TokenKind::Ident) {
                vec![Param {
                    pattern: Pattern::Ident(p.binding_name()?),
                    default: None,
                    rest: false,
                }]
            } else {
                p.parse_params()?
            };
            p.expect(TokenKind::Arrow, "'=>'")?;
            let body = if p.at(TokenKind::LBrace) {
                FunctionBody::Block(p.parse_function_body()?)
            } else {
                FunctionBody::Expr(Box::new(p.parse_assignment()?))
            };
            Ok((params, body))
        })?;
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_async,
            is_arrow: true,
        })))
    }

    // ------------------------------------------------------------------
    // Expressions

    fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(TokenKind::Comma) {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(exprs))
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> PResult<Expr> {
        if self.arrow_ahead() {
            return self.parse_arrow();
        }
        if self.at(TokenKind::Yield) {
            return Err(self.unsupported("generators"));
        }

        let left = self.parse_conditional()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Binary(BinaryOp::Add),
            TokenKind::MinusAssign => AssignOp::Binary(BinaryOp::Sub),
            TokenKind::StarAssign => AssignOp::Binary(BinaryOp::Mul),
            TokenKind::SlashAssign => AssignOp::Binary(BinaryOp::Div),
            TokenKind::PercentAssign => AssignOp::Binary(BinaryOp::Rem),
            TokenKind::StarStarAssign => AssignOp::Binary(BinaryOp::Exp),
            TokenKind::ShlAssign => AssignOp::Binary(BinaryOp::Shl),
            TokenKind::ShrAssign => AssignOp::Binary(BinaryOp::Shr),
            TokenKind::UShrAssign => AssignOp::Binary(BinaryOp::UShr),
            TokenKind::AmpAssign => AssignOp::Binary(BinaryOp::BitAnd),
            TokenKind::PipeAssign => AssignOp::Binary(BinaryOp::BitOr),
            TokenKind::CaretAssign => AssignOp::Binary(BinaryOp::BitXor),
            TokenKind::AmpAmpAssign => AssignOp::Logical(LogicalOp::And),
            TokenKind::PipePipeAssign => AssignOp::Logical(LogicalOp::Or),
            TokenKind::QuestionQuestionAssign => AssignOp::Logical(LogicalOp::Nullish),
            _ => return Ok(left),
        };

        let target = if op == AssignOp::Assign {
            self.expr_to_pattern(left)?
        } else {
            match left {
                Expr::Ident(name) => Pattern::Ident(name),
                member @ Expr::Member { optional: false, .. } => Pattern::Expr(Box::new(member)),
                _ => return Err(self.error("invalid assignment target")),
            }
        };
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_binary(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(test);
        }
        let then = self.with_in(true, Self::parse_assignment)?;
        self.expect(TokenKind::Colon, "':'")?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary_op(&self) -> Option<(u8, BinOrLogical)> {
        use BinOrLogical::{Bin, Log};
        let op = match self.peek_kind() {
            TokenKind::QuestionQuestion => (1, Log(LogicalOp::Nullish)),
            TokenKind::PipePipe => (2, Log(LogicalOp::Or)),
            TokenKind::AmpAmp => (3, Log(LogicalOp::And)),
            TokenKind::Pipe => (4, Bin(BinaryOp::BitOr)),
            TokenKind::Caret => (5, Bin(BinaryOp::BitXor)),
            TokenKind::Amp => (6, Bin(BinaryOp::BitAnd)),
            TokenKind::EqEq => (7, Bin(BinaryOp::Eq)),
            TokenKind::NotEq => (7, Bin(BinaryOp::NotEq)),
            TokenKind::EqEqEq => (7, Bin(BinaryOp::StrictEq)),
            TokenKind::NotEqEq => (7, Bin(BinaryOp::StrictNotEq)),
            TokenKind::Lt => (8, Bin(BinaryOp::Lt)),
            TokenKind::Gt => (8, Bin(BinaryOp::Gt)),
            TokenKind::LtEq => (8, Bin(BinaryOp::LtEq)),
            TokenKind::GtEq => (8, Bin(BinaryOp::GtEq)),
            TokenKind::Instanceof => (8, Bin(BinaryOp::Instanceof)),
            TokenKind::In if !self.no_in => (8, Bin(BinaryOp::In)),
            TokenKind::Shl => (9, Bin(BinaryOp::Shl)),
            TokenKind::Shr => (9, Bin(BinaryOp::Shr)),
            TokenKind::UShr => (9, Bin(BinaryOp::UShr)),
            TokenKind::Plus => (10, Bin(BinaryOp::Add)),
            TokenKind::Minus => (10, Bin(BinaryOp::Sub)),
            TokenKind::Star => (11, Bin(BinaryOp::Mul)),
            TokenKind::Slash => (11, Bin(BinaryOp::Div)),
            TokenKind::Percent => (11, Bin(BinaryOp::Rem)),
            TokenKind::StarStar => (12, Bin(BinaryOp::Exp)),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((prec, op)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right_assoc = matches!(op, BinOrLogical::Bin(BinaryOp::Exp));
            let right = self.parse_binary(if right_assoc { prec } else { prec + 1 })?;
            left = match op {
                BinOrLogical::Bin(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                BinOrLogical::Log(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        self.nested(Self::unary)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let arg = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                arg: Box::new(arg),
            });
        }
        match self.peek_kind() {
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let increment = self.advance().kind == TokenKind::PlusPlus;
                let target = self.parse_unary()?;
                self.check_update_target(&target)?;
                Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                })
            }
            TokenKind::Await => {
                if self.functions.last() == Some(&false) {
                    return Err(self.error(
                        "await is only valid in async functions and the top level bodies of modules",
                    ));
                }
                self.advance();
                let arg = self.parse_unary()?;
                Ok(Expr::Await(Box::new(arg)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn check_update_target(&self, target: &Expr) -> PResult<()> {
        match target {
            Expr::Ident(_) | Expr::Member { optional: false, .. } => Ok(()),
            _ => Err(self.error("invalid update target")),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let expr = self.parse_lhs()?;
        let token = self.peek();
        if matches!(token.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) && !token.newline_before
        {
            self.check_update_target(&expr)?;
            let increment = self.advance().kind == TokenKind::PlusPlus;
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    /// Member access, calls and `new`.
    fn parse_lhs(&mut self) -> PResult<Expr> {
        let mut expr = if self.at(TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        prop: MemberProp::Static(name),
                        optional: false,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.with_in(true, Self::parse_expression)?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        prop: MemberProp::Computed(Box::new(index)),
                        optional: false,
                    };
                }
                TokenKind::LParen => {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: false,
                    };
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    expr = match self.peek_kind() {
                        TokenKind::LParen => Expr::Call {
                            callee: Box::new(expr),
                            args: self.parse_args()?,
                            optional: true,
                        },
                        TokenKind::LBracket => {
                            self.advance();
                            let index = self.with_in(true, Self::parse_expression)?;
                            self.expect(TokenKind::RBracket, "']'")?;
                            Expr::Member {
                                object: Box::new(expr),
                                prop: MemberProp::Computed(Box::new(index)),
                                optional: true,
                            }
                        }
                        _ => Expr::Member {
                            object: Box::new(expr),
                            prop: MemberProp::Static(self.property_name()?),
                            optional: true,
                        },
                    };
                }
                TokenKind::Template => return Err(self.unsupported("tagged templates")),
                _ => return Ok(expr),
            }
        }
    }

    fn parse_new(&mut self) -> PResult<Expr> {
        self.advance();
        if self.at(TokenKind::Dot) {
            return Err(self.unsupported("'new.target' expressions"));
        }
        let mut callee = if self.at(TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    callee = Expr::Member {
                        object: Box::new(callee),
                        prop: MemberProp::Static(self.property_name()?),
                        optional: false,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.with_in(true, Self::parse_expression)?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    callee = Expr::Member {
                        object: Box::new(callee),
                        prop: MemberProp::Computed(Box::new(index)),
                        optional: false,
                    };
                }
                _ => break,
            }
        }
        let args = if self.at(TokenKind::LParen) {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_args(&mut self) -> PResult<Vec<Arg>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.eat(TokenKind::RParen) {
            let arg = if self.eat(TokenKind::Ellipsis) {
                Arg::Spread(self.with_in(true, Self::parse_assignment)?)
            } else {
                Arg::Expr(self.with_in(true, Self::parse_assignment)?)
            };
            args.push(arg);
            if !self.at(TokenKind::RParen) {
                self.expect(TokenKind::Comma, "','")?;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                Ok(Expr::Number(self.number_value(&token)?))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::String(SmolStr::new(self.string_value(&token)?)))
            }
            TokenKind::Template => {
                self.advance();
                self.parse_template(&token)
            }
            TokenKind::Ident => {
                if self.at_word("async")
                    && self.peek_at(1).kind == TokenKind::Function
                    && !self.peek_at(1).newline_before
                {
                    self.advance();
                    self.advance();
                    return Ok(Expr::Function(self.parse_function(true, false)?));
                }
                self.advance();
                Ok(Expr::Ident(SmolStr::new(self.text(&token))))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::This)
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(token.kind == TokenKind::True))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.with_in(true, Self::parse_expression)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Paren(Box::new(expr)))
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Function => {
                self.advance();
                Ok(Expr::Function(self.parse_function(false, false)?))
            }
            TokenKind::Class => Ok(Expr::Class(self.parse_class(false)?)),
            TokenKind::Super => {
                self.advance();
                match self.peek_kind() {
                    TokenKind::LParen => Ok(Expr::SuperCall(self.parse_args()?)),
                    TokenKind::Dot => {
                        self.advance();
                        Ok(Expr::SuperMember(MemberProp::Static(self.property_name()?)))
                    }
                    TokenKind::LBracket => {
                        self.advance();
                        let index = self.with_in(true, Self::parse_expression)?;
                        self.expect(TokenKind::RBracket, "']'")?;
                        Ok(Expr::SuperMember(MemberProp::Computed(Box::new(index))))
                    }
                    _ => Err(self.error("expected '(' or '.' after 'super'")),
                }
            }
            TokenKind::Slash | TokenKind::SlashAssign => {
                Err(self.unsupported("regular expression literals"))
            }
            TokenKind::Import => Err(self.unsupported("dynamic imports")),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        self.advance();
        let mut elems = Vec::new();
        while !self.eat(TokenKind::RBracket) {
            if self.eat(TokenKind::Comma) {
                elems.push(ArrayElem::Hole);
                continue;
            }
            let elem = if self.eat(TokenKind::Ellipsis) {
                ArrayElem::Spread(self.with_in(true, Self::parse_assignment)?)
            } else {
                ArrayElem::Expr(self.with_in(true, Self::parse_assignment)?)
            };
            elems.push(elem);
            if !self.at(TokenKind::RBracket) {
                self.expect(TokenKind::Comma, "','")?;
            }
        }
        Ok(Expr::Array(elems))
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        self.advance();
        let mut props = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            if self.eat(TokenKind::Ellipsis) {
                props.push(ObjectProp::Spread(self.with_in(true, Self::parse_assignment)?));
            } else {
                let (kind, is_async) = self.method_modifier();
                let is_ident = self.at(TokenKind::Ident);
                let key = self.parse_prop_key()?;
                let name = match &key {
                    PropKey::Static(name) => Some(name.clone()),
                    PropKey::Computed(_) => None,
                };

                let prop = if kind != MethodKind::Method || is_async || self.at(TokenKind::LParen) {
                    ObjectProp::Method(key, kind, self.parse_method(name, is_async)?)
                } else if self.eat(TokenKind::Colon) {
                    ObjectProp::KeyValue(key, self.with_in(true, Self::parse_assignment)?)
                } else {
                    let Some(name) = name.filter(|_| is_ident) else {
                        return Err(self.error("expected ':'"));
                    };
                    if self.eat(TokenKind::Assign) {
                        let default = self.with_in(true, Self::parse_assignment)?;
                        ObjectProp::KeyValue(
                            PropKey::Static(name.clone()),
                            Expr::Assign {
                                op: AssignOp::Assign,
                                target: Box::new(Pattern::Ident(name)),
                                value: Box::new(default),
                            },
                        )
                    } else {
                        ObjectProp::Shorthand(name)
                    }
                };
                props.push(prop);
            }
            if !self.at(TokenKind::RBrace) {
                self.expect(TokenKind::Comma, "','")?;
            }
        }
        Ok(Expr::Object(props))
    }

    fn parse_template(&self, token: &Token) -> PResult<Expr> {
        let raw = self.text(token);
        let parts = lexer::split_template(raw)
            .map_err(|message| ParseError::at(self.source, token.span.start, message))?;
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => quasis.push(SmolStr::new(text)),
                TemplatePart::Hole(source, offset) => {
                    let expr = parse_expression(&source).map_err(|e| {
                        ParseError::at(self.source, token.span.start + offset, e.message)
                    })?;
                    exprs.push(expr);
                }
            }
        }
        Ok(Expr::Template { quasis, exprs })
    }

    fn string_value(&self, token: &Token) -> PResult<String> {
        let raw = self.text(token);
        lexer::unescape(&raw[1..raw.len() - 1])
            .map_err(|message| ParseError::at(self.source, token.span.start, message))
    }

    fn number_value(&self, token: &Token) -> PResult<f64> {
        lexer::parse_number(self.text(token))
            .ok_or_else(|| ParseError::at(self.source, token.span.start, "invalid number"))
    }
}

#[derive(Debug, Clone, Copy)]
enum BinOrLogical {
    Bin(BinaryOp),
    Log(LogicalOp),
}
