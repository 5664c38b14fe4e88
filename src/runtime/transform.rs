//! runtime::transform
//!
//! ES module syntax to CommonJS, and the pre-execution dependency scan.
//!
//! # Design
//!
//! This is a token-level rewrite, not a module linker. Each recognized
//! `import` / `export` statement is replaced in place (keeping line
//! numbers), and the assignments to `module.exports` that exports need are
//! appended after the module body:
//!
//! | Source | Rewritten |
//! | --- | --- |
//! | `import D, { a, b as c } from 'm'` | temp `require`, `D` = its `default` or the whole module, `{ a, b: c }` from it |
//! | `import { a } from 'm'` | `const { a } = require('m');` |
//! | `import D from 'm'` | `D` = `default` of `require('m')`, or the whole module |
//! | `import * as ns from 'm'` | `const ns = require('m');` |
//! | `import 'm'` | `require('m');` |
//! | `export default expr` | bound to a temp, assigned to `module.exports` and `module.exports.default` |
//! | `export default class N` / `function N` | declaration kept, `N` assigned the same way |
//! | `export { a, b as c }` | `module.exports.a = a; module.exports.c = b;` |
//! | `export const x = ...` | declaration kept, `module.exports.x = x;` |
//! | `export function f` / `class C` | declaration kept, `module.exports.f = f;` |
//!
//! Re-exports (`export { a } from 'm'`, `export * from 'm'`) are handled
//! too. Anything else (dynamic `import()`, exotic destructuring in
//! `export const`) is left alone and reaches the parser, which rejects
//! `import` / `export` with a syntax error. Source that does not tokenize
//! is returned unchanged for the same reason.

use std::ops::Range;

use tracing::debug;

use super::resolve::is_builtin;
use crate::js::lexer::{tokenize, unescape, Token, TokenKind};

/// Rewrite ES module syntax in `source` to CommonJS.
pub fn to_commonjs(source: &str) -> String {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(err) => {
            debug!(error = %err, "source does not tokenize; skipping module transform");
            return source.to_string();
        }
    };
    if !tokens
        .iter()
        .any(|t| matches!(t.kind, TokenKind::Import | TokenKind::Export))
    {
        return source.to_string();
    }
    Rewriter::new(source, tokens).run()
}

/// Module specifiers named by `require('...')`, `from '...'` and bare
/// `import '...'`, in first-seen order, built-ins excluded.
pub fn scan_dependencies(source: &str) -> Vec<String> {
    let Ok(tokens) = tokenize(source) else {
        return Vec::new();
    };
    let kind = |i: usize| tokens.get(i).map_or(TokenKind::Eof, |t| t.kind);
    let text = |i: usize| tokens.get(i).map_or("", |t| &source[t.span.clone()]);

    let mut found: Vec<String> = Vec::new();
    for i in 0..tokens.len() {
        let literal = match kind(i) {
            TokenKind::Ident
                if text(i) == "require"
                    && !(i > 0 && matches!(kind(i - 1), TokenKind::Dot | TokenKind::QuestionDot))
                    && kind(i + 1) == TokenKind::LParen
                    && kind(i + 3) == TokenKind::RParen =>
            {
                literal_value(source, &tokens[i + 2])
            }
            TokenKind::Ident if text(i) == "from" => tokens.get(i + 1).and_then(|t| literal_value(source, t)),
            TokenKind::Import => tokens.get(i + 1).and_then(|t| literal_value(source, t)),
            _ => None,
        };
        if let Some(name) = literal {
            if !is_builtin(&name) && !found.contains(&name) {
                found.push(name);
            }
        }
    }
    found
}

/// Value of a string literal, or of a template without substitutions.
fn literal_value(source: &str, token: &Token) -> Option<String> {
    let raw = &source[token.span.clone()];
    match token.kind {
        TokenKind::String => unescape(&raw[1..raw.len() - 1]).ok(),
        TokenKind::Template if !raw.contains("${") => unescape(&raw[1..raw.len() - 1]).ok(),
        _ => None,
    }
}

const DEFAULT_TEMP: &str = "__pyx_default";

struct Rewriter<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    edits: Vec<(Range<usize>, String)>,
    /// Assignments of the default export; emitted before `named`
    default: Vec<String>,
    named: Vec<String>,
    temps: usize,
}

/// `(imported, local)` pairs of an import or export list.
type Bindings = Vec<(String, String)>;

impl<'s> Rewriter<'s> {
    fn new(source: &'s str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            edits: Vec::new(),
            default: Vec::new(),
            named: Vec::new(),
            temps: 0,
        }
    }

    fn kind(&self, i: usize) -> TokenKind {
        self.tokens.get(i).map_or(TokenKind::Eof, |t| t.kind)
    }

    fn text(&self, i: usize) -> &'s str {
        self.tokens.get(i).map_or("", |t| &self.source[t.span.clone()])
    }

    fn is_word(&self, i: usize, word: &str) -> bool {
        self.kind(i) == TokenKind::Ident && self.text(i) == word
    }

    fn start(&self, i: usize) -> usize {
        self.tokens.get(i).map_or(self.source.len(), |t| t.span.start)
    }

    fn end(&self, i: usize) -> usize {
        self.tokens.get(i).map_or(self.source.len(), |t| t.span.end)
    }

    fn temp(&mut self) -> String {
        let name = format!("__pyx_mod_{}", self.temps);
        self.temps += 1;
        name
    }

    fn run(mut self) -> String {
        let mut i = 0;
        while i < self.tokens.len() {
            let after_dot = i > 0 && matches!(self.kind(i - 1), TokenKind::Dot | TokenKind::QuestionDot);
            let next = match self.kind(i) {
                TokenKind::Import if !after_dot => self.rewrite_import(i),
                TokenKind::Export if !after_dot => self.rewrite_export(i),
                _ => None,
            };
            i = next.unwrap_or(i + 1);
        }
        self.finish()
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(self.source.len() + 64);
        let mut cursor = 0;
        for (range, text) in &self.edits {
            out.push_str(&self.source[cursor..range.start]);
            out.push_str(text);
            cursor = range.end;
        }
        out.push_str(&self.source[cursor..]);
        for line in self.default.iter().chain(&self.named) {
            out.push('\n');
            out.push_str(line);
        }
        out
    }

    /// Replace tokens `from..to` (exclusive), swallowing a trailing `;`.
    /// Returns the index to continue scanning at.
    fn replace(&mut self, from: usize, to: usize, text: String) -> usize {
        let to = if self.kind(to) == TokenKind::Semicolon { to + 1 } else { to };
        self.edits.push((self.start(from)..self.end(to - 1), text));
        to
    }

    /// Drop tokens `from..to` (exclusive) up to the start of token `to`.
    fn strip(&mut self, from: usize, to: usize) -> usize {
        self.edits.push((self.start(from)..self.start(to), String::new()));
        to
    }

    /// `from '<literal>'` at `i`: the literal's source text.
    fn from_clause(&self, i: usize) -> Option<&'s str> {
        (self.is_word(i, "from") && self.kind(i + 1) == TokenKind::String).then(|| self.text(i + 1))
    }

    /// `{ a, b as c }` starting at the `{` at `open`. Returns the bindings
    /// and the index after `}`.
    fn binding_list(&self, open: usize) -> Option<(Bindings, usize)> {
        let mut bindings = Vec::new();
        let mut i = open + 1;
        loop {
            match self.kind(i) {
                TokenKind::RBrace => return Some((bindings, i + 1)),
                kind if kind == TokenKind::Ident || kind.is_keyword() => {
                    let imported = self.text(i).to_string();
                    let local = if self.is_word(i + 1, "as") {
                        i += 2;
                        let kind = self.kind(i);
                        if kind != TokenKind::Ident && !kind.is_keyword() {
                            return None;
                        }
                        self.text(i).to_string()
                    } else {
                        imported.clone()
                    };
                    bindings.push((imported, local));
                    i += 1;
                    match self.kind(i) {
                        TokenKind::Comma => i += 1,
                        TokenKind::RBrace => {}
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
    }

    fn destructure(bindings: &Bindings) -> String {
        let names: Vec<String> = bindings
            .iter()
            .map(|(imported, local)| {
                if imported == local {
                    imported.clone()
                } else {
                    format!("{imported}: {local}")
                }
            })
            .collect();
        format!("{{ {} }}", names.join(", "))
    }

    fn rewrite_import(&mut self, i: usize) -> Option<usize> {
        let j = i + 1;
        match self.kind(j) {
            // import 'm'
            TokenKind::String => {
                let text = format!("require({});", self.text(j));
                Some(self.replace(i, j + 1, text))
            }
            // import * as ns from 'm'
            TokenKind::Star if self.is_word(j + 1, "as") && self.kind(j + 2) == TokenKind::Ident => {
                let module = self.from_clause(j + 3)?;
                let text = format!("const {} = require({module});", self.text(j + 2));
                Some(self.replace(i, j + 5, text))
            }
            // import { a, b as c } from 'm'
            TokenKind::LBrace => {
                let (bindings, after) = self.binding_list(j)?;
                let module = self.from_clause(after)?;
                let text = format!("const {} = require({module});", Self::destructure(&bindings));
                Some(self.replace(i, after + 2, text))
            }
            // import D from 'm' / import D, { ... } from 'm' / import D, * as ns from 'm'
            TokenKind::Ident => {
                let default = self.text(j);
                let temp = self.temp();
                let (rest, after) = if self.kind(j + 1) == TokenKind::Comma {
                    match self.kind(j + 2) {
                        TokenKind::LBrace => {
                            let (bindings, after) = self.binding_list(j + 2)?;
                            (format!(" const {} = {temp};", Self::destructure(&bindings)), after)
                        }
                        TokenKind::Star
                            if self.is_word(j + 3, "as") && self.kind(j + 4) == TokenKind::Ident =>
                        {
                            (format!(" const {} = {temp};", self.text(j + 4)), j + 5)
                        }
                        _ => return None,
                    }
                } else {
                    (String::new(), j + 1)
                };
                let module = self.from_clause(after)?;
                let text = format!(
                    "const {temp} = require({module}); const {default} = {temp}?.default ?? {temp};{rest}"
                );
                Some(self.replace(i, after + 2, text))
            }
            _ => None,
        }
    }

    fn rewrite_export(&mut self, i: usize) -> Option<usize> {
        let j = i + 1;
        match self.kind(j) {
            TokenKind::Default => self.rewrite_export_default(i),
            // export { a, b as c } [from 'm']
            TokenKind::LBrace => {
                let (bindings, after) = self.binding_list(j)?;
                match self.from_clause(after) {
                    Some(module) => {
                        let temp = self.temp();
                        for (imported, exported) in &bindings {
                            self.named.push(format!("module.exports.{exported} = {temp}.{imported};"));
                        }
                        Some(self.replace(i, after + 2, format!("const {temp} = require({module});")))
                    }
                    None => {
                        for (local, exported) in &bindings {
                            self.named.push(format!("module.exports.{exported} = {local};"));
                        }
                        Some(self.replace(i, after, String::new()))
                    }
                }
            }
            // export * from 'm' / export * as ns from 'm'
            TokenKind::Star => {
                let temp = self.temp();
                let (line, after) = if self.is_word(j + 1, "as") && self.kind(j + 2) == TokenKind::Ident {
                    (format!("module.exports.{} = {temp};", self.text(j + 2)), j + 3)
                } else {
                    (format!("Object.assign(module.exports, {temp});"), j + 1)
                };
                let module = self.from_clause(after)?;
                self.named.push(line);
                Some(self.replace(i, after + 2, format!("const {temp} = require({module});")))
            }
            // export const x = ..., export let { a, b } = ...
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                for name in self.declared_names(j) {
                    self.named.push(format!("module.exports.{name} = {name};"));
                }
                Some(self.strip(i, j))
            }
            // export function f / export async function f / export class C
            _ => {
                let (decl, name) = self.declaration_name(j)?;
                self.named.push(format!("module.exports.{name} = {name};"));
                Some(self.strip(i, decl))
            }
        }
    }

    fn rewrite_export_default(&mut self, i: usize) -> Option<usize> {
        let k = i + 2;
        let target = match self.declaration_name(k) {
            Some((decl, name)) => {
                self.strip(i, decl);
                name
            }
            None => {
                self.edits
                    .push((self.start(i)..self.end(i + 1), format!("const {DEFAULT_TEMP} =")));
                DEFAULT_TEMP.to_string()
            }
        };
        self.default.push(format!("module.exports = {target};"));
        self.default.push(format!("module.exports.default = {target};"));
        Some(k)
    }

    /// A named `function`, `async function` or `class` declaration at `i`:
    /// its first token and the declared name.
    fn declaration_name(&self, i: usize) -> Option<(usize, String)> {
        let name_at = match self.kind(i) {
            TokenKind::Class => i + 1,
            TokenKind::Function if self.kind(i + 1) == TokenKind::Star => return None,
            TokenKind::Function => i + 1,
            TokenKind::Ident if self.text(i) == "async" && self.kind(i + 1) == TokenKind::Function => i + 2,
            _ => return None,
        };
        (self.kind(name_at) == TokenKind::Ident).then(|| (i, self.text(name_at).to_string()))
    }

    /// Names bound by the `var`/`let`/`const` declaration at `keyword`.
    fn declared_names(&self, keyword: usize) -> Vec<String> {
        let mut names = Vec::new();
        let mut i = keyword + 1;
        loop {
            match self.kind(i) {
                TokenKind::Ident => {
                    names.push(self.text(i).to_string());
                    i += 1;
                }
                TokenKind::LBrace | TokenKind::LBracket => {
                    let Some(close) = self.matching_close(i) else {
                        return names;
                    };
                    names.extend(self.pattern_names(i, close));
                    i = close + 1;
                }
                _ => return names,
            }
            // Skip the initializer up to the next declarator.
            let mut depth = 0usize;
            loop {
                let token = &self.tokens[i.min(self.tokens.len() - 1)];
                match token.kind {
                    TokenKind::Eof => return names,
                    TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => depth += 1,
                    TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                        if depth == 0 {
                            return names;
                        }
                        depth -= 1;
                    }
                    TokenKind::Semicolon if depth == 0 => return names,
                    TokenKind::Comma if depth == 0 => {
                        i += 1;
                        break;
                    }
                    kind if depth == 0 && token.newline_before && self.ends_statement(i - 1, kind) => {
                        return names
                    }
                    _ => {}
                }
                i += 1;
            }
        }
    }

    /// Whether a line break before a token of `kind` (following token
    /// `prev`) terminates the declaration by automatic semicolon insertion.
    fn ends_statement(&self, prev: usize, kind: TokenKind) -> bool {
        use TokenKind::*;
        let starts_statement = matches!(
            kind,
            Var | Let | Const | Function | Class | If | For | While | Do | Return | Throw | Try
                | Switch | Export | Import | Break | Continue
        );
        let prev_complete = matches!(
            self.kind(prev),
            Ident | Number | String | Template | RParen | RBracket | RBrace | True | False | Null | This
        );
        starts_statement || (prev_complete && matches!(kind, Ident | PlusPlus | MinusMinus))
    }

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

    /// Binding names inside a destructuring pattern spanning `open..=close`.
    fn pattern_names(&self, open: usize, close: usize) -> Vec<String> {
        (open + 1..close)
            .filter(|&i| {
                self.kind(i) == TokenKind::Ident
                    && !matches!(self.kind(i - 1), TokenKind::Assign | TokenKind::Dot)
                    && matches!(
                        self.kind(i + 1),
                        TokenKind::Comma | TokenKind::RBrace | TokenKind::RBracket | TokenKind::Assign
                    )
            })
            .map(|i| self.text(i).to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(code: &str) -> Vec<String> {
        code.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
    }

    mod imports {
        use super::*;

        #[test]
        fn named() {
            assert_eq!(
                to_commonjs("import { a, b as c } from './m';\nuse(a, c)"),
                "const { a, b: c } = require('./m');\nuse(a, c)"
            );
        }

        #[test]
        fn default_falls_back_to_module() {
            assert_eq!(
                to_commonjs("import X from \"x\""),
                "const __pyx_mod_0 = require(\"x\"); const X = __pyx_mod_0?.default ?? __pyx_mod_0;"
            );
        }

        #[test]
        fn default_and_named() {
            assert_eq!(
                to_commonjs("import D, { helper } from 'lib'"),
                "const __pyx_mod_0 = require('lib'); const D = __pyx_mod_0?.default ?? __pyx_mod_0; const { helper } = __pyx_mod_0;"
            );
        }

        #[test]
        fn namespace_and_side_effect() {
            assert_eq!(
                to_commonjs("import * as fs from 'fs'\nimport './setup.js';"),
                "const fs = require('fs');\nrequire('./setup.js');"
            );
        }

        #[test]
        fn multi_line_lists() {
            assert_eq!(
                to_commonjs("import {\n  a,\n  b,\n} from 'm'"),
                "const { a, b } = require('m');"
            );
        }

        #[test]
        fn dynamic_import_and_members_are_left_alone() {
            assert_eq!(to_commonjs("obj.import('x')"), "obj.import('x')");
        }
    }

    mod exports {
        use super::*;

        #[test]
        fn default_expression() {
            assert_eq!(
                lines(&to_commonjs("export default 42;")),
                vec![
                    "const __pyx_default = 42;",
                    "module.exports = __pyx_default;",
                    "module.exports.default = __pyx_default;",
                ]
            );
        }

        #[test]
        fn default_class_keeps_its_name() {
            assert_eq!(
                lines(&to_commonjs("export default class Widget {}")),
                vec![
                    "class Widget {}",
                    "module.exports = Widget;",
                    "module.exports.default = Widget;",
                ]
            );
        }

        #[test]
        fn declarations() {
            assert_eq!(
                lines(&to_commonjs(
                    "export const a = 1, b = f(1, 2)\nexport function go() {}\nexport async function later() {}\nexport class Box {}"
                )),
                vec![
                    "const a = 1, b = f(1, 2)",
                    "function go() {}",
                    "async function later() {}",
                    "class Box {}",
                    "module.exports.a = a;",
                    "module.exports.b = b;",
                    "module.exports.go = go;",
                    "module.exports.later = later;",
                    "module.exports.Box = Box;",
                ]
            );
        }

        #[test]
        fn destructured_declarations() {
            let out = to_commonjs("export const { x, y: z, w = 1 } = point");
            assert!(out.ends_with("module.exports.x = x;\nmodule.exports.z = z;\nmodule.exports.w = w;"));
        }

        #[test]
        fn asi_ends_the_declaration() {
            let out = to_commonjs("export let count = 0\nlater(count, 1)");
            assert_eq!(out, "let count = 0\nlater(count, 1)\nmodule.exports.count = count;");
        }

        #[test]
        fn lists_and_reexports() {
            assert_eq!(
                lines(&to_commonjs("const a = 1, b = 2\nexport { a, b as two }\nexport { x } from './x'\nexport * from './all'")),
                vec![
                    "const a = 1, b = 2",
                    "const __pyx_mod_0 = require('./x');",
                    "const __pyx_mod_1 = require('./all');",
                    "module.exports.a = a;",
                    "module.exports.two = b;",
                    "module.exports.x = __pyx_mod_0.x;",
                    "Object.assign(module.exports, __pyx_mod_1);",
                ]
            );
        }

        #[test]
        fn default_assignments_come_before_named() {
            let out = lines(&to_commonjs("export const a = 1\nexport default { b: 2 }"));
            assert_eq!(out[2], "module.exports = __pyx_default;");
            assert_eq!(out[4], "module.exports.a = a;");
        }
    }

    mod scan {
        use super::*;

        #[test]
        fn finds_requires_and_imports_in_order() {
            let source = "const x = require('./x')\nimport y from \"y-lib\"\nimport './side'\nrequire(`tpl`)\nrequire('./x')";
            assert_eq!(scan_dependencies(source), vec!["./x", "y-lib", "./side", "tpl"]);
        }

        #[test]
        fn skips_builtins_and_computed_specifiers() {
            let source = "const fs = require('fs')\nconst m = require(name)\nobj.require('z')";
            assert!(scan_dependencies(source).is_empty());
        }

        #[test]
        fn untokenizable_source() {
            assert!(scan_dependencies("const s = 'unterminated").is_empty());
            assert_eq!(to_commonjs("import x from 'y' \u{1}"), "import x from 'y' \u{1}");
        }
    }
}
