//! js::lexer
//!
//! Tokenizer for the script subset, built on `logos`.
//!
//! Line terminators are kept as tokens while lexing and then folded into
//! [`Token::newline_before`], which is all the parser needs for automatic
//! semicolon insertion. Template literals are lexed as a single token; their
//! `${...}` holes are split out later by [`split_template`].

use std::ops::Range;

use logos::Logos;

use super::error::ParseError;

fn lex_block_comment(lex: &mut logos::Lexer<TokenKind>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

fn lex_template(lex: &mut logos::Lexer<TokenKind>) -> bool {
    match scan_template(lex.remainder().as_bytes(), 0) {
        Some(end) => {
            lex.bump(end);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

/// Token kinds.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\x0B\x0C\u{00A0}\u{FEFF}]+")]
pub enum TokenKind {
    // Trivia
    #[regex(r"\r\n|\n|\r|\u{2028}|\u{2029}")]
    Newline,
    #[regex(r"//[^\r\n]*", allow_greedy = true)]
    LineComment,
    #[token("/*", lex_block_comment)]
    BlockComment,

    // Literals
    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?")]
    #[regex(r"0[xX][0-9a-fA-F_]+")]
    #[regex(r"0[oO][0-7_]+")]
    #[regex(r"0[bB][01_]+")]
    Number,
    #[regex(r#""([^"\\\r\n]|\\(.|\r?\n))*""#)]
    #[regex(r#"'([^'\\\r\n]|\\(.|\r?\n))*'"#)]
    String,
    #[token("`", lex_template)]
    Template,
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,

    // Keywords
    #[token("var")]
    Var,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("new")]
    New,
    #[token("delete")]
    Delete,
    #[token("typeof")]
    Typeof,
    #[token("instanceof")]
    Instanceof,
    #[token("in")]
    In,
    #[token("void")]
    Void,
    #[token("this")]
    This,
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("class")]
    Class,
    #[token("extends")]
    Extends,
    #[token("super")]
    Super,
    #[token("await")]
    Await,
    #[token("import")]
    Import,
    #[token("export")]
    Export,
    #[token("yield")]
    Yield,
    #[token("with")]
    With,

    // Punctuation
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("?.")]
    QuestionDot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,

    // Operators
    #[token("=")]
    Assign,
    #[token("==")]
    EqEq,
    #[token("===")]
    EqEqEq,
    #[token("!=")]
    NotEq,
    #[token("!==")]
    NotEqEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("??")]
    QuestionQuestion,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("**=")]
    StarStarAssign,
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token(">>>=")]
    UShrAssign,
    #[token("&=")]
    AmpAssign,
    #[token("|=")]
    PipeAssign,
    #[token("^=")]
    CaretAssign,
    #[token("&&=")]
    AmpAmpAssign,
    #[token("||=")]
    PipePipeAssign,
    #[token("??=")]
    QuestionQuestionAssign,

    /// Synthetic end-of-input marker appended by [`tokenize`].
    Eof,
}

impl TokenKind {
    /// Keywords that may still appear as property names (`obj.default`).
    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Var | Let
                | Const
                | Function
                | Return
                | If
                | Else
                | For
                | While
                | Do
                | Break
                | Continue
                | Switch
                | Case
                | Default
                | Throw
                | Try
                | Catch
                | Finally
                | New
                | Delete
                | Typeof
                | Instanceof
                | In
                | Void
                | This
                | Null
                | True
                | False
                | Class
                | Extends
                | Super
                | Await
                | Import
                | Export
                | Yield
                | With
        )
    }
}

/// A significant token with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
    /// A line terminator (or a multi-line comment) precedes this token
    pub newline_before: bool,
}

/// Tokenize `source`, dropping trivia. The last token is always
/// [`TokenKind::Eof`].
///
/// # Errors
///
/// Unrecognized characters and unterminated strings, templates or comments.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    let mut newline = false;

    while let Some(kind) = lexer.next() {
        let span = lexer.span();
        let kind = match kind {
            Ok(kind) => kind,
            Err(()) => {
                let found = &source[span.clone()];
                let message = match found.chars().next() {
                    Some('`') => "unterminated template literal".to_string(),
                    Some('"') | Some('\'') => "unterminated string literal".to_string(),
                    Some('/') => "unterminated comment".to_string(),
                    _ => format!("unexpected character '{found}'"),
                };
                return Err(ParseError::at(source, span.start, message));
            }
        };
        match kind {
            TokenKind::Newline => newline = true,
            TokenKind::LineComment => {}
            TokenKind::BlockComment => {
                if lexer.slice().contains('\n') {
                    newline = true;
                }
            }
            _ => {
                tokens.push(Token {
                    kind,
                    span,
                    newline_before: newline,
                });
                newline = false;
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: source.len()..source.len(),
        newline_before: true,
    });
    Ok(tokens)
}

/// Scan a template body starting at `i` (just after the opening backtick).
/// Returns the offset just past the closing backtick.
fn scan_template(bytes: &[u8], mut i: usize) -> Option<usize> {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => i = scan_hole(bytes, i + 2)?,
            _ => i += 1,
        }
    }
    None
}

/// Scan a `${ ... }` hole starting just after the `{`. Returns the offset
/// just past the matching `}`.
fn scan_hole(bytes: &[u8], mut i: usize) -> Option<usize> {
    let mut depth = 1usize;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i = scan_template(bytes, i + 1)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// One piece of a template literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Cooked literal text
    Text(String),
    /// Source of a `${...}` hole, with its byte offset in the template token
    Hole(String, usize),
}

/// Split a template token (including its backticks) into text and holes.
///
/// # Errors
///
/// Malformed escapes or unbalanced holes.
pub fn split_template(raw: &str) -> Result<Vec<TemplatePart>, String> {
    let inner = raw
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .ok_or_else(|| "unterminated template literal".to_string())?;
    let bytes = inner.as_bytes();
    let mut parts = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                parts.push(TemplatePart::Text(unescape(&inner[text_start..i])?));
                let end = scan_hole(bytes, i + 2)
                    .ok_or_else(|| "unterminated template hole".to_string())?;
                parts.push(TemplatePart::Hole(inner[i + 2..end - 1].to_string(), i + 3));
                i = end;
                text_start = end;
            }
            _ => i += 1,
        }
    }
    parts.push(TemplatePart::Text(unescape(&inner[text_start..])?));
    Ok(parts)
}

/// Decode the body of a string literal (without quotes).
///
/// # Errors
///
/// Malformed `\x`, `\u` escapes.
pub fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err("dangling escape".to_string());
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(hex_char(&hex)?);
            }
            'u' => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                    hex
                } else {
                    chars.by_ref().take(4).collect()
                };
                out.push(hex_char(&hex)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn hex_char(hex: &str) -> Result<char, String> {
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("invalid escape sequence '{hex}'"))
}

/// Numeric value of a number token.
pub fn parse_number(text: &str) -> Option<f64> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    let radix = |digits: &str, radix: u32| u64::from_str_radix(digits, radix).ok().map(|n| n as f64);
    match clean.get(..2) {
        Some("0x") | Some("0X") => radix(&clean[2..], 16),
        Some("0o") | Some("0O") => radix(&clean[2..], 8),
        Some("0b") | Some("0B") => radix(&clean[2..], 2),
        _ => clean.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("const constant = await x"),
            vec![Const, Ident, Assign, Await, Ident, Eof]
        );
    }

    #[test]
    fn longest_operator_wins() {
        use TokenKind::*;
        assert_eq!(
            kinds("a ??= b >>>= c?.d"),
            vec![Ident, QuestionQuestionAssign, Ident, UShrAssign, Ident, QuestionDot, Ident, Eof]
        );
    }

    #[test]
    fn newlines_are_folded_into_flags() {
        let tokens = tokenize("a\n// note\nb /* x\n */ c /* y */ d").unwrap();
        let flags: Vec<bool> = tokens.iter().map(|t| t.newline_before).collect();
        assert_eq!(flags, vec![false, true, true, false, true]);
    }

    #[test]
    fn template_with_nested_template_is_one_token() {
        let source = "`a ${b ? `x${1}` : '}'} c`";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Template);
        assert_eq!(tokens[0].span, 0..source.len());
    }

    #[test]
    fn split_template_parts() {
        let parts = split_template("`a\\n${x + 1}b${ {y: 2}.y }`").unwrap();
        assert_eq!(
            parts,
            vec![
                TemplatePart::Text("a\n".into()),
                TemplatePart::Hole("x + 1".into(), 6),
                TemplatePart::Text("b".into()),
                TemplatePart::Hole(" {y: 2}.y ".into(), 15),
                TemplatePart::Text(String::new()),
            ]
        );
    }

    #[test]
    fn unescapes() {
        assert_eq!(unescape(r"\x41B\u{43}\'\\").unwrap(), "ABC'\\");
        assert!(unescape(r"\xZZ").is_err());
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number("0xff"), Some(255.0));
        assert_eq!(parse_number("1_000"), Some(1000.0));
        assert_eq!(parse_number("1.5e3"), Some(1500.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("0b101"), Some(5.0));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("let s = 'abc").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }
}
