//! Lexical analysis for Veil.
//!
//! Tokenizes Veil source into a stream of [`Token`]s. Handles keywords and
//! identifiers, integer/float literals with `_` digit separators and width
//! suffixes, single-line strings, character literals vs. lifetimes, nested
//! block comments, and greedy compound operators.
//!
//! The lexer never fails: anything it cannot classify becomes a
//! [`TokenKind::Unknown`] token, which the parser rejects with the stored
//! line number.
//!
//! # Example
//!
//! ```rust
//! use veilc::{Lexer, TokenKind};
//!
//! let tokens: Vec<_> = Lexer::new("let x = 42;").map(|t| t.kind).collect();
//! assert_eq!(tokens[0], TokenKind::Let);
//! assert_eq!(tokens[1], TokenKind::Identifier);
//! assert_eq!(tokens[2], TokenKind::Equal);
//! assert_eq!(tokens[3], TokenKind::Integer);
//! assert_eq!(tokens[4], TokenKind::Semicolon);
//! assert_eq!(tokens[5], TokenKind::EndOfFile);
//! ```

use crate::span::{LineIndex, Span};
use logos::Logos;

/// Token kinds for the Veil lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    // ============================================================
    // Keywords
    // ============================================================
    #[token("fn")]
    Fn,
    #[token("let")]
    Let,
    #[token("mut")]
    Mut,
    #[token("class")]
    Class,
    #[token("struct")]
    Struct,
    #[token("enum")]
    Enum,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("do")]
    Do,
    #[token("return")]
    Return,
    #[token("import")]
    Import,
    #[token("package")]
    Package,
    #[token("use")]
    Use,
    #[token("pub")]
    Pub,
    #[token("as")]
    As,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("fallthrough")]
    Fallthrough,
    #[token("default")]
    Default,
    #[token("void")]
    Void,
    #[token("bool")]
    Bool,
    #[token("self")]
    SelfLower,
    #[token("Self")]
    SelfUpper,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nullptr")]
    Nullptr,
    #[token("extern")]
    Extern,
    #[token("unsafe")]
    Unsafe,
    #[token("malloc")]
    Malloc,
    #[token("alloca")]
    Alloca,
    #[token("free")]
    Free,
    #[token("sizeof")]
    Sizeof,
    #[token("alignof")]
    Alignof,
    #[token("offsetof")]
    Offsetof,
    #[token("align")]
    Align,
    #[token("packed")]
    Packed,

    // ============================================================
    // Primitive type keywords
    // ============================================================
    #[token("i8")]
    I8,
    #[token("i16")]
    I16,
    #[token("i32")]
    I32,
    #[token("i64")]
    I64,
    #[token("u8")]
    U8,
    #[token("u16")]
    U16,
    #[token("u32")]
    U32,
    #[token("u64")]
    U64,
    #[token("f32")]
    F32,
    #[token("f64")]
    F64,

    // ============================================================
    // Literals and identifiers
    // ============================================================
    /// Integer literal (decimal or hex) with `_` digit separators and an
    /// optional width suffix, attached (`42i32`) or separated (`42_i32`).
    /// A trailing `_` never belongs to the literal, so an invalid suffix
    /// like `42_abc` leaves `_abc` for the identifier scanner.
    #[regex(r"[0-9]+(_[0-9]+)*(_?(i8|i16|i32|i64|u8|u16|u32|u64))?")]
    #[regex(r"0[xX][0-9a-fA-F]+(_[0-9a-fA-F]+)*(_?(i8|i16|i32|i64|u8|u16|u32|u64))?")]
    Integer,

    /// Float literal. A `.` only starts a fraction when a digit follows;
    /// an exponent without digits does not match, so `1e+x` falls back to
    /// the integer `1` followed by ordinary tokens.
    #[regex(r"[0-9]+(_[0-9]+)*\.[0-9]+(_[0-9]+)*([eE][+-]?[0-9]+(_[0-9]+)*)?(_?(f32|f64))?")]
    #[regex(r"[0-9]+(_[0-9]+)*[eE][+-]?[0-9]+(_[0-9]+)*(_?(f32|f64))?")]
    Float,

    /// Single-line string literal. An unterminated or multi-line string
    /// fails to match and surfaces as [`TokenKind::Unknown`].
    #[regex(r#""([^"\\\n]|\\[^\n])*""#)]
    String,

    /// Character literal, e.g. `'a'` or `'\n'`.
    #[regex(r"'([^'\\]|\\.)'")]
    Char,

    /// Lifetime, e.g. `'a` or `'static`. `'a'` is a char literal instead
    /// because the longer match wins.
    #[regex(r"'[a-zA-Z_][a-zA-Z0-9_]*")]
    Lifetime,

    /// A bare apostrophe that is neither a char literal nor a lifetime.
    #[token("'")]
    Tick,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    /// A lone `_` is the wildcard pattern, not an identifier.
    #[token("_", priority = 10)]
    Underscore,

    // ============================================================
    // Operators
    // ============================================================
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
    #[token("?")]
    Question,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    NotEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token("!")]
    Not,
    #[token("&")]
    Ampersand,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,

    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,
    #[token("%=")]
    PercentEqual,
    #[token("&=")]
    AmpersandEqual,
    #[token("|=")]
    PipeEqual,
    #[token("^=")]
    CaretEqual,
    #[token("<<=")]
    ShiftLeftEqual,
    #[token(">>=")]
    ShiftRightEqual,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,
    #[token("::")]
    ColonColon,
    #[token("=>")]
    FatArrow,

    // ============================================================
    // Punctuation
    // ============================================================
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("...")]
    Ellipsis,

    /// Block comment with nesting, handled by a callback.
    #[token("/*", block_comment)]
    BlockComment,

    // ============================================================
    // Special
    // ============================================================
    /// End-of-file marker, appended once by the [`Lexer`] wrapper.
    EndOfFile,

    /// Anything the lexer could not classify: an unexpected character, an
    /// unterminated string, an unclosed block comment.
    Unknown,
}

/// Callback for nested block comments. Consumes until the matching `*/`,
/// tracking nesting depth; an unclosed comment surfaces as
/// [`TokenKind::Unknown`] through the error path.
fn block_comment(lexer: &mut logos::Lexer<TokenKind>) -> logos::FilterResult<(), ()> {
    let remainder = lexer.remainder();
    let mut depth = 1usize;
    let mut chars = remainder.chars().peekable();
    let mut consumed = 0usize;

    while depth > 0 {
        match chars.next() {
            Some('/') if chars.peek() == Some(&'*') => {
                chars.next();
                consumed += 2;
                depth += 1;
            }
            Some('*') if chars.peek() == Some(&'/') => {
                chars.next();
                consumed += 2;
                depth -= 1;
            }
            Some(c) => consumed += c.len_utf8(),
            None => {
                lexer.bump(consumed);
                return logos::FilterResult::Error(());
            }
        }
    }

    lexer.bump(consumed);
    logos::FilterResult::Skip
}

impl TokenKind {
    /// A human-readable description used in parser diagnostics.
    pub fn description(&self) -> &'static str {
        match self {
            TokenKind::Fn => "keyword `fn`",
            TokenKind::Let => "keyword `let`",
            TokenKind::Mut => "keyword `mut`",
            TokenKind::Class => "keyword `class`",
            TokenKind::Struct => "keyword `struct`",
            TokenKind::Enum => "keyword `enum`",
            TokenKind::If => "keyword `if`",
            TokenKind::Else => "keyword `else`",
            TokenKind::Switch => "keyword `switch`",
            TokenKind::Case => "keyword `case`",
            TokenKind::While => "keyword `while`",
            TokenKind::For => "keyword `for`",
            TokenKind::Do => "keyword `do`",
            TokenKind::Return => "keyword `return`",
            TokenKind::Import => "keyword `import`",
            TokenKind::Package => "keyword `package`",
            TokenKind::Use => "keyword `use`",
            TokenKind::Pub => "keyword `pub`",
            TokenKind::As => "keyword `as`",
            TokenKind::Break => "keyword `break`",
            TokenKind::Continue => "keyword `continue`",
            TokenKind::Fallthrough => "keyword `fallthrough`",
            TokenKind::Default => "keyword `default`",
            TokenKind::Void => "keyword `void`",
            TokenKind::Bool => "keyword `bool`",
            TokenKind::SelfLower => "keyword `self`",
            TokenKind::SelfUpper => "keyword `Self`",
            TokenKind::True => "keyword `true`",
            TokenKind::False => "keyword `false`",
            TokenKind::Nullptr => "keyword `nullptr`",
            TokenKind::Extern => "keyword `extern`",
            TokenKind::Unsafe => "keyword `unsafe`",
            TokenKind::Malloc => "keyword `malloc`",
            TokenKind::Alloca => "keyword `alloca`",
            TokenKind::Free => "keyword `free`",
            TokenKind::Sizeof => "keyword `sizeof`",
            TokenKind::Alignof => "keyword `alignof`",
            TokenKind::Offsetof => "keyword `offsetof`",
            TokenKind::Align => "keyword `align`",
            TokenKind::Packed => "keyword `packed`",
            TokenKind::I8 => "type `i8`",
            TokenKind::I16 => "type `i16`",
            TokenKind::I32 => "type `i32`",
            TokenKind::I64 => "type `i64`",
            TokenKind::U8 => "type `u8`",
            TokenKind::U16 => "type `u16`",
            TokenKind::U32 => "type `u32`",
            TokenKind::U64 => "type `u64`",
            TokenKind::F32 => "type `f32`",
            TokenKind::F64 => "type `f64`",
            TokenKind::Integer => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::String => "string literal",
            TokenKind::Char => "character literal",
            TokenKind::Lifetime => "lifetime",
            TokenKind::Tick => "`'`",
            TokenKind::Identifier => "identifier",
            TokenKind::Underscore => "`_`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Question => "`?`",
            TokenKind::Equal => "`=`",
            TokenKind::EqualEqual => "`==`",
            TokenKind::NotEqual => "`!=`",
            TokenKind::Greater => "`>`",
            TokenKind::GreaterEqual => "`>=`",
            TokenKind::Less => "`<`",
            TokenKind::LessEqual => "`<=`",
            TokenKind::Not => "`!`",
            TokenKind::Ampersand => "`&`",
            TokenKind::Pipe => "`|`",
            TokenKind::Caret => "`^`",
            TokenKind::Tilde => "`~`",
            TokenKind::PlusEqual => "`+=`",
            TokenKind::MinusEqual => "`-=`",
            TokenKind::StarEqual => "`*=`",
            TokenKind::SlashEqual => "`/=`",
            TokenKind::PercentEqual => "`%=`",
            TokenKind::AmpersandEqual => "`&=`",
            TokenKind::PipeEqual => "`|=`",
            TokenKind::CaretEqual => "`^=`",
            TokenKind::ShiftLeftEqual => "`<<=`",
            TokenKind::ShiftRightEqual => "`>>=`",
            TokenKind::AndAnd => "`&&`",
            TokenKind::OrOr => "`||`",
            TokenKind::PlusPlus => "`++`",
            TokenKind::MinusMinus => "`--`",
            TokenKind::ShiftLeft => "`<<`",
            TokenKind::ShiftRight => "`>>`",
            TokenKind::ColonColon => "`::`",
            TokenKind::FatArrow => "`=>`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Semicolon => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::Dot => "`.`",
            TokenKind::DotDot => "`..`",
            TokenKind::Ellipsis => "`...`",
            TokenKind::BlockComment => "block comment",
            TokenKind::EndOfFile => "end of file",
            TokenKind::Unknown => "unrecognized input",
        }
    }

    /// The bare operator spelling, used when printing MIR instructions.
    pub fn op_str(&self) -> &'static str {
        match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Ampersand => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::ShiftLeft => "<<",
            TokenKind::ShiftRight => ">>",
            TokenKind::Not => "!",
            TokenKind::Equal => "=",
            _ => "?",
        }
    }

    /// Whether this token can begin a type expression. Drives the `[`
    /// indexing-vs-specialization lookahead in the parser.
    pub fn can_start_type(&self) -> bool {
        matches!(
            self,
            TokenKind::I8
                | TokenKind::I16
                | TokenKind::I32
                | TokenKind::I64
                | TokenKind::U8
                | TokenKind::U16
                | TokenKind::U32
                | TokenKind::U64
                | TokenKind::F32
                | TokenKind::F64
                | TokenKind::Bool
                | TokenKind::Void
                | TokenKind::Identifier
                | TokenKind::Star
                | TokenKind::Ampersand
        )
    }
}

/// A token with its kind and source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn dummy(kind: TokenKind) -> Self {
        Self {
            kind,
            span: Span::dummy(),
        }
    }
}

/// The streaming lexer for Veil source.
///
/// Yields one token per `next()` call and a final [`TokenKind::EndOfFile`].
/// Position advances by at least one byte per non-EOF token, so the stream
/// is always finite.
#[derive(Clone)]
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, TokenKind>,
    source: &'src str,
    line_index: LineIndex,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            source,
            line_index: LineIndex::new(source),
            finished: false,
        }
    }

    /// The source text for a span.
    pub fn slice(&self, span: &Span) -> &'src str {
        &self.source[span.start..span.end]
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.inner.next() {
            Some(result) => {
                let logos_span = self.inner.span();
                let (line, col) = self.line_index.line_col(logos_span.start);
                let span = Span::new(logos_span.start, logos_span.end, line, col);
                let kind = result.unwrap_or(TokenKind::Unknown);
                Some(Token::new(kind, span))
            }
            None => {
                self.finished = true;
                let len = self.source.len();
                let (line, col) = self.line_index.line_col(len);
                Some(Token::new(
                    TokenKind::EndOfFile,
                    Span::new(len, len, line, col),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::EndOfFile)
            .collect()
    }

    #[test]
    fn keywords() {
        assert_eq!(lex("fn let mut class switch case"), vec![
            TokenKind::Fn,
            TokenKind::Let,
            TokenKind::Mut,
            TokenKind::Class,
            TokenKind::Switch,
            TokenKind::Case,
        ]);
    }

    #[test]
    fn identifiers_and_underscore() {
        assert_eq!(lex("foo Bar _baz _"), vec![
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Underscore,
        ]);
    }

    #[test]
    fn integer_forms() {
        assert_eq!(lex("42 0xFF 1_000_000 42i32 42_i32 0xDEAD_BEEF"), vec![
            TokenKind::Integer,
            TokenKind::Integer,
            TokenKind::Integer,
            TokenKind::Integer,
            TokenKind::Integer,
            TokenKind::Integer,
        ]);
    }

    #[test]
    fn invalid_suffix_backtracks() {
        // `abc` is not a width suffix, so the underscore stays with it.
        assert_eq!(lex("42_abc"), vec![
            TokenKind::Integer,
            TokenKind::Identifier,
        ]);
    }

    #[test]
    fn float_forms() {
        assert_eq!(lex("3.14 2.5e10 1.0e-5 1_000.5 3.14_f32 1e9"), vec![
            TokenKind::Float,
            TokenKind::Float,
            TokenKind::Float,
            TokenKind::Float,
            TokenKind::Float,
            TokenKind::Float,
        ]);
    }

    #[test]
    fn malformed_exponent_falls_back() {
        assert_eq!(lex("1e+x"), vec![
            TokenKind::Integer,
            TokenKind::Identifier,
            TokenKind::Plus,
            TokenKind::Identifier,
        ]);
    }

    #[test]
    fn dot_needs_digit() {
        assert_eq!(lex("1.foo"), vec![
            TokenKind::Integer,
            TokenKind::Dot,
            TokenKind::Identifier,
        ]);
    }

    #[test]
    fn strings() {
        assert_eq!(lex(r#""hello" "a\"b""#), vec![
            TokenKind::String,
            TokenKind::String,
        ]);
    }

    #[test]
    fn unterminated_string_is_unknown() {
        let kinds = lex("\"abc\nfn");
        assert!(kinds.contains(&TokenKind::Unknown));
        assert!(kinds.contains(&TokenKind::Fn));
    }

    #[test]
    fn char_vs_lifetime_vs_tick() {
        assert_eq!(lex("'a' 'a 'static '\\n'"), vec![
            TokenKind::Char,
            TokenKind::Lifetime,
            TokenKind::Lifetime,
            TokenKind::Char,
        ]);
        assert_eq!(lex("' "), vec![TokenKind::Tick]);
    }

    #[test]
    fn greedy_operators() {
        assert_eq!(lex("<<= >>= => :: ... << >> && || ++ -- += =="), vec![
            TokenKind::ShiftLeftEqual,
            TokenKind::ShiftRightEqual,
            TokenKind::FatArrow,
            TokenKind::ColonColon,
            TokenKind::Ellipsis,
            TokenKind::ShiftLeft,
            TokenKind::ShiftRight,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
            TokenKind::PlusEqual,
            TokenKind::EqualEqual,
        ]);
    }

    #[test]
    fn comments() {
        assert_eq!(lex("fn // line\nlet"), vec![TokenKind::Fn, TokenKind::Let]);
        assert_eq!(lex("fn /* block */ let"), vec![TokenKind::Fn, TokenKind::Let]);
        assert_eq!(lex("fn /* outer /* inner */ outer */ let"), vec![
            TokenKind::Fn,
            TokenKind::Let,
        ]);
    }

    #[test]
    fn unclosed_block_comment_is_unknown() {
        assert_eq!(lex("fn /* unclosed"), vec![TokenKind::Fn, TokenKind::Unknown]);
        assert_eq!(lex("fn /* outer /* inner */"), vec![
            TokenKind::Fn,
            TokenKind::Unknown,
        ]);
    }

    #[test]
    fn token_positions() {
        let tokens: Vec<_> = Lexer::new("fn main").collect();
        assert_eq!(tokens[0].span.start, 0);
        assert_eq!(tokens[0].span.end, 2);
        assert_eq!(tokens[1].span.start, 3);
        assert_eq!(tokens[1].span.end, 7);
        assert_eq!(tokens[1].span.line, 1);
        assert_eq!(tokens[1].span.column, 4);
    }

    #[test]
    fn stream_always_ends_in_eof() {
        let tokens: Vec<_> = Lexer::new("@ $ `").collect();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::EndOfFile);
        assert!(tokens[..tokens.len() - 1]
            .iter()
            .all(|t| t.kind == TokenKind::Unknown));
    }
}
