//! Type expression parsing.

use super::{ParseResult, Parser};
use crate::diagnostics::ErrorCode;
use crate::lexer::TokenKind;
use crate::types::Type;

impl<'src> Parser<'src> {
    /// Parse a type: a primitive keyword or a named type, followed by any
    /// number of `*` pointer and `[...]` suffixes. `Name[Args]` produces a
    /// placeholder struct whose textual name carries the argument list; the
    /// analyzer splits it back apart when resolving.
    pub(crate) fn parse_type(&mut self) -> ParseResult<Type> {
        let mut base = match self.current.kind {
            TokenKind::I8 => {
                self.advance();
                Type::i8()
            }
            TokenKind::I16 => {
                self.advance();
                Type::i16()
            }
            TokenKind::I32 => {
                self.advance();
                Type::i32()
            }
            TokenKind::I64 => {
                self.advance();
                Type::i64()
            }
            TokenKind::U8 => {
                self.advance();
                Type::u8()
            }
            TokenKind::U16 => {
                self.advance();
                Type::u16()
            }
            TokenKind::U32 => {
                self.advance();
                Type::u32()
            }
            TokenKind::U64 => {
                self.advance();
                Type::u64()
            }
            TokenKind::F32 => {
                self.advance();
                Type::f32()
            }
            TokenKind::F64 => {
                self.advance();
                Type::f64()
            }
            TokenKind::Bool => {
                self.advance();
                Type::bool()
            }
            TokenKind::Void => {
                self.advance();
                Type::void()
            }
            TokenKind::Identifier => {
                let name = self.current_text().to_string();
                self.advance();
                if self.is_active_generic_param(&name) {
                    Type::param(name)
                } else {
                    Type::named(name)
                }
            }
            _ => return Err(self.error_expected("a type").with_code(ErrorCode::ExpectedType)),
        };

        loop {
            if self.try_consume(TokenKind::Star) {
                base = Type::pointer(base);
            } else if self.check(TokenKind::LBracket) {
                if self.generic_context_ahead() {
                    self.advance();
                    let mut spec_name = format!("{base}[");
                    loop {
                        let arg = self.parse_type()?;
                        spec_name.push_str(&arg.to_string());
                        if self.try_consume(TokenKind::Comma) {
                            spec_name.push_str(", ");
                        } else {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBracket, "`]` after generic arguments")?;
                    spec_name.push(']');
                    base = Type::named(spec_name);
                } else {
                    self.advance();
                    let size_token = self.expect(TokenKind::Integer, "array size")?;
                    let text = self.text(&size_token.span).replace('_', "");
                    let size: usize = text.parse().map_err(|_| {
                        self.error_here("invalid array size", ErrorCode::UnexpectedToken)
                    })?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    base = Type::array(base, size);
                }
            } else {
                break;
            }
        }
        Ok(base)
    }

    /// Decide whether a `[` at the current position opens generic type
    /// arguments rather than an array index / size. True when the token
    /// after the `[` could begin a type: a primitive keyword, `*`, `&`, or
    /// any identifier.
    ///
    /// The identifier case is deliberately conservative: `f[x]` with a
    /// variable `x` parses as a specialization, so indexing an expression
    /// by a plain identifier needs parentheses around the index.
    pub(crate) fn generic_context_ahead(&self) -> bool {
        self.next.kind.can_start_type()
    }
}
