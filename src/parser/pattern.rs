//! Pattern parsing for `case` arms.

use super::{ParseResult, Parser};
use crate::ast::Pattern;
use crate::diagnostics::ErrorCode;
use crate::lexer::TokenKind;

impl<'src> Parser<'src> {
    /// Wildcard `_`; literal; identifier binding; variant in either
    /// `Enum::Variant(...)` or bare `Variant(...)` form. A generic variant
    /// like `Enum[T]::Variant` folds the type arguments into the written
    /// enum name, which the analyzer canonicalizes against the mangled
    /// scrutinee type.
    pub(crate) fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        if self.try_consume(TokenKind::Underscore) {
            return Ok(Pattern::Wildcard);
        }

        if matches!(
            self.current.kind,
            TokenKind::Integer
                | TokenKind::Float
                | TokenKind::String
                | TokenKind::True
                | TokenKind::False
        ) {
            let literal = self.parse_primary()?;
            return Ok(Pattern::Literal(Box::new(literal)));
        }

        if self.check(TokenKind::Identifier) {
            let mut first = self.current_text().to_string();
            self.advance();

            if self.check(TokenKind::LBracket) && self.generic_context_ahead() {
                self.advance();
                first.push('[');
                loop {
                    let arg = self.parse_type()?;
                    first.push_str(&arg.to_string());
                    if self.try_consume(TokenKind::Comma) {
                        first.push_str(", ");
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "`]` after generic arguments")?;
                first.push(']');
            }

            if self.try_consume(TokenKind::ColonColon) {
                let variant_token = self.expect(TokenKind::Identifier, "variant name")?;
                let variant = self.text(&variant_token.span).to_string();
                let sub_patterns = self.parse_sub_patterns()?;
                return Ok(Pattern::Variant {
                    enum_name: first,
                    variant,
                    sub_patterns,
                });
            }

            if self.check(TokenKind::LParen) || self.check(TokenKind::LBrace) {
                let sub_patterns = self.parse_sub_patterns()?;
                return Ok(Pattern::Variant {
                    enum_name: String::new(),
                    variant: first,
                    sub_patterns,
                });
            }

            return Ok(Pattern::Identifier(first));
        }

        Err(self
            .error_expected("a pattern")
            .with_code(ErrorCode::ExpectedPattern))
    }

    /// Parenthesized or braced sub-patterns, or none for unit variants.
    fn parse_sub_patterns(&mut self) -> ParseResult<Vec<Pattern>> {
        let mut sub_patterns = Vec::new();
        if self.try_consume(TokenKind::LParen) {
            if !self.try_consume(TokenKind::RParen) {
                loop {
                    sub_patterns.push(self.parse_pattern()?);
                    if !self.try_consume(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "`)`")?;
            }
        } else if self.try_consume(TokenKind::LBrace) {
            if !self.try_consume(TokenKind::RBrace) {
                loop {
                    sub_patterns.push(self.parse_pattern()?);
                    if !self.try_consume(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "`}`")?;
            }
        }
        Ok(sub_patterns)
    }
}
