//! Expression parsing: precedence climbing over a unary/postfix/primary
//! core, plus literal decoding.

use super::{ParseResult, Parser};
use crate::ast::*;
use crate::diagnostics::ErrorCode;
use crate::lexer::TokenKind;
use crate::types::Type;

/// Binding power of a binary operator; higher binds tighter. Assignment is
/// lowest and right-associative; everything else is left-associative.
fn precedence(kind: TokenKind) -> Option<u8> {
    Some(match kind {
        TokenKind::Equal => 5,
        TokenKind::OrOr => 8,
        TokenKind::AndAnd => 10,
        TokenKind::Pipe => 15,
        TokenKind::Caret => 20,
        TokenKind::Ampersand => 25,
        TokenKind::EqualEqual | TokenKind::NotEqual => 30,
        TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual => 35,
        TokenKind::ShiftLeft | TokenKind::ShiftRight => 38,
        TokenKind::Plus | TokenKind::Minus => 40,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 50,
        _ => return None,
    })
}

impl<'src> Parser<'src> {
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_expression_prec(0)
    }

    fn parse_expression_prec(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(prec) = precedence(self.current.kind) {
            if prec < min_prec {
                break;
            }
            let op = self.current.kind;
            self.advance();
            // Right-associativity for `=`: recurse at the same level so
            // `a = b = c` groups as `a = (b = c)`.
            let next_min = if op == TokenKind::Equal { prec } else { prec + 1 };
            let right = self.parse_expression_prec(next_min)?;
            left = Expr::new(ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.try_consume(TokenKind::Ampersand) {
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::AddressOf(Box::new(operand))));
        }
        if self.try_consume(TokenKind::Star) {
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Deref(Box::new(operand))));
        }
        for op in [
            TokenKind::Minus,
            TokenKind::Plus,
            TokenKind::Not,
            TokenKind::Tilde,
        ] {
            if self.try_consume(op) {
                let operand = self.parse_unary()?;
                return Ok(Expr::new(ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                }));
            }
        }
        self.parse_postfix()
    }

    /// The postfix chain: member selection (`.` and `::`), calls, `[` as
    /// either indexing or generic specialization, `?`, and trailing struct
    /// literals.
    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_primary()?;

        loop {
            if self.check(TokenKind::Dot) || self.check(TokenKind::ColonColon) {
                let is_static = self.check(TokenKind::ColonColon);
                self.advance();
                let member_token = self.expect(TokenKind::Identifier, "member name")?;
                let member = self.text(&member_token.span).to_string();
                let access = Expr::new(ExprKind::Member {
                    base: Box::new(left),
                    member,
                    is_static,
                });
                left = if self.try_consume(TokenKind::LBrace) {
                    self.parse_struct_literal(access)?
                } else {
                    access
                };
            } else if self.try_consume(TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.try_consume(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.try_consume(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "`)`")?;
                }
                left = Expr::new(ExprKind::Call {
                    callee: Box::new(left),
                    args,
                });
            } else if self.check(TokenKind::LBracket) {
                if self.generic_context_ahead() {
                    self.advance();
                    let mut type_args = Vec::new();
                    if !self.try_consume(TokenKind::RBracket) {
                        loop {
                            type_args.push(self.parse_type()?);
                            if !self.try_consume(TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokenKind::RBracket, "`]` after generic arguments")?;
                    }
                    left = Expr::new(ExprKind::Specialization {
                        base: Box::new(left),
                        type_args,
                        mangled: String::new(),
                    });
                } else {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "`]` after index")?;
                    left = Expr::new(ExprKind::Index {
                        base: Box::new(left),
                        index: Box::new(index),
                    });
                }
            } else if self.try_consume(TokenKind::Question) {
                left = Expr::new(ExprKind::Question(Box::new(left)));
            } else if self.check(TokenKind::LBrace) {
                match left.kind {
                    ExprKind::Identifier(_)
                    | ExprKind::Member { .. }
                    | ExprKind::Specialization { .. } => {
                        self.advance();
                        left = self.parse_struct_literal(left)?;
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        Ok(left)
    }

    /// Field initializers following an already-consumed `{`.
    fn parse_struct_literal(&mut self, base: Expr) -> ParseResult<Expr> {
        let mut fields = Vec::new();
        if !self.try_consume(TokenKind::RBrace) {
            loop {
                let name_token = self.expect(TokenKind::Identifier, "field name")?;
                let name = self.text(&name_token.span).to_string();
                self.expect(TokenKind::Colon, "`:` after field name")?;
                let value = self.parse_expression()?;
                fields.push(FieldInit { name, value });
                if !self.try_consume(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "`}` after field initializers")?;
        }
        Ok(Expr::new(ExprKind::StructLiteral {
            base: Box::new(base),
            fields,
        }))
    }

    pub(crate) fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current.kind {
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            TokenKind::Integer => {
                let text = self.current_text().to_string();
                self.advance();
                let (value, explicit_ty) = decode_int_literal(&text)
                    .map_err(|msg| self.error_here(msg, ErrorCode::UnexpectedToken))?;
                Ok(Expr::new(ExprKind::Literal {
                    value: LiteralValue::Int(value),
                    explicit_ty,
                }))
            }
            TokenKind::Float => {
                let text = self.current_text().to_string();
                self.advance();
                let (value, explicit_ty) = decode_float_literal(&text)
                    .map_err(|msg| self.error_here(msg, ErrorCode::UnexpectedToken))?;
                Ok(Expr::new(ExprKind::Literal {
                    value: LiteralValue::Float(value),
                    explicit_ty,
                }))
            }
            TokenKind::String => {
                let raw = self.current_text();
                let unescaped = unescape_string(&raw[1..raw.len() - 1]);
                self.advance();
                Ok(Expr::new(ExprKind::Literal {
                    value: LiteralValue::Str(unescaped),
                    explicit_ty: None,
                }))
            }
            TokenKind::True | TokenKind::False => {
                let value = self.check(TokenKind::True);
                self.advance();
                Ok(Expr::new(ExprKind::Literal {
                    value: LiteralValue::Bool(value),
                    explicit_ty: None,
                }))
            }
            TokenKind::Nullptr => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal {
                    value: LiteralValue::NullPtr,
                    explicit_ty: None,
                }))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.try_consume(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.try_consume(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBracket, "`]` after array literal")?;
                }
                Ok(Expr::new(ExprKind::ArrayLiteral(elements)))
            }
            TokenKind::Sizeof
            | TokenKind::Alignof
            | TokenKind::Offsetof
            | TokenKind::Malloc
            | TokenKind::Alloca
            | TokenKind::Free => self.parse_intrinsic(),
            TokenKind::Identifier | TokenKind::SelfLower => {
                let name = self.current_text().to_string();
                self.advance();
                let base = Expr::ident(name);
                if self.try_consume(TokenKind::LBrace) {
                    self.parse_struct_literal(base)
                } else {
                    Ok(base)
                }
            }
            _ => Err(self
                .error_expected("an expression")
                .with_code(ErrorCode::ExpectedExpression)),
        }
    }

    /// `sizeof`/`alignof`/`offsetof`/`malloc`/`alloca`/`free`, each with an
    /// optional `[Type]` argument. The first argument of `offsetof` is a
    /// bare field name, not an expression.
    fn parse_intrinsic(&mut self) -> ParseResult<Expr> {
        let kind = match self.current.kind {
            TokenKind::Sizeof => IntrinsicKind::Sizeof,
            TokenKind::Alignof => IntrinsicKind::Alignof,
            TokenKind::Offsetof => IntrinsicKind::Offsetof,
            TokenKind::Malloc => IntrinsicKind::Malloc,
            TokenKind::Alloca => IntrinsicKind::Alloca,
            _ => IntrinsicKind::Free,
        };
        self.advance();

        let type_arg = if self.try_consume(TokenKind::LBracket) {
            let ty = self.parse_type()?;
            self.expect(TokenKind::RBracket, "`]` after type argument")?;
            Some(ty)
        } else {
            None
        };

        self.expect(TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.try_consume(TokenKind::RParen) {
            loop {
                if kind == IntrinsicKind::Offsetof && args.is_empty() {
                    let member = self.expect(TokenKind::Identifier, "member name in offsetof")?;
                    args.push(Expr::ident(self.text(&member.span)));
                } else {
                    args.push(self.parse_expression()?);
                }
                if !self.try_consume(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)`")?;
        }

        Ok(Expr::new(ExprKind::Intrinsic {
            kind,
            type_arg,
            args,
        }))
    }
}

/// Decode an integer token: strip `_` separators, honor the `0x` prefix,
/// and peel a width suffix into an explicit type.
fn decode_int_literal(text: &str) -> Result<(i64, Option<Type>), String> {
    const SUFFIXES: &[(&str, fn() -> Type)] = &[
        ("i16", Type::i16),
        ("i32", Type::i32),
        ("i64", Type::i64),
        ("u16", Type::u16),
        ("u32", Type::u32),
        ("u64", Type::u64),
        ("i8", Type::i8),
        ("u8", Type::u8),
    ];

    let mut digits = text;
    let mut explicit_ty = None;
    for (suffix, make) in SUFFIXES {
        if let Some(stripped) = digits.strip_suffix(suffix) {
            digits = stripped.strip_suffix('_').unwrap_or(stripped);
            explicit_ty = Some(make());
            break;
        }
    }

    let cleaned = digits.replace('_', "");
    let value = if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).map_err(|_| "invalid hexadecimal integer literal".to_string())
    } else {
        cleaned
            .parse::<i64>()
            .map_err(|_| "invalid integer literal".to_string())
    }?;

    Ok((value, explicit_ty))
}

/// Decode a float token: strip `_` separators and an optional `f32`/`f64`
/// suffix.
fn decode_float_literal(text: &str) -> Result<(f64, Option<Type>), String> {
    let mut digits = text;
    let mut explicit_ty = None;
    if let Some(stripped) = digits.strip_suffix("f32") {
        digits = stripped.strip_suffix('_').unwrap_or(stripped);
        explicit_ty = Some(Type::f32());
    } else if let Some(stripped) = digits.strip_suffix("f64") {
        digits = stripped.strip_suffix('_').unwrap_or(stripped);
        explicit_ty = Some(Type::f64());
    }

    let value = digits
        .replace('_', "")
        .parse::<f64>()
        .map_err(|_| "invalid floating-point literal".to_string())?;
    Ok((value, explicit_ty))
}

fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('\'') => result.push('\''),
                Some('"') => result.push('"'),
                Some('0') => result.push('\0'),
                Some(other) => result.push(other),
                None => {}
            }
        } else {
            result.push(c);
        }
    }
    result
}
