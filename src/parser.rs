//! Parser for Veil.
//!
//! A hand-written recursive descent parser with precedence climbing for
//! expressions, organized into submodules:
//!
//! - `item` - declarations (functions, structs, enums, classes, requests)
//! - `expr` - expression parsing and the postfix chain
//! - `pattern` - patterns for `case` arms
//! - `types` - type expressions and the `[` disambiguation
//!
//! The parser keeps a one-token lookahead (`next`) on top of the current
//! token; the lookahead decides whether `[` opens generic type arguments or
//! an array index. A stack of active generic-parameter name sets makes
//! `T` inside `fn id[T](x: T)` parse as a type parameter rather than a
//! named struct placeholder.
//!
//! There is no error recovery: the first error aborts the unit with a
//! diagnostic carrying the offending token's line.

mod expr;
mod item;
mod pattern;
mod types;

#[cfg(test)]
mod tests;

use std::collections::HashSet;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, Diagnostic>;

/// The Veil parser.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    source: &'src str,
    /// Current token.
    current: Token,
    /// Next token (one-token lookahead).
    next: Token,
    /// Names of generic parameters currently in scope, one set per
    /// enclosing generic declaration.
    active_generic_params: Vec<HashSet<String>>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next().unwrap_or(Token::dummy(TokenKind::EndOfFile));
        let next = lexer.next().unwrap_or(Token::dummy(TokenKind::EndOfFile));
        Self {
            lexer,
            source,
            current,
            next,
            active_generic_params: Vec::new(),
        }
    }

    /// Parse a complete compilation unit: a sequence of top-level
    /// declarations and statements.
    #[must_use = "parsing has no effect if the result is not used"]
    pub fn parse_program(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut nodes = Vec::new();
        while !self.check(TokenKind::EndOfFile) {
            let is_public = self.try_consume(TokenKind::Pub);
            let node = match self.current.kind {
                TokenKind::Fn | TokenKind::Extern => {
                    Stmt::Decl(Decl::Function(self.parse_function_decl(is_public)?))
                }
                TokenKind::Struct => Stmt::Decl(Decl::Struct(self.parse_struct_decl(is_public)?)),
                TokenKind::Enum => Stmt::Decl(Decl::Enum(self.parse_enum_decl(is_public)?)),
                TokenKind::Class => Stmt::Decl(Decl::Class(self.parse_class_decl(is_public)?)),
                TokenKind::Let => Stmt::Decl(Decl::Var(self.parse_var_decl(is_public)?)),
                TokenKind::Package => Stmt::Decl(Decl::Package(self.parse_package_decl()?)),
                TokenKind::Import => Stmt::Decl(Decl::Import(self.parse_import_decl()?)),
                TokenKind::Use => Stmt::Decl(Decl::Use(self.parse_use_decl()?)),
                TokenKind::Identifier if self.current_text() == "request" => {
                    Stmt::Decl(Decl::Request(self.parse_request_decl(is_public)?))
                }
                _ => self.parse_statement()?,
            };
            nodes.push(node);
        }
        Ok(nodes)
    }

    // ============================================================
    // Token handling
    // ============================================================

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn check_next(&self, kind: TokenKind) -> bool {
        self.next.kind == kind
    }

    /// Advance to the next token, returning the one just passed.
    pub(crate) fn advance(&mut self) -> Token {
        let passed = std::mem::replace(
            &mut self.current,
            std::mem::replace(
                &mut self.next,
                self.lexer
                    .next()
                    .unwrap_or(Token::dummy(TokenKind::EndOfFile)),
            ),
        );
        passed
    }

    pub(crate) fn try_consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a token of the expected kind, or fail with a diagnostic.
    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(what))
        }
    }

    pub(crate) fn text(&self, span: &Span) -> &'src str {
        &self.source[span.start..span.end]
    }

    pub(crate) fn current_text(&self) -> &'src str {
        self.text(&self.current.span)
    }

    // ============================================================
    // Error construction
    // ============================================================

    pub(crate) fn error_expected(&self, what: &str) -> Diagnostic {
        let found = self.current.kind.description();
        let code = match self.current.kind {
            TokenKind::EndOfFile => ErrorCode::UnexpectedEof,
            TokenKind::Unknown => ErrorCode::UnknownCharacter,
            _ => ErrorCode::UnexpectedToken,
        };
        Diagnostic::error_at(format!("expected {what}, found {found}"), self.current.span)
            .with_code(code)
    }

    pub(crate) fn error_here(&self, message: impl Into<String>, code: ErrorCode) -> Diagnostic {
        Diagnostic::error_at(message, self.current.span).with_code(code)
    }

    // ============================================================
    // Generic-parameter scope tracking
    // ============================================================

    pub(crate) fn push_generic_scope(&mut self) {
        self.active_generic_params.push(HashSet::new());
    }

    pub(crate) fn pop_generic_scope(&mut self) {
        self.active_generic_params.pop();
    }

    pub(crate) fn record_generic_param(&mut self, name: &str) {
        if let Some(scope) = self.active_generic_params.last_mut() {
            scope.insert(name.to_string());
        }
    }

    pub(crate) fn is_active_generic_param(&self, name: &str) -> bool {
        self.active_generic_params
            .iter()
            .rev()
            .any(|scope| scope.contains(name))
    }

    // ============================================================
    // Statements
    // ============================================================

    pub(crate) fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let is_public = self.try_consume(TokenKind::Pub);

        match self.current.kind {
            TokenKind::Let => Ok(Stmt::Decl(Decl::Var(self.parse_var_decl(is_public)?))),
            TokenKind::If => Ok(Stmt::If(self.parse_if_stmt()?)),
            TokenKind::While => Ok(Stmt::While(self.parse_while_stmt()?)),
            TokenKind::Do => Ok(Stmt::DoWhile(self.parse_do_while_stmt()?)),
            TokenKind::For => Ok(Stmt::For(self.parse_for_stmt()?)),
            TokenKind::Switch => Ok(Stmt::Switch(self.parse_switch_stmt()?)),
            TokenKind::Return => Ok(Stmt::Return(self.parse_return_stmt()?)),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Continue)
            }
            TokenKind::Fn | TokenKind::Extern => Ok(Stmt::Decl(Decl::Function(
                self.parse_function_decl(is_public)?,
            ))),
            TokenKind::Struct => Ok(Stmt::Decl(Decl::Struct(self.parse_struct_decl(is_public)?))),
            TokenKind::Enum => Ok(Stmt::Decl(Decl::Enum(self.parse_enum_decl(is_public)?))),
            TokenKind::Class => Ok(Stmt::Decl(Decl::Class(self.parse_class_decl(is_public)?))),
            TokenKind::Identifier if self.current_text() == "request" => Ok(Stmt::Decl(
                Decl::Request(self.parse_request_decl(is_public)?),
            )),
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    pub(crate) fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut statements = Vec::new();
        while !self.try_consume(TokenKind::RBrace) {
            if self.check(TokenKind::EndOfFile) {
                return Err(self.error_here("unterminated block", ErrorCode::MissingDelimiter));
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Block { statements })
    }

    fn parse_if_stmt(&mut self) -> ParseResult<IfStmt> {
        self.expect(TokenKind::If, "`if`")?;

        // Parentheses around the condition are optional.
        let has_paren = self.try_consume(TokenKind::LParen);
        let condition = self.parse_expression()?;
        if has_paren {
            self.expect(TokenKind::RParen, "`)`")?;
        }

        let then_block = self.parse_block()?;

        let else_block = if self.try_consume(TokenKind::Else) {
            if self.check(TokenKind::If) {
                // `else if` desugars to an else block with a nested if.
                let nested = self.parse_if_stmt()?;
                Some(Block {
                    statements: vec![Stmt::If(nested)],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(IfStmt {
            condition,
            then_block,
            else_block,
        })
    }

    fn parse_while_stmt(&mut self) -> ParseResult<WhileStmt> {
        self.expect(TokenKind::While, "`while`")?;
        let has_paren = self.try_consume(TokenKind::LParen);
        let condition = self.parse_expression()?;
        if has_paren {
            self.expect(TokenKind::RParen, "`)`")?;
        }
        let body = self.parse_block()?;
        Ok(WhileStmt { condition, body })
    }

    fn parse_do_while_stmt(&mut self) -> ParseResult<DoWhileStmt> {
        self.expect(TokenKind::Do, "`do`")?;
        let body = self.parse_block()?;
        self.expect(TokenKind::While, "`while`")?;
        self.expect(TokenKind::LParen, "`(`")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)`")?;
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(DoWhileStmt { body, condition })
    }

    fn parse_for_stmt(&mut self) -> ParseResult<ForStmt> {
        self.expect(TokenKind::For, "`for`")?;
        self.expect(TokenKind::LParen, "`(`")?;

        let init = if self.try_consume(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Let) {
            // parse_var_decl consumes the `;`.
            Some(Box::new(Stmt::Decl(Decl::Var(self.parse_var_decl(false)?))))
        } else {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "`;`")?;
            Some(Box::new(Stmt::Expr(expr)))
        };

        let condition = if self.try_consume(TokenKind::Semicolon) {
            None
        } else {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "`;`")?;
            Some(expr)
        };

        let step = if self.try_consume(TokenKind::RParen) {
            None
        } else {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::RParen, "`)`")?;
            Some(expr)
        };

        let body = self.parse_block()?;
        Ok(ForStmt {
            init,
            condition,
            step,
            body,
        })
    }

    fn parse_switch_stmt(&mut self) -> ParseResult<SwitchStmt> {
        self.expect(TokenKind::Switch, "`switch`")?;
        self.expect(TokenKind::LParen, "`(`")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)`")?;
        self.expect(TokenKind::LBrace, "`{`")?;

        let mut cases = Vec::new();
        while !self.try_consume(TokenKind::RBrace) {
            if self.check(TokenKind::EndOfFile) {
                return Err(self.error_here("unterminated switch", ErrorCode::MissingDelimiter));
            }
            cases.push(self.parse_case_stmt()?);
        }
        Ok(SwitchStmt { condition, cases })
    }

    fn parse_case_stmt(&mut self) -> ParseResult<CaseStmt> {
        let (pattern, is_default) = if self.try_consume(TokenKind::Case) {
            (Some(self.parse_pattern()?), false)
        } else if self.try_consume(TokenKind::Default) {
            (None, true)
        } else {
            return Err(self.error_expected("`case` or `default`"));
        };

        self.expect(TokenKind::Colon, "`:`")?;

        let mut statements = Vec::new();
        while !self.check(TokenKind::Case)
            && !self.check(TokenKind::Default)
            && !self.check(TokenKind::RBrace)
            && !self.check(TokenKind::EndOfFile)
        {
            statements.push(self.parse_statement()?);
        }

        Ok(CaseStmt {
            pattern,
            body: Block { statements },
            is_default,
        })
    }

    fn parse_return_stmt(&mut self) -> ParseResult<ReturnStmt> {
        self.expect(TokenKind::Return, "`return`")?;
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(ReturnStmt { value })
    }
}
