//! Declaration parsing: variables, functions, structs, enums, classes,
//! requests, imports.

use super::{ParseResult, Parser};
use crate::ast::*;
use crate::diagnostics::ErrorCode;
use crate::lexer::TokenKind;
use crate::types::Type;

impl<'src> Parser<'src> {
    pub(crate) fn parse_var_decl(&mut self, is_public: bool) -> ParseResult<VarDecl> {
        self.expect(TokenKind::Let, "`let`")?;
        let is_mutable = self.try_consume(TokenKind::Mut);
        let name_token = self.expect(TokenKind::Identifier, "identifier")?;
        let name = self.text(&name_token.span).to_string();

        let ty = if self.try_consume(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let init = if self.try_consume(TokenKind::Equal) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(VarDecl {
            name,
            ty,
            init,
            is_mutable,
            is_public,
        })
    }

    /// A struct or enum-variant field: `let [mut] name: T`. Fields are
    /// public regardless of modifiers; a written `pub` is redundant.
    fn parse_struct_field(&mut self) -> ParseResult<VarDecl> {
        if self.try_consume(TokenKind::Pub) {
            tracing::warn!(
                line = self.current.span.line,
                "struct fields are public by default, `pub` is redundant"
            );
        }
        self.expect(TokenKind::Let, "`let` in field declaration")?;
        let is_mutable = self.try_consume(TokenKind::Mut);
        let name_token = self.expect(TokenKind::Identifier, "field name")?;
        let name = self.text(&name_token.span).to_string();
        self.expect(TokenKind::Colon, "`:`")?;
        let ty = self.parse_type()?;
        self.try_consume(TokenKind::Semicolon);
        Ok(VarDecl {
            name,
            ty: Some(ty),
            init: None,
            is_mutable,
            is_public: true,
        })
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        let name_token = self.expect(TokenKind::Identifier, "parameter name")?;
        let name = self.text(&name_token.span).to_string();
        self.expect(TokenKind::Colon, "`:`")?;
        let ty = self.parse_type()?;
        Ok(Param { name, ty })
    }

    pub(crate) fn parse_function_decl(&mut self, is_public: bool) -> ParseResult<FunctionDecl> {
        let is_extern = self.try_consume(TokenKind::Extern);
        self.expect(TokenKind::Fn, "`fn`")?;
        let name_token = self.expect(TokenKind::Identifier, "function name")?;
        let name = self.text(&name_token.span).to_string();

        self.push_generic_scope();
        let generic_params = self.parse_generic_params()?;

        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        let mut is_variadic = false;
        if !self.try_consume(TokenKind::RParen) {
            loop {
                if self.try_consume(TokenKind::Ellipsis) {
                    is_variadic = true;
                    break;
                }
                params.push(self.parse_param()?);
                if !self.try_consume(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)`")?;
        }

        self.expect(TokenKind::Colon, "`:` before return type")?;
        let return_type = self.parse_type()?;

        let body = if is_extern {
            self.expect(TokenKind::Semicolon, "`;` after extern declaration")?;
            None
        } else {
            Some(self.parse_block()?)
        };

        self.pop_generic_scope();
        Ok(FunctionDecl {
            name,
            generic_params,
            params,
            return_type,
            body,
            is_extern,
            is_public,
            is_variadic,
        })
    }

    pub(crate) fn parse_struct_decl(&mut self, is_public: bool) -> ParseResult<StructDecl> {
        self.expect(TokenKind::Struct, "`struct`")?;
        let name_token = self.expect(TokenKind::Identifier, "struct name")?;
        let name = self.text(&name_token.span).to_string();

        self.push_generic_scope();
        let generic_params = self.parse_generic_params()?;
        let requirements = self.parse_require_clause()?;

        self.expect(TokenKind::LBrace, "`{`")?;
        let mut members = Vec::new();
        while !self.try_consume(TokenKind::RBrace) {
            if self.check(TokenKind::EndOfFile) {
                return Err(self.error_here("unterminated struct body", ErrorCode::MissingDelimiter));
            }
            members.push(self.parse_struct_field()?);
            self.try_consume(TokenKind::Semicolon);
        }

        self.pop_generic_scope();
        Ok(StructDecl {
            name,
            members,
            is_public,
            generic_params,
            requirements,
        })
    }

    pub(crate) fn parse_enum_decl(&mut self, is_public: bool) -> ParseResult<EnumDecl> {
        self.expect(TokenKind::Enum, "`enum`")?;
        let name_token = self.expect(TokenKind::Identifier, "enum name")?;
        let name = self.text(&name_token.span).to_string();

        self.push_generic_scope();
        let generic_params = self.parse_generic_params()?;
        let requirements = self.parse_require_clause()?;

        self.expect(TokenKind::LBrace, "`{`")?;
        let mut variants = Vec::new();
        while !self.try_consume(TokenKind::RBrace) {
            if self.check(TokenKind::EndOfFile) {
                return Err(self.error_here("unterminated enum body", ErrorCode::MissingDelimiter));
            }
            variants.push(self.parse_enum_variant()?);
            self.try_consume(TokenKind::Comma);
        }

        self.pop_generic_scope();
        Ok(EnumDecl {
            name,
            variants,
            is_public,
            generic_params,
            requirements,
            ty: None,
        })
    }

    fn parse_enum_variant(&mut self) -> ParseResult<EnumVariantDecl> {
        let name_token = self.expect(TokenKind::Identifier, "variant name")?;
        let name = self.text(&name_token.span).to_string();

        let body = if self.try_consume(TokenKind::LParen) {
            let mut tuple_types = Vec::new();
            if !self.try_consume(TokenKind::RParen) {
                loop {
                    tuple_types.push(self.parse_type()?);
                    if !self.try_consume(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "`)` after tuple variant types")?;
            }
            VariantBody::Tuple(tuple_types)
        } else if self.try_consume(TokenKind::LBrace) {
            let mut fields = Vec::new();
            while !self.try_consume(TokenKind::RBrace) {
                fields.push(self.parse_struct_field()?);
                self.try_consume(TokenKind::Semicolon);
            }
            VariantBody::Struct(fields)
        } else {
            VariantBody::Unit
        };

        Ok(EnumVariantDecl { name, body })
    }

    pub(crate) fn parse_class_decl(&mut self, is_public: bool) -> ParseResult<ClassDecl> {
        self.expect(TokenKind::Class, "`class`")?;
        let name_token = self.expect(TokenKind::Identifier, "class name")?;
        let name = self.text(&name_token.span).to_string();

        self.push_generic_scope();
        let generic_params = self.parse_generic_params()?;
        let requirements = self.parse_require_clause()?;

        self.expect(TokenKind::LBrace, "`{`")?;
        let mut members = Vec::new();
        while !self.try_consume(TokenKind::RBrace) {
            let member_public = self.try_consume(TokenKind::Pub);
            match self.current.kind {
                TokenKind::Let => {
                    members.push(ClassMember::Field(self.parse_var_decl(member_public)?));
                }
                TokenKind::Fn | TokenKind::Tilde => {
                    members.push(ClassMember::Method(self.parse_method_decl(member_public)?));
                }
                TokenKind::Identifier if self.current_text() == name => {
                    members.push(ClassMember::Constructor(
                        self.parse_constructor_decl(member_public)?,
                    ));
                }
                _ => {
                    return Err(self
                        .error_expected("a field, method, or constructor declaration in class"));
                }
            }
        }

        self.pop_generic_scope();
        Ok(ClassDecl {
            name,
            members,
            is_public,
            generic_params,
            requirements,
        })
    }

    fn parse_constructor_decl(&mut self, is_public: bool) -> ParseResult<ConstructorDecl> {
        let name_token = self.expect(TokenKind::Identifier, "constructor name")?;
        let name = self.text(&name_token.span).to_string();

        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.try_consume(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.try_consume(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)`")?;
        }

        let body = self.parse_block()?;
        Ok(ConstructorDecl {
            name,
            params,
            body,
            is_public,
        })
    }

    /// A method, or a destructor written `~Name(...)` (an optional leading
    /// `fn` is accepted for destructors too). The receiver is `self`,
    /// `&self`, or `&mut self`; its type is recorded as the `Self`
    /// placeholder for the analyzer to resolve.
    pub(crate) fn parse_method_decl(&mut self, is_public: bool) -> ParseResult<MethodDecl> {
        self.try_consume(TokenKind::Fn);

        let mut name = String::new();
        if self.try_consume(TokenKind::Tilde) {
            name.push('~');
        }
        let name_token = self.expect(TokenKind::Identifier, "method name")?;
        name.push_str(self.text(&name_token.span));

        self.push_generic_scope();
        let generic_params = self.parse_generic_params()?;

        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();

        if self.try_consume(TokenKind::SelfLower) {
            params.push(Param {
                name: "self".to_string(),
                ty: Type::named("Self"),
            });
            if !self.check(TokenKind::RParen) {
                self.expect(TokenKind::Comma, "`,` after self")?;
            }
        } else if self.try_consume(TokenKind::Ampersand) {
            self.try_consume(TokenKind::Mut);
            self.expect(TokenKind::SelfLower, "`self` after `&`")?;
            params.push(Param {
                name: "self".to_string(),
                ty: Type::pointer(Type::named("Self")),
            });
            if !self.check(TokenKind::RParen) {
                self.expect(TokenKind::Comma, "`,` after self")?;
            }
        }

        if !self.try_consume(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.try_consume(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)`")?;
        }

        let return_type = if self.try_consume(TokenKind::Colon) {
            self.parse_type()?
        } else {
            Type::void()
        };

        let body = if self.check(TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            self.expect(TokenKind::Semicolon, "`;` or a body after method declaration")?;
            None
        };

        self.pop_generic_scope();
        Ok(MethodDecl {
            name,
            generic_params,
            params,
            return_type,
            body,
            is_public,
        })
    }

    // ============================================================
    // Generics and constraints
    // ============================================================

    pub(crate) fn parse_generic_params(&mut self) -> ParseResult<Vec<GenericParam>> {
        let mut params = Vec::new();
        if self.try_consume(TokenKind::LBracket) {
            if !self.try_consume(TokenKind::RBracket) {
                loop {
                    let name_token = self.expect(TokenKind::Identifier, "generic parameter name")?;
                    let name = self.text(&name_token.span).to_string();
                    let constraint = if self.try_consume(TokenKind::Question) {
                        Some(self.parse_constraint()?)
                    } else {
                        None
                    };
                    self.record_generic_param(&name);
                    params.push(GenericParam { name, constraint });
                    if !self.try_consume(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "`]` after generic parameters")?;
            }
        }
        Ok(params)
    }

    fn parse_constraint(&mut self) -> ParseResult<Constraint> {
        let mut items = Vec::new();
        loop {
            let logic = if items.is_empty() {
                ConstraintLogic::None
            } else if self.try_consume(TokenKind::AndAnd) {
                ConstraintLogic::And
            } else if self.try_consume(TokenKind::OrOr) {
                ConstraintLogic::Or
            } else {
                break;
            };
            let name_token = self.expect(TokenKind::Identifier, "request name in constraint")?;
            items.push(ConstraintItem {
                trait_name: self.text(&name_token.span).to_string(),
                logic,
            });
            if !self.check(TokenKind::AndAnd) && !self.check(TokenKind::OrOr) {
                break;
            }
        }
        Ok(Constraint { items })
    }

    fn parse_require_clause(&mut self) -> ParseResult<Vec<String>> {
        let mut requirements = Vec::new();
        if self.check(TokenKind::Identifier) && self.current_text() == "require" {
            self.advance();
            loop {
                let name_token = self.expect(TokenKind::Identifier, "constraint name")?;
                requirements.push(self.text(&name_token.span).to_string());
                if !self.try_consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(requirements)
    }

    // ============================================================
    // Requests
    // ============================================================

    pub(crate) fn parse_request_decl(&mut self, is_public: bool) -> ParseResult<RequestDecl> {
        self.expect(TokenKind::Identifier, "`request`")?;
        let kind = if self.try_consume(TokenKind::Class) {
            RequestKind::Class
        } else if self.try_consume(TokenKind::Enum) {
            RequestKind::Enum
        } else {
            return Err(self.error_expected("`class` or `enum` after `request`"));
        };

        let name_token = self.expect(TokenKind::Identifier, "request name")?;
        let name = self.text(&name_token.span).to_string();

        self.push_generic_scope();
        let generic_params = self.parse_generic_params()?;

        let mut bases = Vec::new();
        if self.try_consume(TokenKind::Colon) {
            loop {
                let base_token = self.expect(TokenKind::Identifier, "base request name")?;
                bases.push(self.text(&base_token.span).to_string());
                if !self.try_consume(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace, "`{` in request body")?;
        let mut members = Vec::new();
        while !self.try_consume(TokenKind::RBrace) {
            let is_default = self.try_consume(TokenKind::Default);
            let member_public = self.try_consume(TokenKind::Pub);

            let item = match self.current.kind {
                TokenKind::Let => RequestItem::Field(self.parse_var_decl(member_public)?),
                TokenKind::Fn => RequestItem::Method(self.parse_method_decl(member_public)?),
                TokenKind::Identifier if kind == RequestKind::Enum => {
                    RequestItem::Variant(self.parse_enum_variant()?)
                }
                _ => return Err(self.error_expected("a member declaration in request body")),
            };
            members.push(RequestMember { item, is_default });
            self.try_consume(TokenKind::Comma);
        }

        self.pop_generic_scope();
        Ok(RequestDecl {
            name,
            kind,
            members,
            bases,
            generic_params,
            is_public,
        })
    }

    // ============================================================
    // Imports, packages, `use`
    // ============================================================

    pub(crate) fn parse_import_decl(&mut self) -> ParseResult<ImportDecl> {
        self.expect(TokenKind::Import, "`import`")?;

        let (path, is_std) = if self.check(TokenKind::String) {
            let raw = self.current_text();
            let path = raw.trim_matches('"').to_string();
            self.advance();
            (path, false)
        } else {
            // Qualified name form: `import std::vec;`
            let first = self.expect(TokenKind::Identifier, "module path")?;
            let mut path = self.text(&first.span).to_string();
            while self.try_consume(TokenKind::ColonColon) {
                let seg = self.expect(TokenKind::Identifier, "module path segment")?;
                path.push_str("::");
                path.push_str(self.text(&seg.span));
            }
            (path, true)
        };

        let alias = if self.try_consume(TokenKind::As) {
            let alias_token = self.expect(TokenKind::Identifier, "alias")?;
            self.text(&alias_token.span).to_string()
        } else {
            String::new()
        };

        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(ImportDecl {
            path,
            is_std,
            alias,
        })
    }

    pub(crate) fn parse_package_decl(&mut self) -> ParseResult<PackageDecl> {
        self.expect(TokenKind::Package, "`package`")?;
        let first = self.expect(TokenKind::Identifier, "package name")?;
        let mut name = self.text(&first.span).to_string();
        while self.try_consume(TokenKind::ColonColon) {
            let seg = self.expect(TokenKind::Identifier, "package path segment")?;
            name.push_str("::");
            name.push_str(self.text(&seg.span));
        }
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(PackageDecl { name })
    }

    pub(crate) fn parse_use_decl(&mut self) -> ParseResult<UseDecl> {
        self.expect(TokenKind::Use, "`use`")?;
        let first = self.expect(TokenKind::Identifier, "module path")?;
        let mut path = self.text(&first.span).to_string();
        while self.try_consume(TokenKind::ColonColon) {
            let seg = self.expect(TokenKind::Identifier, "path segment")?;
            path.push_str("::");
            path.push_str(self.text(&seg.span));
        }

        let alias = if self.try_consume(TokenKind::As) {
            let alias_token = self.expect(TokenKind::Identifier, "alias")?;
            self.text(&alias_token.span).to_string()
        } else {
            String::new()
        };

        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(UseDecl { path, alias })
    }
}
