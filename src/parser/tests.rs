//! Parser unit tests.

use super::Parser;
use crate::ast::*;
use crate::lexer::TokenKind;
use crate::types::Type;

fn parse(source: &str) -> Vec<Stmt> {
    Parser::new(source)
        .parse_program()
        .unwrap_or_else(|e| panic!("parse failed: {e}"))
}

fn parse_err(source: &str) -> crate::diagnostics::Diagnostic {
    Parser::new(source)
        .parse_program()
        .expect_err("expected a parse error")
}

fn first_expr(source: &str) -> Expr {
    let program = parse(source);
    match program.into_iter().next() {
        Some(Stmt::Expr(expr)) => expr,
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn function_declaration_shape() {
    let program = parse("fn add(a: i32, b: i32): i32 { return a + b; }");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!("expected function");
    };
    assert_eq!(func.name, "add");
    assert_eq!(func.params.len(), 2);
    assert_eq!(func.params[0].ty, Type::i32());
    assert_eq!(func.return_type, Type::i32());
    assert!(!func.is_extern);
    assert!(func.body.is_some());
}

#[test]
fn extern_variadic_function() {
    let program = parse("extern fn printf(fmt: i8*, ...): i32;");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!("expected function");
    };
    assert!(func.is_extern);
    assert!(func.is_variadic);
    assert!(func.body.is_none());
    assert_eq!(func.params[0].ty, Type::pointer(Type::i8()));
}

#[test]
fn generic_params_become_type_parameters() {
    let program = parse("fn id[T](x: T): T { return x; }");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!("expected function");
    };
    assert_eq!(func.generic_params.len(), 1);
    assert!(func.params[0].ty.is_type_param());
    assert!(func.return_type.is_type_param());
}

#[test]
fn generic_constraints() {
    let program = parse("fn show[T ? Printable && Ordered](x: T): void { }");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!("expected function");
    };
    let constraint = func.generic_params[0].constraint.as_ref().expect("constraint");
    assert_eq!(constraint.items.len(), 2);
    assert_eq!(constraint.items[0].trait_name, "Printable");
    assert_eq!(constraint.items[1].trait_name, "Ordered");
    assert_eq!(constraint.items[1].logic, ConstraintLogic::And);
}

#[test]
fn bracket_disambiguation_indexing() {
    // `a[0]` indexes: an integer cannot start a type.
    let expr = first_expr("a[0] = 1;");
    let ExprKind::Binary { op, left, .. } = &expr.kind else {
        panic!("expected assignment");
    };
    assert_eq!(*op, TokenKind::Equal);
    assert!(matches!(left.kind, ExprKind::Index { .. }));
}

#[test]
fn bracket_disambiguation_specialization() {
    // `add[i32]` specializes: `i32` is a type token.
    let expr = first_expr("add[i32](1, 2);");
    let ExprKind::Call { callee, args } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 2);
    let ExprKind::Specialization { type_args, .. } = &callee.kind else {
        panic!("expected specialization");
    };
    assert_eq!(type_args[0], Type::i32());
}

#[test]
fn precedence_and_associativity() {
    let expr = first_expr("1 + 2 * 3;");
    // `2 * 3` binds tighter than `+`.
    let ExprKind::Binary { op, right, .. } = &expr.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, TokenKind::Plus);
    assert!(matches!(
        right.kind,
        ExprKind::Binary {
            op: TokenKind::Star,
            ..
        }
    ));

    // Assignment is right-associative.
    let program = parse("fn f(): void { a = b = c; }");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!()
    };
    let Some(Stmt::Expr(assign)) = func.body.as_ref().map(|b| &b.statements[0]) else {
        panic!("expected expression statement");
    };
    let ExprKind::Binary { right, .. } = &assign.kind else {
        panic!()
    };
    assert!(matches!(
        right.kind,
        ExprKind::Binary {
            op: TokenKind::Equal,
            ..
        }
    ));
}

#[test]
fn struct_literal_after_identifier() {
    let expr = first_expr("Point { x: 1, y: 2 };");
    let ExprKind::StructLiteral { base, fields } = &expr.kind else {
        panic!("expected struct literal");
    };
    assert_eq!(base.as_ident(), Some("Point"));
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].name, "x");
}

#[test]
fn question_postfix() {
    let expr = first_expr("g()?;");
    let ExprKind::Question(inner) = &expr.kind else {
        panic!("expected question expression");
    };
    assert!(matches!(inner.kind, ExprKind::Call { .. }));
}

#[test]
fn member_access_static_flag() {
    let expr = first_expr("Color::Red;");
    let ExprKind::Member {
        member, is_static, ..
    } = &expr.kind
    else {
        panic!("expected member access");
    };
    assert_eq!(member, "Red");
    assert!(is_static);

    let expr = first_expr("p.x;");
    let ExprKind::Member { is_static, .. } = &expr.kind else {
        panic!()
    };
    assert!(!is_static);
}

#[test]
fn enum_declaration_with_variant_kinds() {
    let program = parse("enum Shape { Dot, Pair(i32, i32), Rect { let w: i32 let h: i32 } }");
    let Stmt::Decl(Decl::Enum(en)) = &program[0] else {
        panic!("expected enum");
    };
    assert_eq!(en.variants.len(), 3);
    assert!(matches!(en.variants[0].body, VariantBody::Unit));
    assert!(matches!(&en.variants[1].body, VariantBody::Tuple(types) if types.len() == 2));
    assert!(matches!(&en.variants[2].body, VariantBody::Struct(fields) if fields.len() == 2));
}

#[test]
fn class_members_and_receivers() {
    let program = parse(
        "class Counter {
            let count: i32;
            Counter(start: i32) { }
            pub fn get(&self): i32 { return 0; }
            fn bump(&mut self): void { }
            ~Counter(&self): void { }
        }",
    );
    let Stmt::Decl(Decl::Class(class)) = &program[0] else {
        panic!("expected class");
    };
    assert_eq!(class.members.len(), 5);

    let ClassMember::Method(get) = &class.members[2] else {
        panic!("expected method");
    };
    assert!(get.is_public);
    // `&self` records a pointer to the Self placeholder.
    assert!(get.params[0].ty.pointee().is_some());

    let ClassMember::Method(dtor) = &class.members[4] else {
        panic!("expected destructor");
    };
    assert!(dtor.is_destructor());
    assert_eq!(dtor.name, "~Counter");
}

#[test]
fn request_declaration() {
    let program = parse(
        "pub request class Printable[T] {
            fn print(&self): void;
        }",
    );
    let Stmt::Decl(Decl::Request(req)) = &program[0] else {
        panic!("expected request");
    };
    assert_eq!(req.kind, RequestKind::Class);
    assert!(req.is_public);
    assert_eq!(req.generic_params.len(), 1);
    let RequestItem::Method(method) = &req.members[0].item else {
        panic!("expected method prototype");
    };
    assert!(method.body.is_none());
}

#[test]
fn patterns() {
    let program = parse(
        "fn f(): void {
            switch (c) {
                case _: break;
                case 42: break;
                case other: break;
                case Color::Blue(x, y): break;
                case Option[i32]::Some(v): break;
                default: break;
            }
        }",
    );
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!()
    };
    let Some(Stmt::Switch(switch)) = func.body.as_ref().map(|b| &b.statements[0]) else {
        panic!("expected switch");
    };
    assert!(matches!(switch.cases[0].pattern, Some(Pattern::Wildcard)));
    assert!(matches!(switch.cases[1].pattern, Some(Pattern::Literal(_))));
    assert!(matches!(
        switch.cases[2].pattern,
        Some(Pattern::Identifier(_))
    ));
    let Some(Pattern::Variant {
        enum_name,
        variant,
        sub_patterns,
    }) = &switch.cases[3].pattern
    else {
        panic!("expected variant pattern");
    };
    assert_eq!(enum_name, "Color");
    assert_eq!(variant, "Blue");
    assert_eq!(sub_patterns.len(), 2);

    // Generic variants fold the arguments into the written name.
    let Some(Pattern::Variant { enum_name, .. }) = &switch.cases[4].pattern else {
        panic!("expected variant pattern");
    };
    assert_eq!(enum_name, "Option[i32]");
    assert!(switch.cases[5].is_default);
}

#[test]
fn intrinsics() {
    let expr = first_expr("sizeof[i64]();");
    let ExprKind::Intrinsic { kind, type_arg, .. } = &expr.kind else {
        panic!("expected intrinsic");
    };
    assert_eq!(*kind, IntrinsicKind::Sizeof);
    assert_eq!(type_arg.clone().expect("type arg"), Type::i64());

    // The first offsetof argument is a bare member name.
    let expr = first_expr("offsetof[Point](x);");
    let ExprKind::Intrinsic { kind, args, .. } = &expr.kind else {
        panic!()
    };
    assert_eq!(*kind, IntrinsicKind::Offsetof);
    assert_eq!(args[0].as_ident(), Some("x"));
}

#[test]
fn else_if_desugars_to_nested_if() {
    let program = parse("fn f(): void { if (a) { } else if (b) { } else { } }");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!()
    };
    let Some(Stmt::If(if_stmt)) = func.body.as_ref().map(|b| &b.statements[0]) else {
        panic!("expected if");
    };
    let else_block = if_stmt.else_block.as_ref().expect("else block");
    assert!(matches!(else_block.statements[0], Stmt::If(_)));
}

#[test]
fn for_header_slots_are_optional() {
    let program = parse("fn f(): void { for (;;) { break; } }");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!()
    };
    let Some(Stmt::For(for_stmt)) = func.body.as_ref().map(|b| &b.statements[0]) else {
        panic!("expected for");
    };
    assert!(for_stmt.init.is_none());
    assert!(for_stmt.condition.is_none());
    assert!(for_stmt.step.is_none());
}

#[test]
fn import_forms() {
    let program = parse("import \"lib/math.veil\" as math;\nimport std::io;");
    let Stmt::Decl(Decl::Import(file_import)) = &program[0] else {
        panic!()
    };
    assert_eq!(file_import.path, "lib/math.veil");
    assert_eq!(file_import.alias, "math");
    assert!(!file_import.is_std);

    let Stmt::Decl(Decl::Import(std_import)) = &program[1] else {
        panic!()
    };
    assert!(std_import.is_std);
    assert_eq!(std_import.path, "std::io");
}

#[test]
fn pointer_and_array_types() {
    let program = parse("fn f(p: i32*, buf: u8[16]): void { }");
    let Stmt::Decl(Decl::Function(func)) = &program[0] else {
        panic!()
    };
    assert_eq!(func.params[0].ty, Type::pointer(Type::i32()));
    assert_eq!(func.params[1].ty, Type::array(Type::u8(), 16));
}

#[test]
fn first_error_carries_the_line() {
    let diag = parse_err("fn main(): void {\n    let x = ;\n}");
    assert_eq!(diag.line(), Some(2));
}

#[test]
fn unknown_token_is_rejected() {
    let diag = parse_err("fn main(): void { let x = @; }");
    assert!(diag.to_string().contains("unrecognized"));
}
