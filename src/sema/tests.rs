//! Semantic analysis unit tests.

use crate::ast::{Decl, Stmt};
use crate::parser::Parser;
use crate::sema::mono::mangle;
use crate::sema::{Sema, SemaError};
use crate::types::Type;

fn analyze(source: &str) -> Result<(Sema, Vec<Stmt>), SemaError> {
    let mut parser = Parser::new(source);
    let mut program = parser
        .parse_program()
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
    let mut sema = Sema::new();
    sema.analyze_program(&mut program)?;
    Ok((sema, program))
}

fn analyze_ok(source: &str) -> (Sema, Vec<Stmt>) {
    analyze(source).unwrap_or_else(|e| panic!("analysis failed: {e}"))
}

fn analyze_err(source: &str) -> SemaError {
    analyze(source).err().expect("expected an analysis error")
}

fn owned_function_names(sema: &Sema) -> Vec<String> {
    sema.owned_nodes()
        .iter()
        .filter_map(|node| match node {
            Stmt::Decl(Decl::Function(func)) => Some(func.name.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================
// Mangling
// ============================================================

#[test]
fn mangle_is_deterministic() {
    let args = vec![Type::i32(), Type::bool()];
    assert_eq!(mangle("Result", &args), "Result_i32_bool");
    assert_eq!(mangle("Result", &args), mangle("Result", &args));
}

#[test]
fn mangle_rewrites_pointers_and_brackets() {
    assert_eq!(mangle("Box", &[Type::pointer(Type::i8())]), "Box_i8Ptr");
    assert_eq!(
        mangle("Wrap", &[Type::named("Pair[i32, bool]")]),
        "Wrap_Pair_i32__bool_"
    );
}

// ============================================================
// Monomorphization
// ============================================================

#[test]
fn generic_function_monomorphizes_once() {
    let (sema, _) = analyze_ok(
        "fn id[T](x: T): T { return x; }
         fn main(): void {
             let a = id[i32](1);
             let b = id[i32](2);
             let c = id[bool](true);
         }",
    );
    let names = owned_function_names(&sema);
    assert_eq!(names.iter().filter(|n| *n == "id_i32").count(), 1);
    assert_eq!(names.iter().filter(|n| *n == "id_bool").count(), 1);
}

#[test]
fn monomorphization_is_idempotent() {
    let (mut sema, program) = analyze_ok("fn id[T](x: T): T { return x; }");
    let Stmt::Decl(Decl::Function(decl)) = &program[0] else {
        panic!("expected function");
    };
    let before = sema.owned_nodes().len();
    let (first_name, first_ty) = sema
        .monomorphize_function(decl, &[Type::i64()])
        .expect("first monomorphization");
    let after_first = sema.owned_nodes().len();
    let (second_name, second_ty) = sema
        .monomorphize_function(decl, &[Type::i64()])
        .expect("second monomorphization");

    assert_eq!(first_name, "id_i64");
    assert_eq!(first_name, second_name);
    assert_eq!(first_ty, second_ty);
    assert_eq!(after_first, before + 1);
    // The cache hit performs no extra work.
    assert_eq!(sema.owned_nodes().len(), after_first);
}

#[test]
fn generic_struct_monomorphizes_with_substituted_fields() {
    let (sema, _) = analyze_ok(
        "struct Point[T] { let x: T let y: T }
         fn main(): void {
             let p = Point[f64] { x: 1.5, y: 2.5 };
         }",
    );
    let ty = sema
        .symbol_table()
        .lookup_type("Point_f64")
        .expect("monomorphized type registered");
    let def = ty.as_struct().expect("struct type");
    assert_eq!(def.fields.len(), 2);
    assert!(def.fields.iter().all(|f| f.ty == Type::f64()));
}

#[test]
fn builtin_result_monomorphizes_on_demand() {
    let (sema, _) = analyze_ok(
        "fn f(): Result[i32, bool] {
             return Result::Ok(1);
         }",
    );
    let ty = sema
        .symbol_table()
        .lookup_type("Result_i32_bool")
        .expect("Result specialization registered");
    assert!(ty.is_enum());
}

#[test]
fn nested_generic_arguments_substitute_through_placeholders() {
    let (sema, _) = analyze_ok(
        "struct Box[T] { let value: T }
         struct Pair[T] { let first: Box[T] let second: T }
         fn main(): void {
             let p = Pair[i32] { first: Box[i32] { value: 1 }, second: 2 };
         }",
    );

    let pair = sema
        .symbol_table()
        .lookup_type("Pair_i32")
        .expect("Pair_i32 registered");
    let def = pair.as_struct().expect("struct type");
    assert_eq!(def.fields[0].ty.to_string(), "Box_i32");
    assert_eq!(def.fields[1].ty, Type::i32());

    let boxed = sema
        .symbol_table()
        .lookup_type("Box_i32")
        .expect("Box_i32 registered");
    let box_def = boxed.as_struct().expect("struct type");
    assert_eq!(box_def.fields[0].ty, Type::i32());

    // The parameter never leaks into a bogus specialization.
    assert!(sema.symbol_table().lookup_type("Box_T").is_none());
}

#[test]
fn self_referential_generic_aggregates_terminate() {
    let (sema, _) = analyze_ok(
        "struct Node[T] { let value: T let next: Node[T]* }
         fn main(): void {
             let n = Node[i32] { value: 1, next: malloc[Node[i32]]() };
         }",
    );

    let node = sema
        .symbol_table()
        .lookup_type("Node_i32")
        .expect("Node_i32 registered");
    let def = node.as_struct().expect("struct type");
    assert_eq!(def.fields.len(), 2);
    assert_eq!(def.fields[0].ty, Type::i32());
    assert_eq!(def.fields[1].ty.to_string(), "Node_i32*");
}

#[test]
fn malformed_member_specialization_is_rejected() {
    let err = analyze_err(
        "fn main(): void {
             let x = 1;
             x.missing[i32]();
         }",
    );
    assert!(
        err.to_string().contains("cannot specialize"),
        "unexpected error: {err}"
    );
}

#[test]
fn generic_arity_mismatch_is_rejected() {
    let err = analyze_err(
        "fn id[T](x: T): T { return x; }
         fn main(): void { let a = id[i32, bool](1); }",
    );
    assert!(matches!(err, SemaError::GenericArity(_)));
}

// ============================================================
// Requests
// ============================================================

#[test]
fn request_constraint_satisfied() {
    analyze_ok(
        "request class Printable {
             fn print(&self): void;
         }
         class Message {
             let text: i8*;
             Message(text: i8*) { }
             pub fn print(&self): void { }
         }
         fn show[T ? Printable](value: T): void { }
         fn main(): void {
             let m = Message(\"hi\");
             show[Message](m);
         }",
    );
}

#[test]
fn request_constraint_missing_method() {
    let err = analyze_err(
        "request class Printable {
             fn print(&self): void;
         }
         class Silent {
             let x: i32;
             Silent() { }
         }
         fn show[T ? Printable](value: T): void { }
         fn main(): void {
             let s = Silent();
             show[Silent](s);
         }",
    );
    match err {
        SemaError::ConstraintUnsatisfied { request, reason, .. } => {
            assert_eq!(request, "Printable");
            assert!(reason.contains("print"));
        }
        other => panic!("expected constraint failure, got {other}"),
    }
}

// ============================================================
// Move semantics
// ============================================================

#[test]
fn use_of_moved_variable_is_rejected() {
    let err = analyze_err(
        "struct D { let x: i32 }
         fn main(): void {
             let a = D { x: 10 };
             let b = a;
             let c = a;
         }",
    );
    assert!(matches!(err, SemaError::UseOfMoved(name) if name == "a"));
}

#[test]
fn reassignment_clears_the_move_mark() {
    analyze_ok(
        "struct D { let x: i32 }
         fn main(): void {
             let mut a = D { x: 10 };
             let b = a;
             a = D { x: 11 };
             let c = a;
         }",
    );
}

#[test]
fn copy_types_do_not_move() {
    analyze_ok(
        "fn main(): void {
             let a = 1;
             let b = a;
             let c = a;
         }",
    );
}

// ============================================================
// Typing rules
// ============================================================

#[test]
fn binary_operands_must_match() {
    let err = analyze_err("fn main(): void { let x = 1 + 1.5; }");
    assert!(matches!(err, SemaError::TypeMismatch { .. }));
}

#[test]
fn comparison_yields_bool() {
    analyze_ok("fn main(): void { let b: bool = 1 < 2; }");
}

#[test]
fn literal_suffix_overrides_default_width() {
    let err = analyze_err("fn main(): void { let x: i32 = 1i64; }");
    assert!(matches!(err, SemaError::TypeMismatch { .. }));
    analyze_ok("fn main(): void { let x: i64 = 1i64; }");
}

#[test]
fn conditions_must_be_bool() {
    let err = analyze_err("fn main(): void { if (1) { } }");
    assert!(matches!(err, SemaError::NonBoolCondition(_)));
}

#[test]
fn break_and_continue_placement() {
    assert!(matches!(
        analyze_err("fn main(): void { break; }"),
        SemaError::BreakOutside
    ));
    assert!(matches!(
        analyze_err("fn main(): void { continue; }"),
        SemaError::ContinueOutside
    ));
    analyze_ok("fn main(): void { while (true) { break; } }");
}

#[test]
fn return_type_is_checked() {
    let err = analyze_err("fn f(): i32 { return true; }");
    assert!(matches!(err, SemaError::TypeMismatch { .. }));
}

#[test]
fn assignment_needs_a_mutable_place() {
    assert!(matches!(
        analyze_err("fn main(): void { let x = 1; x = 2; }"),
        SemaError::AssignToImmutable(_)
    ));
    assert!(matches!(
        analyze_err("fn main(): void { 1 = 2; }"),
        SemaError::InvalidAssignTarget
    ));
    analyze_ok("fn main(): void { let mut x = 1; x = 2; }");
}

#[test]
fn call_arguments_are_checked_strictly() {
    let err = analyze_err(
        "fn f(a: i32): i32 { return a; }
         fn main(): void { let x = f(true); }",
    );
    assert!(matches!(err, SemaError::ArgumentType { .. }));

    let err = analyze_err(
        "fn f(a: i32): i32 { return a; }
         fn main(): void { let x = f(1, 2); }",
    );
    assert!(matches!(err, SemaError::ArgumentCount { .. }));
}

#[test]
fn variadic_calls_accept_extra_arguments() {
    analyze_ok(
        "extern fn printf(fmt: i8*, ...): i32;
         fn main(): void { printf(\"%d %d\", 1, 2); }",
    );
}

#[test]
fn struct_literal_requires_every_field_once() {
    let err = analyze_err(
        "struct P { let x: i32 let y: i32 }
         fn main(): void { let p = P { x: 1 }; }",
    );
    assert!(err.to_string().contains("field count mismatch"));

    let err = analyze_err(
        "struct P { let x: i32 let y: i32 }
         fn main(): void { let p = P { x: 1, z: 2 }; }",
    );
    assert!(err.to_string().contains("missing field 'y'"));
}

#[test]
fn indexing_rules() {
    analyze_ok("fn main(): void { let a: i32[3] = [1, 2, 3]; let x: i32 = a[(0)]; }");
    assert!(matches!(
        analyze_err("fn main(): void { let x = 1; let y = x[(0)]; }"),
        SemaError::NotIndexable(_)
    ));
}

#[test]
fn deref_requires_pointer() {
    assert!(matches!(
        analyze_err("fn main(): void { let x = 1; let y = *x; }"),
        SemaError::NotAPointer(_)
    ));
}

#[test]
fn undefined_names_are_rejected() {
    assert!(matches!(
        analyze_err("fn main(): void { let x = missing; }"),
        SemaError::UndefinedIdentifier(_)
    ));
}

#[test]
fn private_class_members_are_protected() {
    let err = analyze_err(
        "class C {
             let secret: i32;
             C() { }
         }
         fn main(): void {
             let c = C();
             let x = c.secret;
         }",
    );
    assert!(matches!(err, SemaError::PrivateAccess { .. }));
}

#[test]
fn public_class_members_are_visible() {
    analyze_ok(
        "class C {
             pub let open: i32;
             C() { }
         }
         fn main(): void {
             let c = C();
             let x = c.open;
         }",
    );
}

// ============================================================
// `?` propagation
// ============================================================

#[test]
fn question_requires_result_context() {
    let err = analyze_err(
        "fn g(): Result[i32, bool] { return Result::Ok(1); }
         fn f(): i32 {
             let x = g()?;
             return x;
         }",
    );
    assert!(matches!(err, SemaError::InvalidQuestion(_)));
}

#[test]
fn question_error_types_must_agree() {
    let err = analyze_err(
        "fn g(): Result[i32, bool] { return Result::Ok(1); }
         fn f(): Result[i32, i64] {
             let x = g()?;
             return Result::Ok(x);
         }",
    );
    assert!(matches!(err, SemaError::InvalidQuestion(_)));
}

#[test]
fn question_yields_the_ok_type() {
    analyze_ok(
        "fn g(): Result[i32, bool] { return Result::Ok(7); }
         fn f(): Result[i32, bool] {
             let x: i32 = g()?;
             return Result::Ok(x);
         }",
    );
}

// ============================================================
// Patterns
// ============================================================

#[test]
fn variant_patterns_bind_payload_elements() {
    analyze_ok(
        "enum Color { Red, Green, Blue(i32, i32) }
         fn main(): void {
             let c = Blue(1, 2);
             switch (c) {
                 case Color::Blue(x, y): {
                     let sum: i32 = x + y;
                 }
                 default: break;
             }
         }",
    );
}

#[test]
fn variant_pattern_arity_is_checked() {
    let err = analyze_err(
        "enum Color { Red, Blue(i32, i32) }
         fn main(): void {
             let c = Blue(1, 2);
             switch (c) {
                 case Color::Blue(x): break;
             }
         }",
    );
    assert!(matches!(err, SemaError::ArgumentCount { .. }));
}

#[test]
fn generic_variant_pattern_matches_mangled_scrutinee() {
    analyze_ok(
        "fn main(): void {
             let r: Result[i32, bool] = Result::Ok(1);
             switch (r) {
                 case Result[i32, bool]::Ok(v): {
                     let x: i32 = v;
                 }
                 case Result::Err(e): break;
             }
         }",
    );
}

#[test]
fn literal_pattern_type_must_match() {
    let err = analyze_err(
        "fn main(): void {
             let x = 1;
             switch (x) {
                 case true: break;
             }
         }",
    );
    assert!(matches!(err, SemaError::TypeMismatch { .. }));
}

// ============================================================
// Scoping
// ============================================================

#[test]
fn duplicate_declarations_in_scope() {
    assert!(matches!(
        analyze_err("fn main(): void { let x = 1; let x = 2; }"),
        SemaError::Redefinition(_)
    ));
    // Shadowing in a nested scope is allowed.
    analyze_ok("fn main(): void { let x = 1; { let x = true; } }");
}

#[test]
fn result_is_available_without_import() {
    let (sema, _) = analyze_ok("fn main(): void { }");
    assert!(sema.symbol_table().lookup_type("Result").is_some());
}
