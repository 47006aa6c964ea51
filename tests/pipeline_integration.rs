//! End-to-end pipeline tests: source text through lexing, parsing, semantic
//! analysis, monomorphization, and MIR lowering, with assertions over the
//! produced MIR.

use std::path::Path;

use veilc::mir::types::{Function, Inst, Module};
use veilc::types::Type;
use veilc::CompiledUnit;

fn compile(source: &str) -> CompiledUnit {
    veilc::compile_to_mir(source, Path::new("."))
        .unwrap_or_else(|e| panic!("compile failed: {e}"))
}

fn compile_err(source: &str) -> veilc::Diagnostic {
    veilc::compile_to_mir(source, Path::new("."))
        .err()
        .expect("expected a compile error")
}

fn function<'m>(module: &'m Module, name: &str) -> &'m Function {
    module
        .find_function(name)
        .unwrap_or_else(|| panic!("function '{name}' not in module"))
}

// ============================================================
// S1: Result desugaring
// ============================================================

#[test]
fn result_question_desugars_to_tag_test_and_early_return() {
    let unit = compile(
        "fn g(): Result[i32, bool] {
             return Result::Ok(7);
         }
         fn f(): Result[i32, bool] {
             let x = g()?;
             return Result::Ok(x);
         }",
    );
    let f = function(&unit.module, "f");
    assert!(f.blocks.len() >= 4, "expected ok/err/merge blocks");

    // The ok path extracts payload element 0 of variant 0.
    assert!(f.instructions().any(|inst| matches!(
        inst,
        Inst::VariantExtract { tag: 0, index: 0, .. }
    )));

    // The err path returns the original Result unchanged.
    let err_block = f
        .blocks
        .iter()
        .find(|b| b.name.starts_with("q.err"))
        .expect("err block");
    assert!(matches!(
        err_block.instructions.last(),
        Some(Inst::Ret { value: Some(_) })
    ));

    // A merge block exists and is branched to from the ok path.
    let ok_block = f
        .blocks
        .iter()
        .find(|b| b.name.starts_with("q.ok"))
        .expect("ok block");
    let merge_name = match ok_block.instructions.last() {
        Some(Inst::Br { target }) => target.clone(),
        other => panic!("ok block should jump to merge, ends with {other:?}"),
    };
    assert!(f.find_block(&merge_name).is_some());

    // The discriminant is loaded and compared before branching.
    assert!(f.instructions().any(|inst| matches!(inst, Inst::VariantTag { .. })));
}

// ============================================================
// S2: generic struct + field access
// ============================================================

#[test]
fn generic_struct_monomorphizes_and_field_access_geps() {
    let unit = compile(
        "struct Point[T] { let x: T let y: T }
         extern fn printf(fmt: i8*, ...): i32;
         fn main(): i32 {
             let p = Point[f64] { x: 1.1, y: 2.2 };
             printf(\"%f\", p.x);
             return 0;
         }",
    );

    let point = unit
        .types
        .structs
        .get("Point_f64")
        .expect("monomorphized Point_f64 in the type table");
    let def = point.as_struct().expect("struct type");
    assert_eq!(def.fields.len(), 2);
    assert!(def.fields.iter().all(|f| f.ty == Type::f64()));

    let main = function(&unit.module, "main");
    assert!(main.instructions().any(|inst| matches!(
        inst,
        Inst::StructGep { struct_name, field, .. }
            if struct_name == "Point_f64" && field == "x"
    )));
}

// ============================================================
// S3: enum construction + match
// ============================================================

#[test]
fn enum_construction_and_variant_match() {
    let unit = compile(
        "enum Color { Red, Green, Blue(i32, i32) }
         fn main(): i32 {
             let c = Blue(10, 20);
             switch (c) {
                 case Color::Red: return 1;
                 case Color::Green: return 2;
                 case Color::Blue(x, y): return x + y;
             }
             return 0;
         }",
    );
    let main = function(&unit.module, "main");

    // Construction writes tag 2 with both payload values.
    assert!(main.instructions().any(|inst| matches!(
        inst,
        Inst::VariantData { tag: 2, args, .. } if args.len() == 2
    )));

    // The Blue case extracts both payload elements into fresh slots.
    let extracts = main
        .instructions()
        .filter(|inst| matches!(inst, Inst::VariantExtract { tag: 2, .. }))
        .count();
    assert_eq!(extracts, 2);

    // Case selection compares the loaded tag.
    assert!(main.instructions().any(|inst| matches!(inst, Inst::VariantTag { .. })));
}

// ============================================================
// S4: ownership error
// ============================================================

#[test]
fn use_after_move_is_rejected() {
    let diag = compile_err(
        "struct D { let x: i32 }
         fn main(): void {
             let a = D { x: 10 };
             let b = a;
             let c = a;
         }",
    );
    assert!(
        diag.to_string().contains("use of moved variable: a"),
        "unexpected diagnostic: {diag}"
    );
}

// ============================================================
// S5: module visibility
// ============================================================

#[test]
fn private_module_types_are_invisible() {
    let dir = std::env::temp_dir().join(format!("veilc-s5-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create test dir");
    std::fs::write(dir.join("lib.veil"), "struct S { let x: i32 }\n").expect("write lib");

    let source = "import \"lib.veil\";
         fn main(): void {
             let s = lib::S { x: 1 };
         }";
    let diag = veilc::compile_to_mir(source, &dir)
        .err()
        .expect("private type must be invisible");
    assert!(
        diag.to_string().contains("no public member named 'S'"),
        "unexpected diagnostic: {diag}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn public_module_members_link_with_mangled_names() {
    let dir = std::env::temp_dir().join(format!("veilc-import-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create test dir");
    std::fs::write(
        dir.join("mathlib.veil"),
        "pub fn add(a: i32, b: i32): i32 { return a + b; }\n",
    )
    .expect("write lib");

    let source = "import \"mathlib.veil\";
         fn main(): i32 {
             return mathlib::add(1, 2);
         }";
    let unit = veilc::compile_to_mir(source, &dir).expect("import compiles");

    // The imported function links under its module-prefixed name and the
    // call site targets it.
    assert!(unit.module.find_function("mathlib_add").is_some());
    let main = function(&unit.module, "main");
    assert!(main.instructions().any(|inst| matches!(
        inst,
        Inst::Call { callee, .. } if callee == "mathlib_add"
    )));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn use_decl_aliases_a_public_member() {
    let dir = std::env::temp_dir().join(format!("veilc-use-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create test dir");
    std::fs::write(
        dir.join("mathlib.veil"),
        "pub fn add(a: i32, b: i32): i32 { return a + b; }\n",
    )
    .expect("write lib");

    let source = "import \"mathlib.veil\";
         use mathlib::add as plus;
         fn main(): i32 {
             let x: i32 = plus(1, 2);
             return x;
         }";
    veilc::compile_to_mir(source, &dir).expect("use alias compiles");

    let _ = std::fs::remove_dir_all(&dir);
}

// ============================================================
// S6: `[` disambiguation through the whole pipeline
// ============================================================

#[test]
fn indexing_and_specialization_disambiguate() {
    let unit = compile(
        "fn add[T](a: T, b: T): T { return a + b; }
         fn main(): i32 {
             let mut buf: i32[3] = [1, 2, 3];
             buf[0] = 9;
             return add[i32](buf[0], buf[1]);
         }",
    );

    assert!(unit.module.find_function("add_i32").is_some());
    let main = function(&unit.module, "main");
    assert!(main
        .instructions()
        .any(|inst| matches!(inst, Inst::ArrayGep { .. })));
    assert!(main.instructions().any(|inst| matches!(
        inst,
        Inst::Call { callee, .. } if callee == "add_i32"
    )));
}

// ============================================================
// S7: destructor order
// ============================================================

#[test]
fn destructors_run_innermost_scope_first() {
    let unit = compile(
        "class Res {
             let id: i32;
             Res(id: i32) { }
             ~Res(&self): void { }
         }
         fn main(): void {
             let f = Res(1);
             {
                 let f2 = Res(2);
             }
         }",
    );
    let main = function(&unit.module, "main");
    let dtor_args: Vec<String> = main
        .instructions()
        .filter_map(|inst| match inst {
            Inst::Call { callee, args, .. } if callee == "Res_~Res" => {
                Some(args[0].clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(dtor_args, vec!["%f2".to_string(), "%f".to_string()]);
}

#[test]
fn destructors_run_before_early_returns() {
    let unit = compile(
        "class Res {
             Res() { }
             ~Res(&self): void { }
         }
         fn main(): i32 {
             let guard = Res();
             if (true) {
                 return 1;
             }
             return 0;
         }",
    );
    let main = function(&unit.module, "main");
    // Every return is preceded (in its block) by the destructor call.
    for block in &main.blocks {
        let Some(Inst::Ret { .. }) = block.instructions.last() else {
            continue;
        };
        assert!(
            block.instructions.iter().any(|inst| matches!(
                inst,
                Inst::Call { callee, .. } if callee == "Res_~Res"
            )),
            "return in {} without destructor",
            block.name
        );
    }
}

// ============================================================
// Classes and methods end to end
// ============================================================

#[test]
fn methods_lower_to_mangled_functions_with_self() {
    let unit = compile(
        "class Counter {
             let count: i32;
             Counter(start: i32) { self.count = start; }
             pub fn get(&self): i32 { return self.count; }
         }
         fn main(): i32 {
             let c = Counter(5);
             return c.get();
         }",
    );

    assert!(unit.module.find_function("Counter_Counter").is_some());
    let get = function(&unit.module, "Counter_get");
    assert_eq!(get.params[0].0, "self");

    // The call site passes the object's slot as the implicit receiver.
    let main = function(&unit.module, "main");
    let receiver = main
        .instructions()
        .find_map(|inst| match inst {
            Inst::Call { callee, args, .. } if callee == "Counter_get" => Some(args[0].clone()),
            _ => None,
        })
        .expect("method call");
    assert_eq!(receiver, "%c");
}

#[test]
fn generic_class_with_generic_method() {
    let unit = compile(
        "class Holder[T] {
             let value: T;
             Holder(value: T) { }
             pub fn get(&self): T { return self.value; }
         }
         fn main(): i32 {
             let h = Holder[i32](7);
             return h.get();
         }",
    );
    assert!(unit.module.find_function("Holder_i32_Holder_i32").is_some()
        || unit.module.find_function("Holder_i32_Holder").is_some());
    assert!(unit.module.find_function("Holder_i32_get").is_some());
}

// ============================================================
// Miscellaneous pipeline properties
// ============================================================

#[test]
fn assignment_yields_its_right_operand() {
    let unit = compile(
        "fn main(): i32 {
             let mut a = 0;
             let mut b = 0;
             a = b = 3;
             return a;
         }",
    );
    // `b = 3` stores into %b, and its value feeds the store into %a.
    let main = function(&unit.module, "main");
    let stores = main
        .instructions()
        .filter(|inst| matches!(inst, Inst::Store { .. }))
        .count();
    assert!(stores >= 4, "param-free main still stores init + chain");
}

#[test]
fn nested_generics_monomorphize_recursively() {
    let unit = compile(
        "struct Box[T] { let value: T }
         fn main(): i32 {
             let b = Box[Box[i32]] { value: Box[i32] { value: 3 } };
             return 0;
         }",
    );
    assert!(unit.types.structs.contains_key("Box_i32"));
    assert!(unit
        .types
        .structs
        .keys()
        .any(|name| name.starts_with("Box_Box_i32")));
}

#[test]
fn string_literals_are_i8_pointers() {
    let unit = compile(
        "extern fn puts(s: i8*): i32;
         fn main(): i32 {
             puts(\"hello\");
             return 0;
         }",
    );
    let main = function(&unit.module, "main");
    assert!(main.instructions().any(|inst| matches!(
        inst,
        Inst::ConstString { value, .. } if value == "hello"
    )));
}
