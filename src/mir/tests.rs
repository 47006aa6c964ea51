//! MIR construction unit tests.

use crate::compile_to_mir;
use crate::mir::types::{Function, Inst, Module};
use std::path::Path;

fn lower(source: &str) -> Module {
    compile_to_mir(source, Path::new("."))
        .unwrap_or_else(|e| panic!("compile failed: {e}"))
        .module
}

fn function<'m>(module: &'m Module, name: &str) -> &'m Function {
    module
        .find_function(name)
        .unwrap_or_else(|| panic!("function '{name}' not in module"))
}

/// Every block of every lowered body ends in exactly one terminator.
fn assert_terminator_law(module: &Module) {
    for func in &module.functions {
        for block in &func.blocks {
            assert!(
                block.has_terminator(),
                "{}::{} lacks a terminator",
                func.name,
                block.name
            );
            let terminators = block
                .instructions
                .iter()
                .filter(|inst| inst.is_terminator())
                .count();
            assert_eq!(
                terminators, 1,
                "{}::{} has {terminators} terminators",
                func.name, block.name
            );
        }
    }
}

#[test]
fn terminator_law_over_control_flow() {
    let module = lower(
        "fn main(): i32 {
             let mut total = 0;
             for (let mut i = 0; i < 10; i = i + 1) {
                 if (i == 5) {
                     continue;
                 }
                 total = total + i;
             }
             while (total > 100) {
                 total = total - 1;
             }
             do {
                 total = total + 1;
             } while (total < 3);
             return total;
         }",
    );
    assert_terminator_law(&module);
}

#[test]
fn block_names_are_unique_per_function() {
    let module = lower(
        "fn main(): i32 {
             if (true) { } else { }
             if (false) { } else { }
             return 0;
         }",
    );
    let func = function(&module, "main");
    let mut names = std::collections::HashSet::new();
    for block in &func.blocks {
        assert!(names.insert(block.name.clone()), "duplicate block {}", block.name);
    }
}

#[test]
fn params_spill_to_stack_slots() {
    let module = lower("fn add(a: i32, b: i32): i32 { return a + b; }");
    let func = function(&module, "add");
    let entry = func.entry_block().expect("entry block");
    assert!(matches!(&entry.instructions[0], Inst::Alloca { dest, .. } if dest == "%a.addr"));
    assert!(matches!(&entry.instructions[1], Inst::Store { src, dest } if src == "%a" && dest == "%a.addr"));
}

#[test]
fn implicit_returns() {
    let module = lower(
        "fn nothing(): void { }
         fn zero(): i32 { let x = 1; }",
    );
    let nothing = function(&module, "nothing");
    assert!(matches!(
        nothing.blocks[0].instructions.last(),
        Some(Inst::Ret { value: None })
    ));
    let zero = function(&module, "zero");
    assert!(matches!(
        zero.blocks[0].instructions.last(),
        Some(Inst::Ret { value: Some(_) })
    ));
}

#[test]
fn assignment_stores_through_the_place() {
    let module = lower(
        "fn main(): i32 {
             let mut x = 1;
             x = 2;
             return x;
         }",
    );
    let func = function(&module, "main");
    let stores = func
        .instructions()
        .filter(|inst| matches!(inst, Inst::Store { dest, .. } if dest == "%x"))
        .count();
    assert_eq!(stores, 2, "initialization plus re-assignment");
}

#[test]
fn shadowed_bindings_restore_on_scope_exit() {
    let module = lower(
        "fn main(): i32 {
             let mut x = 1;
             {
                 let x = true;
             }
             x = 2;
             return x;
         }",
    );
    let func = function(&module, "main");
    // The inner `x` gets a distinct slot; the final store targets the
    // original one again.
    let allocas: Vec<&str> = func
        .instructions()
        .filter_map(|inst| match inst {
            Inst::Alloca { dest, .. } if dest.starts_with("%x") => Some(dest.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(allocas.len(), 2);
    assert_ne!(allocas[0], allocas[1]);
    let last_store = func
        .instructions()
        .filter_map(|inst| match inst {
            Inst::Store { dest, .. } => Some(dest.clone()),
            _ => None,
        })
        .last()
        .expect("a store");
    assert_eq!(last_store, "%x");
}

#[test]
fn extern_functions_have_no_body() {
    let module = lower("extern fn puts(s: i8*): i32;");
    let func = function(&module, "puts");
    assert!(func.blocks.is_empty());
}

#[test]
fn malloc_and_free_are_recorded_as_externals() {
    let unit = compile_to_mir(
        "fn main(): void {
             let p = malloc[i32]();
             free(p);
         }",
        Path::new("."),
    )
    .expect("compiles");
    assert_eq!(unit.used_externals, vec!["free", "malloc"]);
}

#[test]
fn intrinsics_lower_to_dedicated_instructions() {
    let module = lower(
        "struct P { let x: i32 let y: i32 }
         fn main(): i64 {
             let a = sizeof[P]();
             let b = alignof[i64]();
             let c = offsetof[P](y);
             return a + b + c;
         }",
    );
    let func = function(&module, "main");
    assert!(func.instructions().any(|i| matches!(i, Inst::Sizeof { .. })));
    assert!(func.instructions().any(|i| matches!(i, Inst::Alignof { .. })));
    assert!(func
        .instructions()
        .any(|i| matches!(i, Inst::Offsetof { field, .. } if field == "y")));
}

#[test]
fn break_in_switch_jumps_to_end_and_continue_is_rejected() {
    let module = lower(
        "fn main(): i32 {
             let x = 1;
             switch (x) {
                 case 1: break;
                 default: break;
             }
             return 0;
         }",
    );
    assert_terminator_law(&module);

    let err = compile_to_mir(
        "fn main(): void {
             let x = 1;
             while (true) {
                 switch (x) {
                     case 1: continue;
                 }
             }
         }",
        Path::new("."),
    )
    .expect_err("continue in switch must be rejected");
    assert!(err.to_string().contains("continue inside a switch"));
}
