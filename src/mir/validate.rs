//! MIR validation pass.
//!
//! Checks lowered functions for well-formedness before handing the module
//! to the code generator, so malformed MIR fails here with a clear
//! diagnostic instead of producing cryptic backend errors.

use std::collections::HashSet;

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::mir::types::{Function, Module};

/// Results from MIR validation.
pub struct ValidationResults {
    /// Fatal problems that would make the code generator fail or produce
    /// wrong code.
    pub errors: Vec<Diagnostic>,
    /// Non-fatal oddities, e.g. an unreferenced merge block left behind by
    /// control flow where every path returned.
    pub warnings: Vec<Diagnostic>,
}

impl ValidationResults {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate every function of a module.
pub fn validate_module(module: &Module) -> ValidationResults {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for function in &module.functions {
        validate_function(function, &mut errors, &mut warnings);
    }
    ValidationResults { errors, warnings }
}

fn validate_function(func: &Function, errors: &mut Vec<Diagnostic>, warnings: &mut Vec<Diagnostic>) {
    // Functions without blocks are external declarations.
    if func.blocks.is_empty() {
        return;
    }

    let block_names: HashSet<&str> = func.blocks.iter().map(|b| b.name.as_str()).collect();

    // Check 1: every block ends in exactly one terminator, and nothing
    // follows a terminator.
    for block in &func.blocks {
        if !block.has_terminator() {
            errors.push(
                Diagnostic::error(format!(
                    "function '{}': block '{}' does not end in a terminator",
                    func.name, block.name
                ))
                .with_code(ErrorCode::MalformedMir),
            );
        }
        for inst in block.instructions.iter().rev().skip(1) {
            if inst.is_terminator() {
                errors.push(
                    Diagnostic::error(format!(
                        "function '{}': block '{}' has a terminator before its last instruction",
                        func.name, block.name
                    ))
                    .with_code(ErrorCode::MalformedMir),
                );
            }
        }
    }

    // Check 2: branch targets name existing blocks.
    for block in &func.blocks {
        for inst in &block.instructions {
            for target in inst.branch_targets() {
                if !block_names.contains(target) {
                    errors.push(
                        Diagnostic::error(format!(
                            "function '{}': block '{}' branches to unknown block '{}'",
                            func.name, block.name, target
                        ))
                        .with_code(ErrorCode::MalformedMir),
                    );
                }
            }
        }
    }

    // Check 3: destination and parameter names are unique.
    let mut defined: HashSet<String> = HashSet::new();
    for (name, _) in &func.params {
        if !defined.insert(format!("%{name}")) {
            errors.push(
                Diagnostic::error(format!(
                    "function '{}': duplicate parameter name '{}'",
                    func.name, name
                ))
                .with_code(ErrorCode::MalformedMir),
            );
        }
    }
    for inst in func.instructions() {
        if let Some(dest) = inst.dest() {
            if !defined.insert(dest.to_string()) {
                errors.push(
                    Diagnostic::error(format!(
                        "function '{}': duplicate destination '{}'",
                        func.name, dest
                    ))
                    .with_code(ErrorCode::MalformedMir),
                );
            }
        }
    }

    // Check 4: operands are a parameter or produced earlier in layout
    // order.
    let mut seen: HashSet<String> = func
        .params
        .iter()
        .map(|(name, _)| format!("%{name}"))
        .collect();
    for block in &func.blocks {
        for inst in &block.instructions {
            for operand in inst.operands() {
                if operand.is_empty() {
                    continue;
                }
                if !seen.contains(operand) {
                    errors.push(
                        Diagnostic::error(format!(
                            "function '{}': block '{}' uses '{}' before it is defined",
                            func.name, block.name, operand
                        ))
                        .with_code(ErrorCode::MalformedMir),
                    );
                }
            }
            if let Some(dest) = inst.dest() {
                seen.insert(dest.to_string());
            }
        }
    }

    // Check 5: no unsubstituted type parameter survives into a carried
    // type; monomorphization must have replaced them all before lowering.
    for (name, ty) in &func.params {
        if ty.contains_param() {
            errors.push(
                Diagnostic::error(format!(
                    "function '{}': parameter '{}' has unsubstituted type \
                     parameter in {}; monomorphization incomplete",
                    func.name, name, ty
                ))
                .with_code(ErrorCode::MalformedMir),
            );
        }
    }
    if func.return_type.contains_param() {
        errors.push(
            Diagnostic::error(format!(
                "function '{}': return type {} has an unsubstituted type \
                 parameter; monomorphization incomplete",
                func.name, func.return_type
            ))
            .with_code(ErrorCode::MalformedMir),
        );
    }
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Some(ty) = inst.carried_type() {
                if ty.contains_param() {
                    errors.push(
                        Diagnostic::error(format!(
                            "function '{}': block '{}' carries unsubstituted \
                             type parameter in {}; monomorphization incomplete",
                            func.name, block.name, ty
                        ))
                        .with_code(ErrorCode::MalformedMir),
                    );
                }
            }
        }
    }

    // Check 6: every non-entry block is referenced by some branch. Control
    // flow where every path returned can leave an untargeted merge block
    // behind; that is worth a warning, not an error.
    let mut referenced: HashSet<&str> = HashSet::new();
    for inst in func.instructions() {
        for target in inst.branch_targets() {
            referenced.insert(target);
        }
    }
    for block in func.blocks.iter().skip(1) {
        if !referenced.contains(block.name.as_str()) {
            warnings.push(Diagnostic::warning(format!(
                "function '{}': block '{}' is not referenced by any branch",
                func.name, block.name
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;
    use crate::mir::types::{BasicBlock, Inst};
    use crate::types::Type;

    fn simple_function() -> Function {
        let mut func = Function::new("f", Type::i32());
        func.params.push(("x".to_string(), Type::i32()));
        let mut entry = BasicBlock::new("entry.0");
        entry.push(Inst::Alloca {
            dest: "%x.addr".into(),
            ty: Type::i32(),
        });
        entry.push(Inst::Store {
            src: "%x".into(),
            dest: "%x.addr".into(),
        });
        entry.push(Inst::Load {
            dest: "%t0".into(),
            src: "%x.addr".into(),
        });
        entry.push(Inst::Ret {
            value: Some("%t0".into()),
        });
        func.blocks.push(entry);
        func
    }

    #[test]
    fn well_formed_function_passes() {
        let mut module = Module::new();
        module.push(simple_function());
        let results = validate_module(&module);
        assert!(results.is_ok(), "unexpected errors: {:?}", results.errors);
        assert!(results.warnings.is_empty());
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let mut func = simple_function();
        func.blocks[0].instructions.pop();
        let mut module = Module::new();
        module.push(func);
        let results = validate_module(&module);
        assert!(!results.is_ok());
    }

    #[test]
    fn duplicate_destination_is_an_error() {
        let mut func = simple_function();
        func.blocks[0].instructions.insert(
            3,
            Inst::Load {
                dest: "%t0".into(),
                src: "%x.addr".into(),
            },
        );
        let mut module = Module::new();
        module.push(func);
        let results = validate_module(&module);
        assert!(!results.is_ok());
    }

    #[test]
    fn undefined_operand_is_an_error() {
        let mut func = simple_function();
        func.blocks[0].instructions.insert(
            2,
            Inst::BinOp {
                dest: "%t9".into(),
                left: "%missing".into(),
                right: "%x".into(),
                op: TokenKind::Plus,
            },
        );
        let mut module = Module::new();
        module.push(func);
        let results = validate_module(&module);
        assert!(!results.is_ok());
    }

    #[test]
    fn unknown_branch_target_is_an_error() {
        let mut func = simple_function();
        func.blocks[0].instructions.pop();
        func.blocks[0].push(Inst::Br {
            target: "nowhere.9".into(),
        });
        let mut module = Module::new();
        module.push(func);
        let results = validate_module(&module);
        assert!(!results.is_ok());
    }

    #[test]
    fn leaked_type_parameters_are_errors() {
        let mut func = simple_function();
        func.blocks[0].instructions.insert(
            0,
            Inst::Alloca {
                dest: "%leak".into(),
                ty: Type::param("T"),
            },
        );
        let mut module = Module::new();
        module.push(func);
        let results = validate_module(&module);
        assert!(!results.is_ok());
        assert!(results
            .errors
            .iter()
            .any(|e| e.to_string().contains("monomorphization incomplete")));
    }

    #[test]
    fn extern_declarations_are_skipped() {
        let mut module = Module::new();
        let mut func = Function::new("printf", Type::i32());
        func.is_variadic = true;
        module.push(func);
        assert!(validate_module(&module).is_ok());
    }
}
