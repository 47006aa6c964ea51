//! Mid-level intermediate representation.
//!
//! The MIR is a typed three-address representation organized into functions
//! and named basic blocks with explicit control-flow terminators. It is
//! produced by [`lowering::MirBuilder`] from the analyzed AST and consumed
//! by the external code generator.
//!
//! - [`types`] - instructions, blocks, functions, module
//! - [`lowering`] - AST to MIR lowering
//! - [`validate`] - well-formedness checks run before handing off

pub mod lowering;
pub mod types;
pub mod validate;

#[cfg(test)]
mod tests;

pub use lowering::MirBuilder;
pub use types::{BasicBlock, Function, Inst, Module};
pub use validate::{validate_module, ValidationResults};
