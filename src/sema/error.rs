//! Semantic analysis errors.

use thiserror::Error;

use crate::diagnostics::{Diagnostic, ErrorCode};

/// Errors raised during semantic analysis. Analysis stops at the first one.
#[derive(Debug, Clone, Error)]
pub enum SemaError {
    #[error("undefined identifier: {0}")]
    UndefinedIdentifier(String),

    #[error("undefined type: {0}")]
    UndefinedType(String),

    #[error("redefinition of '{0}'")]
    Redefinition(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("module '{module}' has no public member named '{member}'")]
    NoSuchModuleMember { module: String, member: String },

    #[error("type mismatch in {context}: expected {expected}, got {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("condition must be of type bool, got {0}")]
    NonBoolCondition(String),

    #[error("use of moved variable: {0}")]
    UseOfMoved(String),

    #[error("cannot assign to immutable variable '{0}'")]
    AssignToImmutable(String),

    #[error("invalid assignment target")]
    InvalidAssignTarget,

    #[error("argument count mismatch: expected {expected}, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {index} type mismatch: expected {expected}, got {found}")]
    ArgumentType {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("called object is not a function: {0}")]
    NotCallable(String),

    #[error("cannot index non-array/pointer type: {0}")]
    NotIndexable(String),

    #[error("array index must be an integer, got {0}")]
    NonIntegerIndex(String),

    #[error("cannot dereference non-pointer type: {0}")]
    NotAPointer(String),

    #[error("{op} requires {expected} operand, got {found}")]
    InvalidOperand {
        op: String,
        expected: String,
        found: String,
    },

    #[error("break statement outside of loop or switch")]
    BreakOutside,

    #[error("continue statement outside of loop")]
    ContinueOutside,

    #[error("cannot access private {what} '{member}' of '{owner}'")]
    PrivateAccess {
        what: String,
        member: String,
        owner: String,
    },

    #[error("generic argument count mismatch for {0}")]
    GenericArity(String),

    #[error("unknown request constraint '{0}'")]
    UnknownRequest(String),

    #[error("type '{ty}' does not satisfy request '{request}': {reason}")]
    ConstraintUnsatisfied {
        ty: String,
        request: String,
        reason: String,
    },

    #[error("{0}")]
    InvalidQuestion(String),

    #[error("{0}")]
    Other(String),
}

impl SemaError {
    fn code(&self) -> ErrorCode {
        match self {
            SemaError::UndefinedIdentifier(_) => ErrorCode::UndefinedIdentifier,
            SemaError::UndefinedType(_) => ErrorCode::UndefinedType,
            SemaError::Redefinition(_) => ErrorCode::DuplicateDefinition,
            SemaError::UnknownModule(_) | SemaError::NoSuchModuleMember { .. } => {
                ErrorCode::UnknownModule
            }
            SemaError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            SemaError::NonBoolCondition(_) => ErrorCode::NonBoolCondition,
            SemaError::UseOfMoved(_) => ErrorCode::UseOfMoved,
            SemaError::AssignToImmutable(_) | SemaError::InvalidAssignTarget => {
                ErrorCode::InvalidOperand
            }
            SemaError::ArgumentCount { .. } => ErrorCode::ArgumentCount,
            SemaError::ArgumentType { .. } => ErrorCode::TypeMismatch,
            SemaError::NotCallable(_) => ErrorCode::NotCallable,
            SemaError::NotIndexable(_) | SemaError::NonIntegerIndex(_) => ErrorCode::NotIndexable,
            SemaError::NotAPointer(_) => ErrorCode::NotAPointer,
            SemaError::InvalidOperand { .. } => ErrorCode::InvalidOperand,
            SemaError::BreakOutside | SemaError::ContinueOutside => ErrorCode::InvalidControlFlow,
            SemaError::PrivateAccess { .. } => ErrorCode::PrivateAccess,
            SemaError::GenericArity(_) => ErrorCode::GenericArityMismatch,
            SemaError::UnknownRequest(_) | SemaError::ConstraintUnsatisfied { .. } => {
                ErrorCode::ConstraintUnsatisfied
            }
            SemaError::InvalidQuestion(_) => ErrorCode::InvalidQuestion,
            SemaError::Other(_) => ErrorCode::TypeMismatch,
        }
    }
}

impl From<SemaError> for Diagnostic {
    fn from(error: SemaError) -> Self {
        let code = error.code();
        Diagnostic::error(error.to_string()).with_code(code)
    }
}
