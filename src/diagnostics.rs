//! Diagnostic reporting.
//!
//! Every stage surfaces failures as a [`Diagnostic`]: a message, an error
//! code, and a source span when one is available (parser errors always have
//! one; analysis errors often only know a message). Rendering goes through
//! [`DiagnosticEmitter`], which pretty-prints spanned diagnostics with
//! ariadne and falls back to a plain line for the rest.
//!
//! # Error codes
//!
//! - **E0001–E0099**: lexical errors
//! - **E0100–E0199**: syntax errors
//! - **E0200–E0299**: name resolution
//! - **E0300–E0399**: typing and ownership
//! - **E0400–E0499**: generics and visibility
//! - **E0500–E0599**: MIR construction

use crate::span::Span;
use ariadne::{Color, Label, Report, ReportKind, Source};

/// Compiler error codes, organized by pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Lexical (E0001-E0099)
    UnknownCharacter = 1,
    UnterminatedString = 2,
    UnclosedBlockComment = 3,

    // Syntax (E0100-E0199)
    UnexpectedToken = 100,
    UnexpectedEof = 101,
    MissingDelimiter = 102,
    ExpectedExpression = 103,
    ExpectedType = 104,
    ExpectedPattern = 105,

    // Name resolution (E0200-E0299)
    UndefinedIdentifier = 200,
    UndefinedType = 201,
    DuplicateDefinition = 202,
    UnknownModule = 203,

    // Typing and ownership (E0300-E0399)
    TypeMismatch = 300,
    ArgumentCount = 301,
    NotCallable = 302,
    NotIndexable = 303,
    NotAPointer = 304,
    NonBoolCondition = 305,
    InvalidOperand = 306,
    UseOfMoved = 310,
    InvalidControlFlow = 320,
    InvalidQuestion = 321,

    // Generics and visibility (E0400-E0499)
    GenericArityMismatch = 400,
    ConstraintUnsatisfied = 401,
    PrivateAccess = 410,

    // MIR construction (E0500-E0599)
    UnknownStructInMir = 500,
    UnknownVariableInMir = 501,
    ComplexCallee = 502,
    ContinueInSwitch = 503,
    MalformedMir = 504,
}

impl ErrorCode {
    /// The formatted code string, e.g. `E0300`.
    pub fn as_str(&self) -> String {
        format!("E{:04}", *self as u16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

impl DiagnosticKind {
    fn report_kind(self) -> ReportKind<'static> {
        match self {
            DiagnosticKind::Error => ReportKind::Error,
            DiagnosticKind::Warning => ReportKind::Warning,
        }
    }

    fn color(self) -> Color {
        match self {
            DiagnosticKind::Error => Color::Red,
            DiagnosticKind::Warning => Color::Yellow,
        }
    }
}

/// A compiler diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code: None,
            message: message.into(),
            span: None,
        }
    }

    pub fn error_at(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code: None,
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code: None,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// The 1-based source line, when known.
    pub fn line(&self) -> Option<u32> {
        self.span.map(|s| s.line)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{}] ", code.as_str())?;
        }
        write!(f, "{}", self.message)?;
        if let Some(line) = self.line() {
            write!(f, " at line {line}")?;
        }
        Ok(())
    }
}

/// Renders diagnostics against a source file.
pub struct DiagnosticEmitter<'a> {
    filename: &'a str,
    source: &'a str,
}

impl<'a> DiagnosticEmitter<'a> {
    pub fn new(filename: &'a str, source: &'a str) -> Self {
        Self { filename, source }
    }

    /// Emit a diagnostic to stderr.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        let Some(span) = diagnostic.span else {
            eprintln!("{}: {}", self.filename, diagnostic);
            return;
        };

        let message = match &diagnostic.code {
            Some(code) => format!("[{}] {}", code.as_str(), diagnostic.message),
            None => diagnostic.message.clone(),
        };

        let report = Report::build(diagnostic.kind.report_kind(), self.filename, span.start)
            .with_message(&message)
            .with_label(
                Label::new((self.filename, span.start..span.end))
                    .with_color(diagnostic.kind.color())
                    .with_message(&diagnostic.message),
            )
            .finish();

        let _ = report.eprint((self.filename, Source::from(self.source)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_formatting() {
        assert_eq!(ErrorCode::UnknownCharacter.as_str(), "E0001");
        assert_eq!(ErrorCode::TypeMismatch.as_str(), "E0300");
        assert_eq!(ErrorCode::MalformedMir.as_str(), "E0504");
    }

    #[test]
    fn display_includes_line_and_code() {
        let diag = Diagnostic::error_at("unexpected token", Span::new(4, 5, 2, 1))
            .with_code(ErrorCode::UnexpectedToken);
        assert_eq!(diag.to_string(), "[E0100] unexpected token at line 2");
    }
}
