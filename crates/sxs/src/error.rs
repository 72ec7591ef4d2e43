//! The thrown-failure channel (spec.md §4.9). `Cell::Error` values are a
//! separate, ordinary-data channel and are never constructed from this type.

use std::fmt;

use ahash::AHashMap;

use crate::cell::CellTag;

/// A location in a source file, attached to errors that originate from
/// parsing or checking (spec.md §4.7/§7's `{file, line, column}` contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub byte_offset: usize,
    pub line: u32,
    pub column: u32,
}

impl SourceSpan {
    #[must_use]
    pub fn at_start() -> Self {
        Self { byte_offset: 0, line: 1, column: 1 }
    }

    /// Computes line/column for a byte offset by scanning `source` up to it.
    #[must_use]
    pub fn locate(source: &str, byte_offset: usize) -> Self {
        let mut line = 1u32;
        let mut column = 1u32;
        for (idx, ch) in source.char_indices() {
            if idx >= byte_offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self { byte_offset, line, column }
    }
}

/// Correlates a cell back to the span it was parsed from, keyed by
/// `Cell::span_key` (the pointer identity of the cell's heap payload). Built
/// by `parser::parse_program_with_spans` and threaded into `tcs::Checker` so
/// diagnostics can point at the cell that actually caused them, not always
/// the start of the file.
pub type SpanMap = AHashMap<usize, SourceSpan>;

/// Every thrown-failure kind from spec.md §4.9, plus the host-boundary
/// variants (`Io`, `KernelAbi`) the ambient stack needs.
#[derive(Debug, thiserror::Error)]
pub enum SxsError {
    #[error("parse_error: {message}")]
    ParseError { message: String, span: SourceSpan },

    #[error("arity_mismatch: {op} expects {expected} argument(s), got {actual}")]
    ArityMismatch { op: String, expected: usize, actual: usize },

    #[error("type_error: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: CellTag, span: Option<SourceSpan> },

    #[error("type_error: lambda return type expected {expected}, got {actual}")]
    ReturnTypeMismatch { expected: String, actual: CellTag },

    #[error("unknown_symbol: {name}")]
    UnknownSymbol { name: String },

    #[error("lambda_invalidated: aberrant handle {id} no longer refers to a live lambda")]
    LambdaInvalidated { id: u64 },

    #[error("import_cycle: {path} is already being imported")]
    ImportCycle { path: String },

    #[error("import_not_found: {path}")]
    ImportNotFound { path: String },

    #[error("import_redefinition: prefix {prefix} already bound to a different path")]
    ImportRedefinition { prefix: String },

    #[error("kernel_load_failed: {name}: {message}")]
    KernelLoadFailed { name: String, message: String },

    #[error("assert_failed: {message}")]
    AssertFailed { message: String },

    #[error("done_outside_loop")]
    DoneOutsideLoop,

    #[error("invalid_type: {text}")]
    InvalidType { text: String },

    #[error("redefinition: {name} is already defined in this scope")]
    Redefinition { name: String },

    #[error("eval_requires_string")]
    EvalRequiresString,

    #[error("io_error: {0}")]
    Io(String),

    #[error("kernel_abi_error: {0}")]
    KernelAbi(String),
}

impl SxsError {
    /// The diagnostic kind tag used in the `{kind, message, location?}`
    /// host-visible payload (spec.md §7).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "ParseError",
            Self::ArityMismatch { .. } => "ArityMismatch",
            Self::TypeMismatch { .. } | Self::ReturnTypeMismatch { .. } => "TypeMismatch",
            Self::UnknownSymbol { .. } => "UnknownSymbol",
            Self::LambdaInvalidated { .. } => "LambdaInvalidated",
            Self::ImportCycle { .. } => "ImportCycle",
            Self::ImportNotFound { .. } => "ImportNotFound",
            Self::ImportRedefinition { .. } => "Redefinition",
            Self::KernelLoadFailed { .. } => "KernelLoadFailed",
            Self::AssertFailed { .. } => "AssertFailed",
            Self::DoneOutsideLoop => "DoneOutsideLoop",
            Self::InvalidType { .. } => "InvalidType",
            Self::Redefinition { .. } => "Redefinition",
            Self::EvalRequiresString => "EvalRequiresString",
            Self::Io(_) => "Io",
            Self::KernelAbi(_) => "KernelAbi",
        }
    }

    #[must_use]
    pub fn span(&self) -> Option<SourceSpan> {
        match self {
            Self::ParseError { span, .. } => Some(*span),
            Self::TypeMismatch { span, .. } => *span,
            _ => None,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

pub type SxsResult<T> = Result<T, SxsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_line_and_column() {
        let src = "abc\ndef\nghi";
        let span = SourceSpan::locate(src, 5);
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 2);
    }

    #[test]
    fn kind_matches_variant() {
        let e = SxsError::DoneOutsideLoop;
        assert_eq!(e.kind(), "DoneOutsideLoop");
    }
}
