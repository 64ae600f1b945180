use serde::Serialize;
use thiserror::Error;

use crate::{
    ast::{CodeRange, NodeId},
    reactor::Attr,
};

/// A syntax error with the source range it was detected at.
#[derive(Debug, Clone, Error, Serialize)]
#[error("syntax error at {}: {msg}", .range.start)]
pub struct ParseError {
    pub msg: String,
    pub range: CodeRange,
}

impl ParseError {
    pub(crate) fn new(msg: impl Into<String>, range: CodeRange) -> Self {
        Self { msg: msg.into(), range }
    }
}

/// A semantic error attached to a node and, when meaningful, to the
/// attribute whose computation failed.
///
/// The analyzer never aborts on these; the reactor collects every error the
/// program contains and they are reported as one batch.
#[derive(Debug, Clone, Error, Serialize)]
#[error("error at {}: {msg}", .range.start)]
pub struct SemanticError {
    pub msg: String,
    pub node: NodeId,
    pub attr: Option<Attr>,
    pub range: CodeRange,
}

/// What went wrong at run time.
///
/// Host-level failures (division by zero, integer overflow) are re-wrapped
/// here rather than surfacing as panics.
#[derive(Debug, Clone, Error, Serialize)]
pub enum RuntimeErrorKind {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("null pointer: {0}")]
    NullPointer(String),
    #[error("negative array index: {0}")]
    NegativeIndex(i64),
    #[error("array index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("calling a null function")]
    CallingNull,
    #[error("Please call the async function before trying to born it.")]
    BornBeforeCall,
    #[error("{0}")]
    Other(String),
}

/// A runtime error carrying the offending node's position.
///
/// The first runtime error terminates the interpretation; there is no
/// recovery path.
#[derive(Debug, Clone, Error, Serialize)]
#[error("runtime error at {}: {kind}", .range.start)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub range: CodeRange,
}

impl RuntimeError {
    pub(crate) fn new(kind: RuntimeErrorKind, range: CodeRange) -> Self {
        Self { kind, range }
    }

    pub(crate) fn other(msg: impl Into<String>, range: CodeRange) -> Self {
        Self::new(RuntimeErrorKind::Other(msg.into()), range)
    }
}

fn join_semantic(errors: &[SemanticError]) -> String {
    let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
    lines.join("\n")
}

/// Top-level error type of the public API.
#[derive(Debug, Error)]
pub enum SighError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// Every semantic error found during analysis, in reporting order.
    #[error("{}", join_semantic(.0))]
    Semantic(Vec<SemanticError>),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl SighError {
    /// The collected semantic errors, when analysis failed.
    #[must_use]
    pub fn semantic_errors(&self) -> Option<&[SemanticError]> {
        match self {
            Self::Semantic(errors) => Some(errors),
            _ => None,
        }
    }
}
