//! Hard failures outside the type lattice
//!
//! Type errors never show up here: they are error terms inside the
//! forest. These are malformed input and unresolved names.

use thiserror::Error;

/// Malformed surface text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("expected '{expected}' at offset {offset}")]
    Expected { expected: char, offset: usize },

    #[error("missing identifier at offset {offset}")]
    MissingId { offset: usize },

    #[error("unknown syntax at offset {offset}")]
    UnknownSyntax { offset: usize },

    #[error("bad number literal at offset {offset}")]
    BadNumber { offset: usize },

    #[error("junk at end of program at offset {offset}")]
    Junk { offset: usize },
}

/// Failure to build a program ready for solving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("'{name}' is undefined")]
    Undefined { name: String },
}

pub type Result<T> = std::result::Result<T, InferError>;
