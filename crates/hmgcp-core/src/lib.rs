//! # hmgcp-core
//!
//! Combined Hindley-Milner type inference and global constant propagation
//! over one expression tree, solved as a single worklist fixpoint.
//!
//! This crate implements:
//! - A union-find forest of structural types with let-polymorphism and
//!   cyclic (recursive) types
//! - A flow lattice of constants, classes, function sets and records
//! - Per-node refinement steps for both analyses, each feeding the other
//! - Escape widening for functions exposed to unknown callers
//!
//! ## Quick Start
//!
//! ```rust
//! use hmgcp_core::infer;
//!
//! let inf = infer("(+ 2 3)").unwrap();
//! assert_eq!(inf.program.root_type(), "int64");
//! assert_eq!(inf.program.root_flow().to_string(), "5");
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod flow;
pub mod nongen;
pub mod parser;
pub mod report;
pub mod solver;
pub mod syntax;
pub mod term;
pub mod worklist;

pub use ast::Expr;
pub use config::SolverConfig;
pub use error::{InferError, ParseError, Result};
pub use flow::{AliasId, Flow, FunId};
pub use parser::parse;
pub use report::{Report, Signature};
pub use solver::{infer, infer_with, solve, Inference, SolverStats};
pub use syntax::prim::Prim;
pub use syntax::{NodeId, NodeKind, Program};
pub use term::{Forest, TermId};
pub use worklist::{PopOrder, Worklist};
