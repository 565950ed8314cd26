//! # gram, a compiler for parser combinator grammars
//!
//! `gram` builds a grammar out of small pieces — literal strings, byte ranges,
//! choices, repeats — and compiles the result into a parser that runs as a flat
//! dispatch loop rather than a tree of closures calling each other. Grammars that
//! call themselves or each other by name go through [`registry::Grammar`]; anything
//! self-contained can be built and compiled directly.
//!
//! ## Example
//!
//! ```rust
//! use gram::prelude::*;
//!
//! fn digits(n: usize) -> Result<Program, gram::BuildError> {
//!     Program::new().integer(n)
//! }
//!
//! let rgb = Program::new()
//!     .ignore(Program::new().string("#")?)?
//!     .then(digits(2)?)?
//!     .then(digits(2)?)?
//!     .then(digits(2)?)?;
//!
//! let parser = Parser::compile(&rgb, CompileOptions::default())?;
//! let success = parser.parse(b"#102030", ParseOptions::default())?;
//! assert_eq!(success.tokens, vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Layout
//!
//! - [`ir`] — the combinator intermediate representation and its builder API ([`ir::Program`]).
//! - [`compiler`] — lowers a `Program` into a runnable [`compiler::CompiledProgram`].
//! - [`runtime`] — the calling convention every compiled clause obeys.
//! - [`error`] — build-time ([`error::BuildError`]) and parse-time ([`error::Failure`]) error types.
//! - [`parser`] — the standalone entry point ([`parser::Parser`]).
//! - [`registry`] — named, possibly mutually-recursive combinators ([`registry::Grammar`]).
//! - [`generator`] — draws random input a `Program` accepts (`generate` feature, on by default).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod compiler;
pub mod error;
#[cfg(feature = "generate")]
#[cfg_attr(docsrs, doc(cfg(feature = "generate")))]
pub mod generator;
pub mod ir;
pub mod parser;
pub mod registry;
pub mod runtime;

pub use compiler::{compile, CompileOptions, CompiledProgram};
pub use error::{BuildError, Failure};
pub use ir::{GenTimes, Modifier, ParsecTarget, Program, RangeSpec, Sense};
pub use parser::{ParseOptions, Parser, Success};
pub use registry::{CompiledGrammar, Grammar, Visibility};
pub use runtime::{Context, Position, Value};

#[cfg(feature = "generate")]
#[cfg_attr(docsrs, doc(cfg(feature = "generate")))]
pub use generator::{generate, GenError, ParsecResolver};

/// Everything most callers need, in one `use`.
pub mod prelude {
    pub use crate::compiler::{CompileOptions, CompiledProgram};
    pub use crate::error::{BuildError, Failure};
    pub use crate::ir::Program;
    pub use crate::parser::{ParseOptions, Parser, Success};
    pub use crate::registry::{CompiledGrammar, Grammar, Visibility};
    pub use crate::runtime::{Context, Position, Value};
}
