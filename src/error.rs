//! # Error management
//!
//! Two surfaces, matching the two phases of using this crate:
//!
//! - [`BuildError`] is returned by builder methods on [`crate::ir::Program`] when the
//!   combinator being assembled is malformed (an empty repeat body, a bad range, a
//!   dangling `parsec` reference, ...). These are always raised at grammar-construction
//!   time, never while parsing.
//! - [`Failure`] is returned by [`crate::parser::Parser::parse`] when the compiled
//!   grammar does not match the input. It carries enough state (remaining input,
//!   context, position, bytes consumed) for a caller to report a precise error or
//!   retry with a different grammar.

use crate::runtime::{Context, Position};
use std::fmt;

/// A problem detected while assembling a [`crate::ir::Program`].
///
/// Every variant is raised synchronously from the builder method that detected it;
/// none of these can occur once a grammar has been compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The body of `label`, `lookahead`, `repeat`, `times`, or `eventually` was empty.
    EmptyBody {
        /// Name of the combinator that requires a non-empty body.
        combinator: &'static str,
    },
    /// A `bin_segment` range had a start greater than its end.
    InvalidRange {
        /// Lower bound of the offending range.
        start: u32,
        /// Upper bound of the offending range.
        end: u32,
    },
    /// `integer(min, max)` (or any other min/max builder) was called with `min > max`.
    InvalidMinMax {
        /// The lower bound supplied.
        min: usize,
        /// The upper bound supplied.
        max: usize,
    },
    /// `choice` was given a weight list whose length does not match the alternative count.
    WeightCountMismatch {
        /// Number of alternatives in the `choice`.
        alternatives: usize,
        /// Number of weights supplied.
        weights: usize,
    },
    /// `choice` was given fewer than two alternatives.
    TooFewAlternatives {
        /// Number of alternatives supplied.
        alternatives: usize,
    },
    /// `bytes(n)` was called with `n == 0`.
    NonPositiveCount {
        /// Name of the combinator that requires a positive count.
        combinator: &'static str,
    },
    /// `eos` appeared somewhere other than the logical end of a program.
    EosNotAtEnd,
    /// `parsec(name)` referenced a name absent from its [`crate::registry::Grammar`].
    UndefinedParsec {
        /// The name that could not be resolved.
        name: String,
    },
    /// `unwrap_and_tag` (or `wrap`) was asked to operate on a body that cannot
    /// statically be shown to produce exactly one token.
    AmbiguousUnwrap {
        /// Name of the combinator for which this was raised.
        combinator: &'static str,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::EmptyBody { combinator } => {
                write!(f, "{combinator} requires a non-empty body")
            }
            BuildError::InvalidRange { start, end } => {
                write!(f, "invalid range: start {start} is greater than end {end}")
            }
            BuildError::InvalidMinMax { min, max } => {
                write!(f, "invalid bounds: min {min} is greater than max {max}")
            }
            BuildError::WeightCountMismatch {
                alternatives,
                weights,
            } => write!(
                f,
                "choice has {alternatives} alternatives but {weights} weights"
            ),
            BuildError::TooFewAlternatives { alternatives } => {
                write!(f, "choice requires at least 2 alternatives, got {alternatives}")
            }
            BuildError::NonPositiveCount { combinator } => {
                write!(f, "{combinator} requires a count of at least 1")
            }
            BuildError::EosNotAtEnd => {
                write!(f, "eos may only appear at the end of a program")
            }
            BuildError::UndefinedParsec { name } => {
                write!(f, "parsec references undefined name {name:?}")
            }
            BuildError::AmbiguousUnwrap { combinator } => {
                write!(f, "{combinator} needs a body that always produces exactly one token")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// A parse-time failure.
///
/// Borrows from the input being parsed, so it never copies the unconsumed bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure<'i> {
    pub(crate) reason: String,
    pub(crate) rest: &'i [u8],
    pub(crate) ctx: Context,
    pub(crate) position: Position,
    pub(crate) consumed: usize,
    pub(crate) label_chain: Vec<String>,
}

impl<'i> Failure<'i> {
    pub(crate) fn new(reason: impl Into<String>, rest: &'i [u8], ctx: Context, position: Position, consumed: usize) -> Self {
        Failure {
            reason: reason.into(),
            rest,
            ctx,
            position,
            consumed,
            label_chain: Vec::new(),
        }
    }

    /// Human-readable description of why parsing stopped.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The unconsumed input at the point of failure.
    pub fn rest(&self) -> &'i [u8] {
        self.rest
    }

    /// The context as it stood at the point of failure.
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    /// The position (line, byte offset) at the point of failure.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Total bytes consumed before failing.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl fmt::Display for Failure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, byte offset {}",
            self.reason, self.position.line.0, self.position.byte_offset
        )
    }
}

impl std::error::Error for Failure<'_> {}
