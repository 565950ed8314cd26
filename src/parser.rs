//! The single entry point a compiled grammar is actually driven through.
//!
//! Everything in [`crate::compiler`] and [`crate::registry`] exists to produce a
//! value this module knows how to run: feed it a byte slice and some starting
//! [`ParseOptions`], get back a [`Success`] (remaining input, tokens in the order
//! they were produced, final context and position) or a [`crate::error::Failure`].

use crate::compiler::CompiledProgram as CompiledClauses;
use crate::error::{BuildError, Failure};
use crate::ir::Program;
use crate::runtime::{Context, ParseState, Position, Value};

/// Starting state for a parse: everything the five-tuple calling convention needs
/// besides the input bytes themselves.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// The context a parse starts with. Most callers want [`Context::new`].
    pub context: Context,
    /// The position a parse starts at. Most callers want [`Position::start`].
    pub position: Position,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            context: Context::new(),
            position: Position::start(),
        }
    }
}

/// What a successful parse hands back.
#[derive(Debug, Clone)]
pub struct Success<'i> {
    /// Input left unconsumed.
    pub rest: &'i [u8],
    /// Every token the grammar produced, in production order (forward, unlike the
    /// accumulator's internal reverse-production representation).
    pub tokens: Vec<Value>,
    /// The context as it stood when the parse finished.
    pub ctx: Context,
    /// The position at the end of the consumed input.
    pub position: Position,
    /// Bytes consumed by this parse: `position.byte_offset` minus the starting
    /// position's `byte_offset`. The failing twin of this field is
    /// [`crate::error::Failure::consumed`].
    pub consumed: usize,
}

impl<'i> Success<'i> {
    pub(crate) fn from_state(state: ParseState<'i>, start_offset: usize) -> Self {
        let mut tokens = state.acc;
        tokens.reverse();
        Success {
            rest: state.input,
            tokens,
            consumed: state.position.byte_offset - start_offset,
            ctx: state.ctx,
            position: state.position,
        }
    }
}

/// A compiled, standalone (non-[`crate::registry::Grammar`]) parser.
///
/// Build one with [`Parser::compile`], then call [`Parser::parse`] as many times as
/// you like — compilation happens once, parsing is repeatable and side-effect-free
/// beyond what your own `traverse`/`repeat` callbacks do.
pub struct Parser {
    compiled: CompiledClauses,
}

impl Parser {
    /// Compile `program` with `options`.
    ///
    /// Rejects any `parsec` node in `program`: a standalone parser has no name
    /// table to resolve one against. Use [`crate::registry::Grammar`] for grammars
    /// with named, possibly recursive, members.
    pub fn compile(program: &Program, options: crate::compiler::CompileOptions) -> Result<Self, BuildError> {
        Ok(Parser {
            compiled: crate::compiler::compile(program, options)?,
        })
    }

    /// Run this parser against `input`, starting from `options`.
    pub fn parse<'i>(&self, input: &'i [u8], options: ParseOptions) -> Result<Success<'i>, Failure<'i>> {
        let start_offset = options.position.byte_offset;
        let state = ParseState::new(input, options.context, options.position);
        self.compiled.run(state).map(|s| Success::from_state(s, start_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileOptions;

    #[test]
    fn parses_a_literal_and_reports_tokens_in_forward_order() {
        let program = Program::new().integer(1).unwrap().integer(1).unwrap();
        let parser = Parser::compile(&program, CompileOptions::default()).unwrap();
        let success = parser.parse(b"12", ParseOptions::default()).unwrap();
        assert_eq!(success.tokens, vec![Value::Int(1), Value::Int(2)]);
        assert!(success.rest.is_empty());
    }

    #[test]
    fn success_reports_bytes_consumed() {
        let program = Program::new().integer(1).unwrap().integer(1).unwrap();
        let parser = Parser::compile(&program, CompileOptions::default()).unwrap();
        let mut options = ParseOptions::default();
        options.position.byte_offset = 10;
        let success = parser.parse(b"12", options).unwrap();
        assert_eq!(success.consumed, 2);
        assert_eq!(success.position.byte_offset, 12);
    }

    #[test]
    fn failure_reports_position_and_reason() {
        let program = Program::new().string("abc").unwrap();
        let parser = Parser::compile(&program, CompileOptions::default()).unwrap();
        let failure = parser.parse(b"xyz", ParseOptions::default()).unwrap_err();
        assert_eq!(failure.position().byte_offset, 0);
        assert!(failure.reason().contains("abc"));
    }
}
