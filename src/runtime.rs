//! The calling convention every compiled clause obeys.
//!
//! A clause is, conceptually, `(input, acc, ctx, line, offset) -> success | failure`.
//! This module defines the four-tuple ([`ParseState`]) threaded through that call,
//! the token type stored in the accumulator ([`Value`]), the user-owned side
//! channel ([`Context`]), and the two callback ABIs ([`TraverseOp`], [`WhileCall`])
//! a caller can plug into `traverse` and `repeat`.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// `(line, byte_offset_immediately_after_the_last_newline)` paired with the total
/// bytes consumed so far.
///
/// `line.0` is the current 1-based line number; `line.1` is the byte offset of the
/// first byte after the most recently consumed `\n`. The column of the current
/// position is `byte_offset - line.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    /// `(current_line, byte_offset_after_last_newline)`.
    pub line: (usize, usize),
    /// Total bytes consumed since the start of the parse.
    pub byte_offset: usize,
}

impl Position {
    /// The starting position of a parse: line 1, offset 0.
    pub fn start() -> Self {
        Position {
            line: (1, 0),
            byte_offset: 0,
        }
    }

    /// Advance this position past `consumed` bytes taken from `source`, the slice
    /// that begins at the current position.
    ///
    /// Counts `\n` (`0x0A`) occurrences in the consumed prefix to keep the line
    /// counter and post-newline offset correct.
    pub fn advance(&self, source: &[u8], consumed: usize) -> Position {
        let mut line = self.line;
        let mut offset = self.byte_offset;
        for &b in &source[..consumed] {
            offset += 1;
            if b == b'\n' {
                line.0 += 1;
                line.1 = offset;
            }
        }
        Position {
            line,
            byte_offset: offset,
        }
    }

    /// Column within the current line (0-based).
    pub fn column(&self) -> usize {
        self.byte_offset - self.line.1
    }
}

/// A token produced by a bound node or assembled by a `traverse`.
///
/// This is the concrete representation behind the distilled spec's informal
/// "token"; it has enough structure to express everything the builder API's
/// derived operations need: integers, literal bytes, strings, nested lists
/// (`wrap`), tagged pairs (`tag`/`unwrap_and_tag`), and position-annotated values
/// (`byte_offset`/`line`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Produced by `integer`.
    Int(i64),
    /// Produced by `string`/`bytes`.
    Bytes(Vec<u8>),
    /// Produced by `ascii_string`/`utf8_string`.
    Str(String),
    /// Produced by `wrap`.
    List(Vec<Value>),
    /// Produced by `tag`/`unwrap_and_tag`: `(tag, value)`.
    Tagged(String, Box<Value>),
    /// Produced by `byte_offset`/`line`: `(value, position)`.
    Positioned(Box<Value>, Position),
    /// Produced by `eos`, `lookahead`, and other nodes that emit nothing.
    Unit,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Tagged(tag, value) => write!(f, "{tag}:{value}"),
            Value::Positioned(value, pos) => write!(f, "{value}@{}", pos.byte_offset),
            Value::Unit => write!(f, "()"),
        }
    }
}

/// The user-controlled, caller-owned mapping threaded through a parse.
///
/// Every clause receives and returns a `Context` unchanged except through
/// `traverse` and `repeat`'s `while_call`, which may mutate it freely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context(HashMap<String, Value>);

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Context(HashMap::new())
    }

    /// Read a value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Bind a name to a value, returning the previous binding if any.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    /// Remove a binding.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }
}

/// The reversed accumulator: most-recently-produced token at index `0`.
pub type Acc = Vec<Value>;

/// The four-tuple threaded through every compiled clause, plus the remaining
/// input slice that makes it a five-tuple in practice.
#[derive(Debug, Clone)]
pub struct ParseState<'i> {
    /// Remaining unconsumed input.
    pub input: &'i [u8],
    /// Accumulator, in reverse production order.
    pub acc: Acc,
    /// User-owned context.
    pub ctx: Context,
    /// Current position.
    pub position: Position,
}

impl<'i> ParseState<'i> {
    /// A fresh state at the start of a parse.
    pub fn new(input: &'i [u8], ctx: Context, position: Position) -> Self {
        ParseState {
            input,
            acc: Vec::new(),
            ctx,
            position,
        }
    }

    /// Advance `input`/`position` past `consumed` bytes, leaving `acc`/`ctx` untouched.
    pub(crate) fn consume(&self, consumed: usize) -> ParseState<'i> {
        ParseState {
            input: &self.input[consumed..],
            acc: self.acc.clone(),
            ctx: self.ctx.clone(),
            position: self.position.advance(self.input, consumed),
        }
    }
}

/// Result of running one compiled clause: the advanced state, or a failure.
pub type StageResult<'i> = Result<ParseState<'i>, crate::error::Failure<'i>>;

/// `repeat`'s loop-continuation callback: `(input, ctx, line, offset) -> cont(ctx) | halt(ctx)`.
///
/// The callback owns the context it is handed and returns the context `repeat`
/// should carry into (or out of) its next iteration, so a `while_call` can rewrite
/// context the same way a `traverse` op can.
pub type WhileCall = Rc<dyn Fn(&[u8], Context, Position) -> WhileVerdict>;

/// Verdict returned by a [`WhileCall`], carrying the context to resume with.
#[derive(Debug, Clone, PartialEq)]
pub enum WhileVerdict {
    /// Run `inner` again, with this context.
    Cont(Context),
    /// Stop, keeping what has already been accumulated, with this context.
    Halt(Context),
}

/// A `traverse` operation: rewrites `(rest, acc, ctx)` given the body's position,
/// or raises a [`Failure`] reason string which aborts the parse at this point.
pub type TraverseOp = Rc<dyn Fn(&[u8], Acc, Context, Position) -> Result<(Acc, Context), String>>;
