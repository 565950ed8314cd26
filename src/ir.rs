//! The combinator intermediate representation and its builder API.
//!
//! A [`Program`] is an ordered sequence of [`Node`]s. The distilled spec this crate
//! implements stores that sequence in reverse (builders prepend); this implementation
//! stores it in logical order instead, which the spec explicitly permits "so long as
//! the externally observable introspection format is documented" — [`Program::nodes`]
//! always returns nodes in the order they will be matched.
//!
//! Every public method on `Program` is a *builder*: it consumes `self`, validates its
//! arguments, and returns a new `Program` with one more node appended (or an error).
//! Builders never fail at parse time — every check here runs once, at grammar
//! construction.

use crate::error::BuildError;
use crate::runtime::{TraverseOp, Value, WhileCall};
use std::ops::RangeInclusive;
use std::rc::Rc;

/// An inclusive codepoint range used by [`Node::BinSegment`].
///
/// Constructed only through validated entry points, so an invalid range
/// (`start > end`) can never reach the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    start: u32,
    end: u32,
}

impl RangeSpec {
    /// A range covering exactly `start..=end`.
    pub fn new(start: u32, end: u32) -> Result<Self, BuildError> {
        if start > end {
            Err(BuildError::InvalidRange { start, end })
        } else {
            Ok(RangeSpec { start, end })
        }
    }

    /// A range covering a single codepoint.
    pub fn single(value: u32) -> Self {
        RangeSpec {
            start: value,
            end: value,
        }
    }

    /// Build from a byte range, e.g. `b'a'..=b'z'`.
    pub fn from_bytes(range: RangeInclusive<u8>) -> Result<Self, BuildError> {
        Self::new(*range.start() as u32, *range.end() as u32)
    }

    /// Build from a `char` range, e.g. `'a'..='z'`.
    pub fn from_chars(range: RangeInclusive<char>) -> Result<Self, BuildError> {
        Self::new(*range.start() as u32, *range.end() as u32)
    }

    /// Lower bound, inclusive.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Upper bound, inclusive.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Whether `codepoint` falls within this range.
    pub fn contains(&self, codepoint: u32) -> bool {
        codepoint >= self.start && codepoint <= self.end
    }
}

/// How a [`Node::BinSegment`] interprets the bytes it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Consume exactly one byte; ranges are compared against that byte's value.
    Integer,
    /// Decode one UTF-8 codepoint (1-4 bytes).
    Utf8,
    /// Decode one big-endian UTF-16 code unit pair as a codepoint (2 or 4 bytes).
    Utf16,
    /// Decode one big-endian UTF-32 codepoint (4 bytes).
    Utf32,
}

/// Which snapshot of position a [`TraverseBody::Transform`] op observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The op sees the body's position as it was *before* the body ran.
    Pre,
    /// The op sees the body's position as it was *after* the body ran.
    Post,
}

/// The effect a `traverse` node has on the tokens its body produced.
#[derive(Clone)]
pub enum TraverseBody {
    /// Run each op in order against the tokens the body produced (in reverse
    /// order, as they sit in the accumulator) and the body's `Pre`/`Post` position.
    Transform(Phase, Vec<TraverseOp>),
    /// Discard whatever the body produced and substitute this fixed token list.
    Constant(Vec<Value>),
}

/// Which direction a `lookahead` assertion runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// Succeed (without consuming) only if the body would match.
    Positive,
    /// Succeed (without consuming) only if the body would *not* match.
    Negative,
}

/// How many times the generator should draw a `repeat`/`times` body.
#[derive(Debug, Clone, Copy)]
pub enum GenTimes {
    /// Always exactly this many.
    Exact(usize),
    /// Uniformly drawn from this inclusive range.
    Range(usize, usize),
    /// The builder's default, `0..=3`.
    Default,
}

/// Where a `parsec` call resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsecTarget {
    /// A name in the same [`crate::registry::Grammar`].
    Local(String),
    /// A name in a different module's published table.
    Remote {
        /// The module the name is published under.
        module: String,
        /// The name within that module.
        name: String,
    },
}

/// One node of the combinator IR.
#[derive(Clone)]
pub enum Node {
    /// One codepoint in `inclusive` minus `exclusive`, decoded per `modifier`.
    BinSegment {
        /// Ranges a matching codepoint must fall within at least one of.
        inclusive: Vec<RangeSpec>,
        /// Ranges a matching codepoint must fall within none of.
        exclusive: Vec<RangeSpec>,
        /// How the consumed bytes are decoded into a codepoint.
        modifier: Modifier,
    },
    /// A literal byte sequence.
    StringLit(Vec<u8>),
    /// Any `n` bytes, unconditionally.
    Bytes(usize),
    /// End-of-input assertion.
    Eos,
    /// Replace `inner`'s zero-width failure reason with `"expected " + text`.
    Label(Box<Program>, String),
    /// Rewrite `inner`'s produced tokens and/or context.
    Traverse(Box<Program>, TraverseBody),
    /// First-match-wins among `alternatives`, optionally weighted for generation.
    Choice(Vec<Program>, Option<Vec<u32>>),
    /// Zero or more repetitions of `inner`, gated by an optional `while_call`.
    Repeat(Box<Program>, Option<WhileCall>, GenTimes),
    /// Up to `max` optional repetitions of `inner`.
    Times(Box<Program>, usize),
    /// A non-consuming assertion on `inner`.
    Lookahead(Box<Program>, Sense),
    /// Discard bytes until `inner` matches.
    Eventually(Box<Program>),
    /// Call out to another named combinator.
    Parsec(ParsecTarget),
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::BinSegment {
                inclusive,
                exclusive,
                modifier,
            } => f
                .debug_struct("BinSegment")
                .field("inclusive", inclusive)
                .field("exclusive", exclusive)
                .field("modifier", modifier)
                .finish(),
            Node::StringLit(bytes) => f.debug_tuple("StringLit").field(bytes).finish(),
            Node::Bytes(n) => f.debug_tuple("Bytes").field(n).finish(),
            Node::Eos => write!(f, "Eos"),
            Node::Label(inner, text) => f.debug_tuple("Label").field(inner).field(text).finish(),
            Node::Traverse(inner, body) => {
                let phase = match body {
                    TraverseBody::Transform(phase, ops) => format!("Transform({phase:?}, {} ops)", ops.len()),
                    TraverseBody::Constant(values) => format!("Constant({} tokens)", values.len()),
                };
                f.debug_tuple("Traverse").field(inner).field(&phase).finish()
            }
            Node::Choice(alts, weights) => f
                .debug_tuple("Choice")
                .field(&alts.len())
                .field(weights)
                .finish(),
            Node::Repeat(inner, while_call, gen) => f
                .debug_tuple("Repeat")
                .field(inner)
                .field(&while_call.is_some())
                .field(gen)
                .finish(),
            Node::Times(inner, max) => f.debug_tuple("Times").field(inner).field(max).finish(),
            Node::Lookahead(inner, sense) => {
                f.debug_tuple("Lookahead").field(inner).field(sense).finish()
            }
            Node::Eventually(inner) => f.debug_tuple("Eventually").field(inner).finish(),
            Node::Parsec(target) => f.debug_tuple("Parsec").field(target).finish(),
        }
    }
}

/// An ordered sequence of [`Node`]s: a grammar fragment.
#[derive(Clone, Default)]
pub struct Program {
    nodes: Vec<Node>,
    sealed: bool,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.nodes.iter()).finish()
    }
}

impl Program {
    /// The empty program: matches the empty string, emits no tokens.
    pub fn new() -> Self {
        Program::default()
    }

    /// Nodes in logical (matching) order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether this program has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(mut self, node: Node) -> Result<Self, BuildError> {
        if self.sealed {
            return Err(BuildError::EosNotAtEnd);
        }
        if matches!(node, Node::Eos) {
            self.sealed = true;
        }
        self.nodes.push(node);
        Ok(self)
    }

    /// Append `other` after `self`, as a plain sequence.
    pub fn then(self, other: Program) -> Result<Self, BuildError> {
        if self.sealed && !other.nodes.is_empty() {
            return Err(BuildError::EosNotAtEnd);
        }
        let mut combined = self;
        let sealed = other.sealed;
        for node in other.nodes {
            combined = combined.push(node)?;
        }
        combined.sealed = combined.sealed || sealed;
        Ok(combined)
    }

    // -- primitives ---------------------------------------------------

    /// One codepoint in `inclusive` and not in `exclusive`, decoded per `modifier`.
    pub fn bin_segment(
        self,
        inclusive: Vec<RangeSpec>,
        exclusive: Vec<RangeSpec>,
        modifier: Modifier,
    ) -> Result<Self, BuildError> {
        self.push(Node::BinSegment {
            inclusive,
            exclusive,
            modifier,
        })
    }

    /// One ASCII byte in `range`.
    pub fn ascii_char(self, range: RangeInclusive<u8>) -> Result<Self, BuildError> {
        let spec = RangeSpec::from_bytes(range)?;
        self.bin_segment(vec![spec], vec![], Modifier::Integer)
    }

    /// One Unicode codepoint in `range`, UTF-8 decoded.
    pub fn utf8_char(self, range: RangeInclusive<char>) -> Result<Self, BuildError> {
        let spec = RangeSpec::from_chars(range)?;
        self.bin_segment(vec![spec], vec![], Modifier::Utf8)
    }

    /// A literal byte sequence.
    pub fn string(self, bytes: impl Into<Vec<u8>>) -> Result<Self, BuildError> {
        self.push(Node::StringLit(bytes.into()))
    }

    /// Any `n` bytes (`n >= 1`).
    pub fn bytes(self, n: usize) -> Result<Self, BuildError> {
        if n == 0 {
            return Err(BuildError::NonPositiveCount { combinator: "bytes" });
        }
        self.push(Node::Bytes(n))
    }

    /// End-of-input assertion. May only appear at the logical end of a program.
    pub fn eos(self) -> Result<Self, BuildError> {
        self.push(Node::Eos)
    }

    /// Replace `inner`'s zero-width failure reason with `"expected " + text`.
    pub fn label(self, inner: Program, text: impl Into<String>) -> Result<Self, BuildError> {
        if inner.is_empty() {
            return Err(BuildError::EmptyBody { combinator: "label" });
        }
        self.push(Node::Label(Box::new(inner), text.into()))
    }

    /// Rewrite `inner`'s tokens with `ops`, observing its pre-body position.
    pub fn traverse_pre(self, inner: Program, ops: Vec<TraverseOp>) -> Result<Self, BuildError> {
        self.push(Node::Traverse(
            Box::new(inner),
            TraverseBody::Transform(Phase::Pre, ops),
        ))
    }

    /// Rewrite `inner`'s tokens with `ops`, observing its post-body position.
    pub fn traverse_post(self, inner: Program, ops: Vec<TraverseOp>) -> Result<Self, BuildError> {
        self.push(Node::Traverse(
            Box::new(inner),
            TraverseBody::Transform(Phase::Post, ops),
        ))
    }

    /// Discard `inner`'s tokens entirely and substitute `tokens`.
    pub fn traverse_constant(self, inner: Program, tokens: Vec<Value>) -> Result<Self, BuildError> {
        self.push(Node::Traverse(Box::new(inner), TraverseBody::Constant(tokens)))
    }

    /// First-match-wins among `alternatives`.
    pub fn choice(self, alternatives: Vec<Program>, weights: Option<Vec<u32>>) -> Result<Self, BuildError> {
        if alternatives.len() < 2 {
            return Err(BuildError::TooFewAlternatives {
                alternatives: alternatives.len(),
            });
        }
        if let Some(w) = &weights {
            if w.len() != alternatives.len() {
                return Err(BuildError::WeightCountMismatch {
                    alternatives: alternatives.len(),
                    weights: w.len(),
                });
            }
        }
        self.push(Node::Choice(alternatives, weights))
    }

    /// Zero or more repetitions of `inner`.
    pub fn repeat(
        self,
        inner: Program,
        while_call: Option<WhileCall>,
        gen_times: GenTimes,
    ) -> Result<Self, BuildError> {
        if inner.is_empty() {
            return Err(BuildError::EmptyBody { combinator: "repeat" });
        }
        self.push(Node::Repeat(Box::new(inner), while_call, gen_times))
    }

    /// Up to `max` optional repetitions of `inner`.
    pub fn times(self, inner: Program, max: usize) -> Result<Self, BuildError> {
        if inner.is_empty() {
            return Err(BuildError::EmptyBody { combinator: "times" });
        }
        self.push(Node::Times(Box::new(inner), max))
    }

    /// A non-consuming assertion on `inner`.
    pub fn lookahead(self, inner: Program, sense: Sense) -> Result<Self, BuildError> {
        if inner.is_empty() {
            return Err(BuildError::EmptyBody { combinator: "lookahead" });
        }
        self.push(Node::Lookahead(Box::new(inner), sense))
    }

    /// Discard bytes one at a time until `inner` matches.
    pub fn eventually(self, inner: Program) -> Result<Self, BuildError> {
        if inner.is_empty() {
            return Err(BuildError::EmptyBody { combinator: "eventually" });
        }
        self.push(Node::Eventually(Box::new(inner)))
    }

    /// Call out to another named combinator in the same grammar.
    pub fn parsec_local(self, name: impl Into<String>) -> Result<Self, BuildError> {
        self.push(Node::Parsec(ParsecTarget::Local(name.into())))
    }

    /// Call out to a named combinator published by another module.
    pub fn parsec_remote(self, module: impl Into<String>, name: impl Into<String>) -> Result<Self, BuildError> {
        self.push(Node::Parsec(ParsecTarget::Remote {
            module: module.into(),
            name: name.into(),
        }))
    }

    // -- derived operations (§4.1) -------------------------------------
    // Every one of these is defined strictly in terms of the primitives above.

    /// `optional(x) ≡ choice([x, empty])`.
    pub fn optional(self, inner: Program) -> Result<Self, BuildError> {
        self.choice(vec![inner, Program::new()], None)
    }

    /// `duplicate(x, n) ≡ x` repeated `n` times in sequence.
    pub fn duplicate(self, inner: Program, n: usize) -> Result<Self, BuildError> {
        if n == 0 {
            return Err(BuildError::NonPositiveCount { combinator: "duplicate" });
        }
        let mut out = self;
        for _ in 0..n {
            out = out.then(inner.clone())?;
        }
        Ok(out)
    }

    /// `wrap(inner) ≡` a post-traverse that replaces `inner`'s tokens with a
    /// single token: the list of everything `inner` produced, in forward order.
    pub fn wrap(self, inner: Program) -> Result<Self, BuildError> {
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, _pos| {
            let mut forward = new_tokens;
            forward.reverse();
            Ok((vec![Value::List(forward)], ctx))
        });
        self.traverse_post(inner, vec![op])
    }

    /// `tag(inner, t) ≡` a post-traverse producing `[(t, reverse(acc))]`.
    pub fn tag(self, inner: Program, t: impl Into<String>) -> Result<Self, BuildError> {
        let t = t.into();
        let op: TraverseOp = Rc::new(move |_rest, new_tokens, ctx, _pos| {
            let mut forward = new_tokens;
            forward.reverse();
            Ok((vec![Value::Tagged(t.clone(), Box::new(Value::List(forward)))], ctx))
        });
        self.traverse_post(inner, vec![op])
    }

    /// `unwrap_and_tag(inner, t)`: asserts `inner` produced exactly one token and
    /// tags it, failing (at parse time) rather than panicking if it did not.
    pub fn unwrap_and_tag(self, inner: Program, t: impl Into<String>) -> Result<Self, BuildError> {
        let t = t.into();
        let op: TraverseOp = Rc::new(move |_rest, mut new_tokens, ctx, _pos| {
            if new_tokens.len() != 1 {
                return Err(format!(
                    "expected exactly one token to tag as {t:?}, got {}",
                    new_tokens.len()
                ));
            }
            let only = new_tokens.pop().expect("length checked above");
            Ok((vec![Value::Tagged(t.clone(), Box::new(only))], ctx))
        });
        self.traverse_post(inner, vec![op])
    }

    /// `ignore(inner) ≡` a constant traverse producing `[]`.
    pub fn ignore(self, inner: Program) -> Result<Self, BuildError> {
        self.traverse_constant(inner, vec![])
    }

    /// `replace(inner, v) ≡` a constant traverse producing `[v]`.
    pub fn replace(self, inner: Program, v: Value) -> Result<Self, BuildError> {
        self.traverse_constant(inner, vec![v])
    }

    /// `byte_offset(inner) ≡` a post-traverse pairing `reverse(acc)` with position.
    pub fn byte_offset(self, inner: Program) -> Result<Self, BuildError> {
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, pos| {
            let mut forward = new_tokens;
            forward.reverse();
            Ok((vec![Value::Positioned(Box::new(Value::List(forward)), pos)], ctx))
        });
        self.traverse_post(inner, vec![op])
    }

    /// `line(inner) ≡` a post-traverse pairing `reverse(acc)` with position.
    pub fn line(self, inner: Program) -> Result<Self, BuildError> {
        self.byte_offset(inner)
    }

    fn repeated_char_list(
        ranges: Vec<RangeSpec>,
        modifier: Modifier,
        min: usize,
        max: usize,
    ) -> Result<Program, BuildError> {
        if min > max {
            return Err(BuildError::InvalidMinMax { min, max });
        }
        let one = || Program::new().bin_segment(ranges.clone(), vec![], modifier);
        let mut body = Program::new();
        for _ in 0..min {
            body = body.then(one()?)?;
        }
        if max > min {
            body = body.times(one()?, max - min)?;
        }
        Program::new().wrap(body)
    }

    /// `n` mandatory ASCII digits, folded into a single integer token.
    ///
    /// `acc[i]` (the `i`-th digit counting from the least significant, i.e. the
    /// last one matched) contributes `acc[i] * 10^i`.
    pub fn integer(self, n: usize) -> Result<Self, BuildError> {
        if n == 0 {
            return Err(BuildError::NonPositiveCount { combinator: "integer" });
        }
        let body = Program::repeated_char_list(vec![RangeSpec::from_bytes(b'0'..=b'9')?], Modifier::Integer, n, n)?;
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, _pos| {
            fold_digit_list(new_tokens).map(|v| (vec![v], ctx))
        });
        self.traverse_post(body, vec![op])
    }

    /// `min` mandatory digits followed by up to `max - min` optional digits,
    /// folded into a single integer token using however many digits actually matched.
    pub fn integer_range(self, min: usize, max: usize) -> Result<Self, BuildError> {
        if min > max {
            return Err(BuildError::InvalidMinMax { min, max });
        }
        let body = Program::repeated_char_list(vec![RangeSpec::from_bytes(b'0'..=b'9')?], Modifier::Integer, min, max)?;
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, _pos| {
            fold_digit_list(new_tokens).map(|v| (vec![v], ctx))
        });
        self.traverse_post(body, vec![op])
    }

    /// `n` mandatory ASCII characters drawn from `ranges`, concatenated into a string token.
    pub fn ascii_string(self, ranges: Vec<RangeSpec>, n: usize) -> Result<Self, BuildError> {
        if n == 0 {
            return Err(BuildError::NonPositiveCount { combinator: "ascii_string" });
        }
        let body = Program::repeated_char_list(ranges, Modifier::Integer, n, n)?;
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, _pos| fold_byte_list(new_tokens).map(|v| (vec![v], ctx)));
        self.traverse_post(body, vec![op])
    }

    /// `min..=max` ASCII characters drawn from `ranges`, concatenated into a string token.
    pub fn ascii_string_range(self, ranges: Vec<RangeSpec>, min: usize, max: usize) -> Result<Self, BuildError> {
        if min > max {
            return Err(BuildError::InvalidMinMax { min, max });
        }
        let body = Program::repeated_char_list(ranges, Modifier::Integer, min, max)?;
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, _pos| fold_byte_list(new_tokens).map(|v| (vec![v], ctx)));
        self.traverse_post(body, vec![op])
    }

    /// `n` mandatory UTF-8 codepoints drawn from `ranges`, concatenated into a string token.
    pub fn utf8_string(self, ranges: Vec<RangeSpec>, n: usize) -> Result<Self, BuildError> {
        if n == 0 {
            return Err(BuildError::NonPositiveCount { combinator: "utf8_string" });
        }
        let body = Program::repeated_char_list(ranges, Modifier::Utf8, n, n)?;
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, _pos| fold_codepoint_list(new_tokens).map(|v| (vec![v], ctx)));
        self.traverse_post(body, vec![op])
    }

    /// `min..=max` UTF-8 codepoints drawn from `ranges`, concatenated into a string token.
    pub fn utf8_string_range(self, ranges: Vec<RangeSpec>, min: usize, max: usize) -> Result<Self, BuildError> {
        if min > max {
            return Err(BuildError::InvalidMinMax { min, max });
        }
        let body = Program::repeated_char_list(ranges, Modifier::Utf8, min, max)?;
        let op: TraverseOp = Rc::new(|_rest, new_tokens, ctx, _pos| fold_codepoint_list(new_tokens).map(|v| (vec![v], ctx)));
        self.traverse_post(body, vec![op])
    }
}

fn unwrap_digit_list(new_tokens: Vec<Value>) -> Result<Vec<Value>, String> {
    let mut iter = new_tokens.into_iter();
    let head = iter.next().ok_or_else(|| "expected a digit list".to_string())?;
    match head {
        Value::List(items) => Ok(items),
        _ => Err("expected a digit list".to_string()),
    }
}

fn fold_digit_list(new_tokens: Vec<Value>) -> Result<Value, String> {
    let digits = unwrap_digit_list(new_tokens)?;
    let mut value: i64 = 0;
    for d in digits {
        match d {
            Value::Int(n) => value = value * 10 + (n - i64::from(b'0')),
            _ => return Err("expected a digit".to_string()),
        }
    }
    Ok(Value::Int(value))
}

fn fold_byte_list(new_tokens: Vec<Value>) -> Result<Value, String> {
    let chars = unwrap_digit_list(new_tokens)?;
    let mut bytes = Vec::with_capacity(chars.len());
    for c in chars {
        match c {
            Value::Int(n) => bytes.push(n as u8),
            _ => return Err("expected a byte".to_string()),
        }
    }
    Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
}

fn fold_codepoint_list(new_tokens: Vec<Value>) -> Result<Value, String> {
    let chars = unwrap_digit_list(new_tokens)?;
    let mut s = String::with_capacity(chars.len());
    for c in chars {
        match c {
            Value::Int(n) => {
                let cp = u32::try_from(n).map_err(|_| "codepoint out of range".to_string())?;
                let ch = char::from_u32(cp).ok_or_else(|| "invalid codepoint".to_string())?;
                s.push(ch);
            }
            _ => return Err("expected a codepoint".to_string()),
        }
    }
    Ok(Value::Str(s))
}
