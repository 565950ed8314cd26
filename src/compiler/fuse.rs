//! Bound-prefix fusion.
//!
//! A maximal run of bound nodes (`bin_segment`, `string`, `bytes`, `eos`) is lowered
//! to a single [`FusedMatch`]: a list of [`MatchStep`]s executed back to back with no
//! re-entry into the general clause dispatch between them. This is the optimization
//! the rest of the compiler exists to preserve — see module docs on
//! [`crate::compiler`].

use crate::error::Failure;
use crate::ir::{Modifier, Node, RangeSpec};
use crate::runtime::{ParseState, StageResult, Value};

/// One step of a fused match: decode/compare, then advance.
#[derive(Clone)]
pub(crate) enum MatchStep {
    /// Match a literal byte sequence.
    Literal(Vec<u8>),
    /// Match any `n` bytes, unconditionally.
    AnyBytes(usize),
    /// Decode one codepoint per `modifier` and check it against the guard.
    Segment {
        inclusive: Vec<RangeSpec>,
        exclusive: Vec<RangeSpec>,
        modifier: Modifier,
    },
    /// Assert the input is empty.
    Eos,
}

/// A maximal run of bound nodes, compiled into one guarded pattern match.
#[derive(Clone, Default)]
pub(crate) struct FusedMatch {
    steps: Vec<MatchStep>,
}

impl FusedMatch {
    pub(crate) fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn push(&mut self, step: MatchStep) {
        self.steps.push(step);
    }

    /// Run every step against `state.input`, producing the tokens bound nodes emit
    /// (in production order) and the advanced state, or the first failure.
    pub(crate) fn run<'i>(&self, state: ParseState<'i>) -> StageResult<'i> {
        // A fused run is one guarded pattern match: if any step fails, the whole
        // run fails as if nothing in it had matched, reporting the failure at the
        // run's entry position rather than wherever inside it the mismatch fell.
        // This lets a `choice` backtrack past a multi-step bound prefix exactly as
        // it would past a single bound node.
        let entry_input = state.input;
        let entry_position = state.position;
        let mut input = state.input;
        let mut position = state.position;
        let mut produced = Vec::new();
        for step in &self.steps {
            match step.apply(input) {
                Ok(StepMatch { consumed, token }) => {
                    let new_position = position.advance(input, consumed);
                    input = &input[consumed..];
                    position = new_position;
                    if let Some(token) = token {
                        produced.push(token);
                    }
                }
                Err(reason) => {
                    return Err(Failure::new(
                        reason,
                        entry_input,
                        state.ctx,
                        entry_position,
                        entry_position.byte_offset,
                    ));
                }
            }
        }
        let mut acc = produced;
        acc.reverse();
        acc.extend(state.acc);
        Ok(ParseState {
            input,
            acc,
            ctx: state.ctx,
            position,
        })
    }
}

struct StepMatch {
    consumed: usize,
    token: Option<Value>,
}

impl MatchStep {
    fn apply(&self, input: &[u8]) -> Result<StepMatch, String> {
        match self {
            MatchStep::Literal(lit) => {
                if input.len() >= lit.len() && &input[..lit.len()] == lit.as_slice() {
                    Ok(StepMatch {
                        consumed: lit.len(),
                        token: Some(Value::Bytes(lit.clone())),
                    })
                } else {
                    Err(format!("expected a string {:?}", String::from_utf8_lossy(lit)))
                }
            }
            MatchStep::AnyBytes(n) => {
                if input.len() >= *n {
                    Ok(StepMatch {
                        consumed: *n,
                        token: Some(Value::Bytes(input[..*n].to_vec())),
                    })
                } else {
                    Err(format!("expected {n} bytes"))
                }
            }
            MatchStep::Eos => {
                if input.is_empty() {
                    Ok(StepMatch {
                        consumed: 0,
                        token: None,
                    })
                } else {
                    Err("expected end of string".to_string())
                }
            }
            MatchStep::Segment {
                inclusive,
                exclusive,
                modifier,
            } => {
                let (codepoint, consumed) =
                    decode(input, *modifier).ok_or_else(|| default_reason(inclusive, *modifier))?;
                if segment_matches(codepoint, inclusive, exclusive) {
                    Ok(StepMatch {
                        consumed,
                        token: Some(Value::Int(codepoint as i64)),
                    })
                } else {
                    Err(default_reason(inclusive, *modifier))
                }
            }
        }
    }
}

fn segment_matches(codepoint: u32, inclusive: &[RangeSpec], exclusive: &[RangeSpec]) -> bool {
    let included = inclusive.is_empty() || inclusive.iter().any(|r| r.contains(codepoint));
    let excluded = exclusive.iter().any(|r| r.contains(codepoint));
    included && !excluded
}

fn default_reason(inclusive: &[RangeSpec], modifier: Modifier) -> String {
    let kind = match modifier {
        Modifier::Integer => "ASCII character",
        Modifier::Utf8 | Modifier::Utf16 | Modifier::Utf32 => "UTF-8 character",
    };
    if inclusive.is_empty() {
        return kind.to_string();
    }
    let parts: Vec<String> = inclusive
        .iter()
        .map(|r| {
            if r.start() == r.end() {
                format!("'{}'", display_codepoint(r.start()))
            } else {
                format!("'{}' to '{}'", display_codepoint(r.start()), display_codepoint(r.end()))
            }
        })
        .collect();
    format!("{kind} in the range {}", parts.join(" or "))
}

fn display_codepoint(cp: u32) -> String {
    char::from_u32(cp).map(String::from).unwrap_or_else(|| format!("U+{cp:04X}"))
}

/// Decode one codepoint from the front of `input` per `modifier`. Returns
/// `(codepoint, bytes_consumed)`, or `None` if there is not enough valid input.
fn decode(input: &[u8], modifier: Modifier) -> Option<(u32, usize)> {
    match modifier {
        Modifier::Integer => input.first().map(|&b| (b as u32, 1)),
        Modifier::Utf8 => decode_utf8(input),
        Modifier::Utf16 => decode_utf16(input),
        Modifier::Utf32 => decode_utf32(input),
    }
}

fn decode_utf8(input: &[u8]) -> Option<(u32, usize)> {
    let b0 = *input.first()?;
    let (len, mut cp) = if b0 < 0x80 {
        (1, b0 as u32)
    } else if b0 & 0xE0 == 0xC0 {
        (2, (b0 & 0x1F) as u32)
    } else if b0 & 0xF0 == 0xE0 {
        (3, (b0 & 0x0F) as u32)
    } else if b0 & 0xF8 == 0xF0 {
        (4, (b0 & 0x07) as u32)
    } else {
        return None;
    };
    if input.len() < len {
        return None;
    }
    for &b in &input[1..len] {
        if b & 0xC0 != 0x80 {
            return None;
        }
        cp = (cp << 6) | (b & 0x3F) as u32;
    }
    char::from_u32(cp)?;
    Some((cp, len))
}

fn decode_utf16(input: &[u8]) -> Option<(u32, usize)> {
    if input.len() < 2 {
        return None;
    }
    let unit = u16::from_be_bytes([input[0], input[1]]);
    if (0xD800..=0xDBFF).contains(&unit) {
        if input.len() < 4 {
            return None;
        }
        let low = u16::from_be_bytes([input[2], input[3]]);
        if !(0xDC00..=0xDFFF).contains(&low) {
            return None;
        }
        let cp = 0x10000 + (((unit as u32 - 0xD800) << 10) | (low as u32 - 0xDC00));
        Some((cp, 4))
    } else if (0xDC00..=0xDFFF).contains(&unit) {
        None
    } else {
        Some((unit as u32, 2))
    }
}

fn decode_utf32(input: &[u8]) -> Option<(u32, usize)> {
    if input.len() < 4 {
        return None;
    }
    let cp = u32::from_be_bytes([input[0], input[1], input[2], input[3]]);
    char::from_u32(cp)?;
    Some((cp, 4))
}

/// Whether `node` is bound: can contribute a [`MatchStep`] to a [`FusedMatch`].
pub(crate) fn is_bound(node: &Node) -> bool {
    matches!(
        node,
        Node::BinSegment { .. } | Node::StringLit(_) | Node::Bytes(_) | Node::Eos
    )
}

/// Lower a bound node to its [`MatchStep`]. Panics if `node` is not bound;
/// callers must check with [`is_bound`] first.
pub(crate) fn lower_step(node: &Node) -> MatchStep {
    match node {
        Node::StringLit(bytes) => MatchStep::Literal(bytes.clone()),
        Node::Bytes(n) => MatchStep::AnyBytes(*n),
        Node::Eos => MatchStep::Eos,
        Node::BinSegment {
            inclusive,
            exclusive,
            modifier,
        } => MatchStep::Segment {
            inclusive: inclusive.clone(),
            exclusive: exclusive.clone(),
            modifier: *modifier,
        },
        _ => unreachable!("lower_step called on an unbound node"),
    }
}
