//! Drawing a random byte string that a [`Program`] accepts.
//!
//! Walks the IR the same way the compiler does, but instead of matching against
//! input it manufactures input: a `bin_segment` draws a random codepoint from its
//! allowed ranges, a `choice` picks an alternative (weighted, if weights were given),
//! a `repeat` draws its own repetition count. `traverse` and `label` are transparent
//! wrappers here exactly as they are structurally; `lookahead` contributes nothing,
//! since it never consumes on the input side either.
//!
//! This gives *no* soundness guarantee when a `traverse` validates its input or when
//! a grammar's alternatives overlap in ways the generator can't see — it is a fuzzing
//! aid, not a prover.

use crate::error::BuildError;
use crate::ir::{GenTimes, Modifier, Node, ParsecTarget, Program, RangeSpec};
use rand::Rng;
use std::fmt;

const MAX_SEGMENT_RETRIES: usize = 1000;

/// A problem encountered while generating, distinct from [`BuildError`] because it
/// can only happen after a program has already compiled successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    /// A `bin_segment`'s `inclusive` ranges, minus `exclusive`, describe no codepoints
    /// reachable within a bounded number of draws.
    UnsatisfiableSegment,
    /// A drawn codepoint was not a valid Unicode scalar value for the segment's modifier.
    InvalidCodepoint,
    /// `parsec_local` has no reachable IR to generate from outside a [`crate::registry::Grammar`].
    UnreachableParsec {
        /// The name the `parsec` node referenced.
        name: String,
    },
    /// `parsec_remote` referenced a module/name pair the supplied [`ParsecResolver`]
    /// could not resolve.
    UnresolvedRemote {
        /// The module name referenced.
        module: String,
        /// The name referenced within that module.
        name: String,
    },
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenError::UnsatisfiableSegment => write!(f, "no codepoint satisfies this segment's ranges"),
            GenError::InvalidCodepoint => write!(f, "drew a codepoint with no valid Unicode scalar value"),
            GenError::UnreachableParsec { name } => {
                write!(f, "parsec({name:?}) has no reachable IR for generation outside a grammar")
            }
            GenError::UnresolvedRemote { module, name } => {
                write!(f, "parsec_remote({module:?}, {name:?}) did not resolve through the supplied resolver")
            }
        }
    }
}

impl std::error::Error for GenError {}

impl From<BuildError> for GenError {
    fn from(_: BuildError) -> Self {
        GenError::UnsatisfiableSegment
    }
}

/// How a `parsec_remote` node looks up another module's published IR during
/// generation. [`crate::registry::CompiledGrammar::exported_program`] is the usual
/// source of truth; `()` refuses every lookup, which is correct for a lone
/// [`Program`] generated outside any grammar.
pub trait ParsecResolver {
    /// Look up the IR published for `module::name`, if any.
    fn resolve(&self, module: &str, name: &str) -> Option<&Program>;
}

impl ParsecResolver for () {
    fn resolve(&self, _module: &str, _name: &str) -> Option<&Program> {
        None
    }
}

/// Generate a random byte string `program` accepts, using `resolver` to look up
/// `parsec_remote` targets. Pass `&()` when `program` makes no remote calls.
pub fn generate(program: &Program, rng: &mut impl Rng, resolver: &impl ParsecResolver) -> Result<Vec<u8>, GenError> {
    let mut out = Vec::new();
    generate_nodes(program.nodes(), rng, resolver, &mut out)?;
    Ok(out)
}

fn generate_nodes(
    nodes: &[Node],
    rng: &mut impl Rng,
    resolver: &impl ParsecResolver,
    out: &mut Vec<u8>,
) -> Result<(), GenError> {
    for node in nodes {
        generate_node(node, rng, resolver, out)?;
    }
    Ok(())
}

fn generate_node(
    node: &Node,
    rng: &mut impl Rng,
    resolver: &impl ParsecResolver,
    out: &mut Vec<u8>,
) -> Result<(), GenError> {
    match node {
        Node::StringLit(bytes) => {
            out.extend_from_slice(bytes);
            Ok(())
        }
        Node::Bytes(n) => {
            out.extend((0..*n).map(|_| rng.gen::<u8>()));
            Ok(())
        }
        Node::Eos => Ok(()),
        Node::BinSegment {
            inclusive,
            exclusive,
            modifier,
        } => {
            let codepoint = pick_codepoint(rng, inclusive, exclusive)?;
            encode_codepoint(codepoint, *modifier, out)
        }
        Node::Label(inner, _) | Node::Traverse(inner, _) => generate_nodes(inner.nodes(), rng, resolver, out),
        Node::Choice(alternatives, weights) => {
            let index = match weights {
                Some(w) => weighted_index(rng, w),
                None => rng.gen_range(0..alternatives.len()),
            };
            generate_nodes(alternatives[index].nodes(), rng, resolver, out)
        }
        Node::Repeat(inner, _while_call, gen_times) => {
            let count = draw_count(rng, *gen_times);
            for _ in 0..count {
                generate_nodes(inner.nodes(), rng, resolver, out)?;
            }
            Ok(())
        }
        Node::Times(inner, max) => {
            let count = rng.gen_range(0..=*max);
            for _ in 0..count {
                generate_nodes(inner.nodes(), rng, resolver, out)?;
            }
            Ok(())
        }
        Node::Lookahead(..) => Ok(()),
        Node::Eventually(inner) => generate_nodes(inner.nodes(), rng, resolver, out),
        Node::Parsec(ParsecTarget::Local(name)) => Err(GenError::UnreachableParsec { name: name.clone() }),
        Node::Parsec(ParsecTarget::Remote { module, name }) => match resolver.resolve(module, name) {
            Some(target) => generate_nodes(target.nodes(), rng, resolver, out),
            None => Err(GenError::UnresolvedRemote {
                module: module.clone(),
                name: name.clone(),
            }),
        },
    }
}

fn draw_count(rng: &mut impl Rng, gen_times: GenTimes) -> usize {
    match gen_times {
        GenTimes::Exact(n) => n,
        GenTimes::Range(min, max) => rng.gen_range(min..=max),
        GenTimes::Default => rng.gen_range(0..=3),
    }
}

fn weighted_index(rng: &mut impl Rng, weights: &[u32]) -> usize {
    let total: u32 = weights.iter().sum();
    if total == 0 {
        return rng.gen_range(0..weights.len());
    }
    let mut draw = rng.gen_range(0..total);
    for (index, weight) in weights.iter().enumerate() {
        if draw < *weight {
            return index;
        }
        draw -= *weight;
    }
    weights.len() - 1
}

fn pick_codepoint(rng: &mut impl Rng, inclusive: &[RangeSpec], exclusive: &[RangeSpec]) -> Result<u32, GenError> {
    let fallback = [RangeSpec::new(0, 255).expect("0..=255 is always a valid range")];
    let ranges: &[RangeSpec] = if inclusive.is_empty() { &fallback } else { inclusive };
    let span: u64 = ranges.iter().map(|r| u64::from(r.end() - r.start()) + 1).sum();
    for _ in 0..MAX_SEGMENT_RETRIES {
        let mut offset = rng.gen_range(0..span);
        let mut codepoint = None;
        for range in ranges {
            let width = u64::from(range.end() - range.start()) + 1;
            if offset < width {
                codepoint = Some(range.start() + offset as u32);
                break;
            }
            offset -= width;
        }
        let codepoint = codepoint.expect("offset is always within the summed span");
        if !exclusive.iter().any(|r| r.contains(codepoint)) {
            return Ok(codepoint);
        }
    }
    Err(GenError::UnsatisfiableSegment)
}

fn encode_codepoint(codepoint: u32, modifier: Modifier, out: &mut Vec<u8>) -> Result<(), GenError> {
    match modifier {
        Modifier::Integer => {
            out.push(codepoint as u8);
            Ok(())
        }
        Modifier::Utf8 => {
            let ch = char::from_u32(codepoint).ok_or(GenError::InvalidCodepoint)?;
            let mut buf = [0u8; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            Ok(())
        }
        Modifier::Utf16 => {
            char::from_u32(codepoint).ok_or(GenError::InvalidCodepoint)?;
            if codepoint > 0xFFFF {
                let shifted = codepoint - 0x10000;
                let high = 0xD800 + (shifted >> 10);
                let low = 0xDC00 + (shifted & 0x3FF);
                out.extend_from_slice(&(high as u16).to_be_bytes());
                out.extend_from_slice(&(low as u16).to_be_bytes());
            } else {
                out.extend_from_slice(&(codepoint as u16).to_be_bytes());
            }
            Ok(())
        }
        Modifier::Utf32 => {
            char::from_u32(codepoint).ok_or(GenError::InvalidCodepoint)?;
            out.extend_from_slice(&codepoint.to_be_bytes());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileOptions;
    use crate::parser::ParseOptions;
    use rand::SeedableRng;

    fn generated_input_reparses(program: &Program, seed: u64) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let bytes = generate(program, &mut rng, &()).expect("generation succeeds");
        let parser = crate::parser::Parser::compile(program, CompileOptions::default()).unwrap();
        let result = parser.parse(&bytes, ParseOptions::default());
        assert!(result.is_ok(), "generated {bytes:?} did not reparse: {result:?}");
    }

    #[test]
    fn literal_round_trips() {
        let program = Program::new().string("hello").unwrap();
        generated_input_reparses(&program, 1);
    }

    #[test]
    fn bin_segment_round_trips_for_many_seeds() {
        let program = Program::new()
            .ascii_char(b'a'..=b'z')
            .unwrap()
            .eos()
            .unwrap();
        for seed in 0..20 {
            generated_input_reparses(&program, seed);
        }
    }

    #[test]
    fn choice_and_repeat_round_trip() {
        let digit = Program::new().ascii_char(b'0'..=b'9').unwrap();
        let letter = Program::new().ascii_char(b'a'..=b'z').unwrap();
        let one = Program::new().choice(vec![digit, letter], None).unwrap();
        let program = Program::new()
            .repeat(one, None, GenTimes::Range(1, 5))
            .unwrap();
        for seed in 0..20 {
            generated_input_reparses(&program, seed);
        }
    }

    #[test]
    fn local_parsec_is_unreachable_for_a_standalone_program() {
        let program = Program::new().parsec_local("x").unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let err = generate(&program, &mut rng, &()).unwrap_err();
        assert!(matches!(err, GenError::UnreachableParsec { .. }));
    }
}
