//! Lowering a [`crate::ir::Program`] into something that can actually run.
//!
//! The IR is a flat, logically-ordered list of nodes. Compiling it walks that list
//! once, fusing every maximal run of bound nodes (see [`fuse`]) into a single
//! [`fuse::FusedMatch`] clause, and recursively compiling everything else (choices,
//! repeats, traversals, ...) into its own nested [`CompiledProgram`]. The result is a
//! flat `Vec<Clause>` interpreted by [`CompiledProgram::run`]: a driver loop, not a
//! tree walk, so a long straight-line grammar costs one dispatch per fused run rather
//! than one per node.

mod fuse;
mod trace;

use crate::error::{BuildError, Failure};
use crate::ir::{Node, ParsecTarget, Program, Sense, TraverseBody};
use crate::runtime::{ParseState, StageResult, Value, WhileCall, WhileVerdict};
use fuse::FusedMatch;
use std::cell::RefCell;
use std::rc::Rc;

/// Knobs that change how a [`Program`] is lowered, without changing what it matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Collapse a compiled program that is nothing but a single `parsec` redirect
    /// into a direct reference to its target, skipping the extra indirection.
    pub inline: bool,
    /// Print each clause's entry/exit to stderr as it runs. Only has an effect when
    /// the `debug` feature is enabled; otherwise this flag is accepted and ignored.
    pub debug: bool,
}

/// A resolved, but not yet filled in, `parsec` target: a shared cell a
/// [`crate::registry::Grammar`] fills in once every member has been compiled,
/// so mutually- and self-referential definitions can call each other.
pub(crate) type ParsecSlot = Rc<RefCell<Option<Rc<CompiledProgram>>>>;

/// Resolves a [`ParsecTarget`] to the slot that will eventually hold its compiled
/// program. A standalone [`compile`] call has no such table and rejects every
/// `parsec` node outright by passing `None` here.
pub(crate) type Resolver<'a> = dyn Fn(&ParsecTarget) -> Result<ParsecSlot, BuildError> + 'a;

/// One entry of the flat clause list a [`CompiledProgram`] runs.
#[derive(Clone)]
pub(crate) enum Clause {
    /// A maximal run of bound nodes, matched in one guarded pass.
    Match(FusedMatch),
    /// First-match-wins; backtracks only on a zero-consumption failure.
    Choice { alts: Vec<Rc<CompiledProgram>> },
    /// Zero or more repetitions of `inner`, gated by an optional continuation test.
    Repeat {
        inner: Rc<CompiledProgram>,
        while_call: Option<WhileCall>,
    },
    /// Up to `max` optional repetitions of `inner`.
    Times { inner: Rc<CompiledProgram>, max: usize },
    /// A non-consuming assertion.
    Lookahead { inner: Rc<CompiledProgram>, sense: Sense },
    /// Discard bytes one at a time until `inner` matches.
    Eventually { inner: Rc<CompiledProgram> },
    /// Rewrite the tokens `inner` produced.
    Traverse {
        inner: Rc<CompiledProgram>,
        body: TraverseBody,
    },
    /// Relabel `inner`'s zero-width failure.
    Label { inner: Rc<CompiledProgram>, text: String },
    /// Call out to another compiled program, resolved after every grammar member
    /// has had a first compilation pass.
    Parsec(ParsecSlot),
}

fn clause_label(clause: &Clause) -> &'static str {
    match clause {
        Clause::Match(_) => "match",
        Clause::Choice { .. } => "choice",
        Clause::Repeat { .. } => "repeat",
        Clause::Times { .. } => "times",
        Clause::Lookahead { .. } => "lookahead",
        Clause::Eventually { .. } => "eventually",
        Clause::Traverse { .. } => "traverse",
        Clause::Label { .. } => "label",
        Clause::Parsec(_) => "parsec",
    }
}

impl Clause {
    fn run<'i>(&self, state: ParseState<'i>) -> StageResult<'i> {
        match self {
            Clause::Match(fused) => fused.run(state),
            Clause::Choice { alts } => run_choice(alts, state),
            Clause::Repeat { inner, while_call } => run_repeat(inner, while_call.as_ref(), state),
            Clause::Times { inner, max } => run_times(inner, *max, state),
            Clause::Lookahead { inner, sense } => run_lookahead(inner, *sense, state),
            Clause::Eventually { inner } => run_eventually(inner, state),
            Clause::Traverse { inner, body } => run_traverse(inner, body, state),
            Clause::Label { inner, text } => run_label(inner, text, state),
            Clause::Parsec(slot) => {
                let program = slot
                    .borrow()
                    .clone()
                    .expect("parsec slot resolved before any clause referencing it runs");
                program.run(state)
            }
        }
    }
}

fn run_choice<'i>(alts: &[Rc<CompiledProgram>], state: ParseState<'i>) -> StageResult<'i> {
    let entry_offset = state.position.byte_offset;
    let mut last_err = None;
    for alt in alts {
        match alt.run(state.clone()) {
            Ok(next) => return Ok(next),
            Err(fail) => {
                if fail.consumed() == entry_offset {
                    last_err = Some(fail);
                } else {
                    return Err(fail);
                }
            }
        }
    }
    Err(last_err.expect("choice always has at least one alternative"))
}

fn run_repeat<'i>(
    inner: &Rc<CompiledProgram>,
    while_call: Option<&WhileCall>,
    mut state: ParseState<'i>,
) -> StageResult<'i> {
    loop {
        let entry_offset = state.position.byte_offset;
        let next = match inner.run(state.clone()) {
            Ok(next) => next,
            Err(_) => break,
        };
        let made_progress = next.position.byte_offset > entry_offset;
        let verdict = while_call.map(|f| f(next.input, next.ctx.clone(), next.position));
        state = next;
        let halt = match verdict {
            Some(WhileVerdict::Cont(ctx)) => {
                state.ctx = ctx;
                false
            }
            Some(WhileVerdict::Halt(ctx)) => {
                state.ctx = ctx;
                true
            }
            None => false,
        };
        if !made_progress || halt {
            break;
        }
    }
    Ok(state)
}

fn run_times<'i>(inner: &Rc<CompiledProgram>, max: usize, mut state: ParseState<'i>) -> StageResult<'i> {
    for _ in 0..max {
        match inner.run(state.clone()) {
            Ok(next) => state = next,
            Err(_) => break,
        }
    }
    Ok(state)
}

fn run_lookahead<'i>(inner: &Rc<CompiledProgram>, sense: Sense, state: ParseState<'i>) -> StageResult<'i> {
    let probe = state.clone();
    let result = inner.run(probe);
    match (sense, result) {
        (Sense::Positive, Ok(_)) => Ok(state),
        (Sense::Positive, Err(fail)) => Err(Failure::new(
            fail.reason().to_string(),
            state.input,
            state.ctx,
            state.position,
            state.position.byte_offset,
        )),
        (Sense::Negative, Ok(_)) => Err(Failure::new(
            "unexpected",
            state.input,
            state.ctx,
            state.position,
            state.position.byte_offset,
        )),
        (Sense::Negative, Err(_)) => Ok(state),
    }
}

fn run_eventually<'i>(inner: &Rc<CompiledProgram>, mut state: ParseState<'i>) -> StageResult<'i> {
    loop {
        match inner.run(state.clone()) {
            Ok(next) => return Ok(next),
            Err(_) => {
                if state.input.is_empty() {
                    return Err(Failure::new(
                        "expected ... eventually",
                        state.input,
                        state.ctx,
                        state.position,
                        state.position.byte_offset,
                    ));
                }
                state = state.consume(1);
            }
        }
    }
}

fn run_traverse<'i>(inner: &Rc<CompiledProgram>, body: &TraverseBody, state: ParseState<'i>) -> StageResult<'i> {
    let entry_len = state.acc.len();
    let entry_position = state.position;
    let after = inner.run(state)?;
    let produced = after.acc.len() - entry_len;
    let mut new_tokens: Vec<Value> = after.acc[..produced].to_vec();
    let untouched = after.acc[produced..].to_vec();
    let mut ctx = after.ctx;
    match body {
        TraverseBody::Transform(phase, ops) => {
            let pos = match phase {
                crate::ir::Phase::Pre => entry_position,
                crate::ir::Phase::Post => after.position,
            };
            for op in ops {
                let ctx_for_failure = ctx.clone();
                match op(after.input, new_tokens, ctx, pos) {
                    Ok((tokens, next_ctx)) => {
                        new_tokens = tokens;
                        ctx = next_ctx;
                    }
                    Err(reason) => {
                        return Err(Failure::new(reason, after.input, ctx_for_failure, pos, pos.byte_offset));
                    }
                }
            }
        }
        TraverseBody::Constant(tokens) => {
            new_tokens = tokens.clone();
        }
    }
    let mut acc = new_tokens;
    acc.extend(untouched);
    Ok(ParseState {
        input: after.input,
        acc,
        ctx,
        position: after.position,
    })
}

fn run_label<'i>(inner: &Rc<CompiledProgram>, text: &str, state: ParseState<'i>) -> StageResult<'i> {
    let entry_offset = state.position.byte_offset;
    match inner.run(state) {
        Ok(next) => Ok(next),
        Err(fail) => {
            if fail.consumed() != entry_offset {
                return Err(fail);
            }
            let mut chain = fail.label_chain.clone();
            chain.push(text.to_string());
            let rendered = chain
                .iter()
                .rev()
                .cloned()
                .collect::<Vec<_>>()
                .join(", followed by ");
            Err(Failure {
                reason: format!("expected {rendered}"),
                label_chain: chain,
                ..fail
            })
        }
    }
}

/// A [`Program`] after lowering: a flat list of [`Clause`]s ready to run against a
/// [`ParseState`].
#[derive(Clone)]
pub struct CompiledProgram {
    clauses: Vec<Clause>,
    debug: bool,
}

impl std::fmt::Debug for CompiledProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("clauses", &self.clauses.len())
            .finish()
    }
}

impl CompiledProgram {
    pub(crate) fn run<'i>(&self, mut state: ParseState<'i>) -> StageResult<'i> {
        for clause in &self.clauses {
            let name = clause_label(clause);
            let entry_offset = state.position.byte_offset;
            trace::enter(self.debug, name, entry_offset);
            state = match clause.run(state) {
                Ok(next) => {
                    trace::exit_ok(self.debug, name, entry_offset, next.position.byte_offset);
                    next
                }
                Err(fail) => {
                    trace::exit_err(self.debug, name, fail.reason());
                    return Err(fail);
                }
            };
        }
        Ok(state)
    }
}

/// Compile a standalone [`Program`] with no surrounding registry.
///
/// Any `parsec` node is rejected immediately with [`BuildError::UndefinedParsec`],
/// since there is no name table to resolve it against; use
/// [`crate::registry::Grammar`] for grammars with named, possibly recursive, members.
pub fn compile(program: &Program, options: CompileOptions) -> Result<CompiledProgram, BuildError> {
    let compiled = compile_program(program, &options, None)?;
    Ok(match Rc::try_unwrap(compiled) {
        Ok(owned) => owned,
        Err(shared) => (*shared).clone(),
    })
}

pub(crate) fn compile_program(
    program: &Program,
    options: &CompileOptions,
    resolve: Option<&Resolver<'_>>,
) -> Result<Rc<CompiledProgram>, BuildError> {
    let clauses = compile_nodes(program.nodes(), options, resolve)?;
    Ok(Rc::new(CompiledProgram {
        clauses,
        debug: options.debug,
    }))
}

fn compile_nodes(
    nodes: &[Node],
    options: &CompileOptions,
    resolve: Option<&Resolver<'_>>,
) -> Result<Vec<Clause>, BuildError> {
    let mut clauses = Vec::new();
    let mut pending = FusedMatch::default();
    for node in nodes {
        if fuse::is_bound(node) {
            pending.push(fuse::lower_step(node));
            continue;
        }
        if !pending.is_empty() {
            clauses.push(Clause::Match(std::mem::take(&mut pending)));
        }
        clauses.push(compile_node(node, options, resolve)?);
    }
    if !pending.is_empty() {
        clauses.push(Clause::Match(pending));
    }
    Ok(clauses)
}

fn compile_node(node: &Node, options: &CompileOptions, resolve: Option<&Resolver<'_>>) -> Result<Clause, BuildError> {
    match node {
        Node::BinSegment { .. } | Node::StringLit(_) | Node::Bytes(_) | Node::Eos => {
            unreachable!("bound nodes are absorbed into a FusedMatch before reaching compile_node")
        }
        Node::Label(inner, text) => Ok(Clause::Label {
            inner: compile_program(inner, options, resolve)?,
            text: text.clone(),
        }),
        Node::Traverse(inner, TraverseBody::Constant(tokens)) => Ok(Clause::Traverse {
            inner: compile_program(peel_constant_chain(inner), options, resolve)?,
            body: TraverseBody::Constant(tokens.clone()),
        }),
        Node::Traverse(inner, body) => Ok(Clause::Traverse {
            inner: compile_program(inner, options, resolve)?,
            body: body.clone(),
        }),
        Node::Choice(alternatives, _weights) => {
            let alts = alternatives
                .iter()
                .map(|alt| compile_program(alt, options, resolve))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Clause::Choice { alts })
        }
        Node::Repeat(inner, while_call, _gen_times) => Ok(Clause::Repeat {
            inner: compile_program(inner, options, resolve)?,
            while_call: while_call.clone(),
        }),
        Node::Times(inner, max) => Ok(Clause::Times {
            inner: compile_program(inner, options, resolve)?,
            max: *max,
        }),
        Node::Lookahead(inner, sense) => Ok(Clause::Lookahead {
            inner: compile_program(inner, options, resolve)?,
            sense: *sense,
        }),
        Node::Eventually(inner) => Ok(Clause::Eventually {
            inner: compile_program(inner, options, resolve)?,
        }),
        Node::Parsec(target) => match resolve {
            Some(resolver) => {
                let slot = resolver(target)?;
                if options.inline {
                    if let Some(direct) = slot.borrow().clone() {
                        if direct.clauses.len() == 1 {
                            if let Clause::Parsec(inner_slot) = &direct.clauses[0] {
                                return Ok(Clause::Parsec(inner_slot.clone()));
                            }
                        }
                    }
                }
                Ok(Clause::Parsec(slot))
            }
            None => Err(BuildError::UndefinedParsec {
                name: match target {
                    ParsecTarget::Local(name) => name.clone(),
                    ParsecTarget::Remote { module, name } => format!("{module}::{name}"),
                },
            }),
        },
    }
}

/// Peel a chain of single-node `Traverse(_, Constant(_))` wrappers down to its
/// innermost body: the outer constants would only discard whatever the inner ones
/// produced, so compiling anything but the innermost body is wasted work.
fn peel_constant_chain(mut inner: &Program) -> &Program {
    while let [Node::Traverse(next, TraverseBody::Constant(_))] = inner.nodes() {
        inner = next;
    }
    inner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Modifier;
    use crate::runtime::{Context, Position};

    fn run<'i>(program: &Program, input: &'i [u8]) -> StageResult<'i> {
        let compiled = compile(program, CompileOptions::default()).expect("compiles");
        compiled.run(ParseState::new(input, Context::new(), Position::start()))
    }

    #[test]
    fn fuses_a_literal_and_reports_one_match_clause() {
        let program = Program::new().string("abc").unwrap().eos().unwrap();
        let compiled = compile(&program, CompileOptions::default()).unwrap();
        assert_eq!(compiled.clauses.len(), 1);
        assert!(matches!(compiled.clauses[0], Clause::Match(_)));
    }

    #[test]
    fn choice_backtracks_only_on_zero_consumption() {
        let a = Program::new().string("aa").unwrap();
        let b = Program::new().string("ab").unwrap();
        let program = Program::new().choice(vec![a, b], None).unwrap();
        let result = run(&program, b"ab");
        assert!(result.is_ok());
    }

    #[test]
    fn choice_does_not_backtrack_past_partial_consumption() {
        // A contiguous bound run ("a" then "x") fuses into one atomic match, so it
        // can only fail at its own entry offset -- fine for backtracking. Breaking
        // the run with a `label` forces a real non-zero-consumption failure instead.
        let a = Program::new()
            .string("a")
            .unwrap()
            .label(Program::new().string("x").unwrap(), "x")
            .unwrap();
        let b = Program::new().string("ab").unwrap();
        let program = Program::new().choice(vec![a, b], None).unwrap();
        // `a` consumes "a" then fails on "x" vs "b" -- that's non-zero consumption,
        // so `b` must never be tried even though it would have matched.
        let result = run(&program, b"ab");
        assert!(result.is_err());
    }

    #[test]
    fn repeat_stops_on_first_failure_and_keeps_prior_matches() {
        let digit = Program::new()
            .bin_segment(
                vec![crate::ir::RangeSpec::from_bytes(b'0'..=b'9').unwrap()],
                vec![],
                Modifier::Integer,
            )
            .unwrap();
        let program = Program::new().repeat(digit, None, crate::ir::GenTimes::Default).unwrap();
        let result = run(&program, b"12a").unwrap();
        assert_eq!(result.input, b"a");
        assert_eq!(result.acc.len(), 2);
    }

    #[test]
    fn repeat_while_can_halt_early_and_rewrite_context() {
        let digit = Program::new()
            .bin_segment(
                vec![crate::ir::RangeSpec::from_bytes(b'0'..=b'9').unwrap()],
                vec![],
                Modifier::Integer,
            )
            .unwrap();
        let while_call: WhileCall = Rc::new(|_rest, mut ctx, _pos| {
            let seen = match ctx.get("seen") {
                Some(Value::Int(n)) => *n,
                _ => 0,
            };
            ctx.set("seen", Value::Int(seen + 1));
            if seen + 1 >= 2 {
                WhileVerdict::Halt(ctx)
            } else {
                WhileVerdict::Cont(ctx)
            }
        });
        let program = Program::new()
            .repeat(digit, Some(while_call), crate::ir::GenTimes::Default)
            .unwrap();
        let compiled = compile(&program, CompileOptions::default()).unwrap();
        let result = compiled
            .run(ParseState::new(b"12345", Context::new(), Position::start()))
            .unwrap();
        assert_eq!(result.input, b"345");
        assert_eq!(result.ctx.get("seen"), Some(&Value::Int(2)));
    }

    #[test]
    fn repeat_guards_against_zero_width_bodies() {
        // `optional(x)` can match zero-width (the `empty` alternative) without
        // ever failing outright, so a naive `repeat` would spin forever.
        let maybe_x = Program::new().optional(Program::new().string("x").unwrap()).unwrap();
        let program = Program::new()
            .repeat(maybe_x, None, crate::ir::GenTimes::Default)
            .unwrap();
        let result = run(&program, b"xxy").unwrap();
        assert_eq!(result.input, b"y");
    }

    #[test]
    fn label_only_rewrites_zero_width_failures() {
        let digits = Program::new()
            .bin_segment(
                vec![crate::ir::RangeSpec::from_bytes(b'0'..=b'9').unwrap()],
                vec![],
                Modifier::Integer,
            )
            .unwrap();
        let labeled = Program::new().label(digits, "a digit").unwrap();
        let fail = run(&labeled, b"x").unwrap_err();
        assert_eq!(fail.reason(), "expected a digit");
    }

    #[test]
    fn positive_lookahead_does_not_consume() {
        let peek = Program::new().string("a").unwrap();
        let program = Program::new()
            .lookahead(peek, Sense::Positive)
            .unwrap()
            .string("ab")
            .unwrap();
        let result = run(&program, b"ab").unwrap();
        assert!(result.input.is_empty());
    }

    #[test]
    fn negative_lookahead_rejects_a_match() {
        let peek = Program::new().string("a").unwrap();
        let program = Program::new().lookahead(peek, Sense::Negative).unwrap();
        assert!(run(&program, b"abc").is_err());
        assert!(run(&program, b"xyz").is_ok());
    }

    #[test]
    fn eventually_skips_bytes_until_a_match() {
        let target = Program::new().string("!").unwrap();
        let program = Program::new().eventually(target).unwrap();
        let result = run(&program, b"abc!").unwrap();
        assert!(result.input.is_empty());
    }

    #[test]
    fn wrap_collects_tokens_in_forward_order() {
        let program = Program::new()
            .wrap(Program::new().integer(1).unwrap().integer(1).unwrap())
            .unwrap();
        let result = run(&program, b"12").unwrap();
        match &result.acc[0] {
            Value::List(items) => assert_eq!(items, &[Value::Int(1), Value::Int(2)]),
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn standalone_compile_rejects_parsec() {
        let program = Program::new().parsec_local("whatever").unwrap();
        let err = compile(&program, CompileOptions::default()).unwrap_err();
        assert!(matches!(err, BuildError::UndefinedParsec { .. }));
    }
}
