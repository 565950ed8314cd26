//! Named, possibly mutually-recursive, combinators.
//!
//! A lone [`crate::ir::Program`] can be compiled directly with
//! [`crate::compiler::compile`], but it cannot call itself or another program by
//! name — there is nowhere to look the name up. [`Grammar`] is that lookup table: a
//! set of named definitions, each with a visibility, compiled together in two passes
//! so a definition's `parsec` calls (to itself or to a sibling defined later) resolve
//! correctly regardless of declaration order.

use crate::compiler::{self, CompileOptions, CompiledProgram, ParsecSlot};
use crate::error::{BuildError, Failure};
use crate::ir::{ParsecTarget, Program};
use crate::parser::{ParseOptions, Success};
use crate::runtime::ParseState;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Whether a [`Grammar`] definition can be called from another module's
/// [`Grammar`] via [`Program::parsec_remote`], or only from within this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Reachable from other modules as a remote `parsec` target.
    Public,
    /// Reachable only from `parsec_local` calls within this same grammar.
    Internal,
}

/// An unbuilt set of named definitions.
///
/// Call [`Grammar::define`] for each named program, then [`Grammar::compile`] once to
/// produce a [`CompiledGrammar`] whose public members are callable.
#[derive(Default)]
pub struct Grammar {
    definitions: Vec<(String, Program, Visibility, bool)>,
}

impl Grammar {
    /// An empty grammar with no definitions yet.
    pub fn new() -> Self {
        Grammar::default()
    }

    /// Add a named definition. Replaces any earlier definition with the same name.
    ///
    /// Equivalent to `define_with_metadata(name, program, visibility, false)`.
    pub fn define(self, name: impl Into<String>, program: Program, visibility: Visibility) -> Self {
        self.define_with_metadata(name, program, visibility, false)
    }

    /// Add a named definition, additionally publishing its IR for
    /// [`CompiledGrammar::exported_program`] to hand to the generator.
    pub fn define_with_metadata(
        mut self,
        name: impl Into<String>,
        program: Program,
        visibility: Visibility,
        export_metadata: bool,
    ) -> Self {
        let name = name.into();
        self.definitions.retain(|(existing, _, _, _)| existing != &name);
        self.definitions.push((name, program, visibility, export_metadata));
        self
    }

    /// Compile every definition, resolving `parsec_local` calls within this grammar.
    ///
    /// Cross-module calls (`parsec_remote`) are left as unresolved slots; call
    /// [`CompiledGrammar::link`] afterward to fill them in against another module's
    /// compiled, public members.
    pub fn compile(self, options: CompileOptions) -> Result<CompiledGrammar, BuildError> {
        let mut slots: HashMap<String, ParsecSlot> = HashMap::new();
        for (name, ..) in &self.definitions {
            slots.insert(name.clone(), Rc::new(RefCell::new(None)));
        }

        let remote_slots: Rc<RefCell<HashMap<(String, String), ParsecSlot>>> = Rc::default();
        let local_slots = slots.clone();
        let remote_slots_for_resolver = remote_slots.clone();
        let resolve = move |target: &ParsecTarget| -> Result<ParsecSlot, BuildError> {
            match target {
                ParsecTarget::Local(name) => local_slots
                    .get(name)
                    .cloned()
                    .ok_or_else(|| BuildError::UndefinedParsec { name: name.clone() }),
                ParsecTarget::Remote { module, name } => Ok(remote_slots_for_resolver
                    .borrow_mut()
                    .entry((module.clone(), name.clone()))
                    .or_insert_with(|| Rc::new(RefCell::new(None)))
                    .clone()),
            }
        };

        for (name, program, ..) in &self.definitions {
            let compiled = compiler::compile_program(program, &options, Some(&resolve))?;
            *slots
                .get(name)
                .expect("every name was seeded into the slot table above")
                .borrow_mut() = Some(compiled);
        }

        let mut exported_programs = HashMap::new();
        let members = self
            .definitions
            .into_iter()
            .map(|(name, program, vis, export_metadata)| {
                let compiled = slots
                    .get(&name)
                    .cloned()
                    .expect("filled in the loop above")
                    .borrow()
                    .clone()
                    .expect("filled in the loop above");
                if export_metadata {
                    exported_programs.insert(name.clone(), program);
                }
                (name, (compiled, vis))
            })
            .collect();

        Ok(CompiledGrammar {
            members,
            exported_programs,
            pending_remote: remote_slots,
        })
    }
}

/// A [`Grammar`] after compilation: every `parsec_local` call is resolved; a
/// `parsec_remote` call resolves once [`CompiledGrammar::link`] is called against the
/// module it names.
pub struct CompiledGrammar {
    members: HashMap<String, (Rc<CompiledProgram>, Visibility)>,
    exported_programs: HashMap<String, Program>,
    pending_remote: Rc<RefCell<HashMap<(String, String), ParsecSlot>>>,
}

impl CompiledGrammar {
    /// The IR of a member defined with `export_metadata = true`, for the generator
    /// (or a third-party introspection tool) to walk.
    pub fn exported_program(&self, name: &str) -> Option<&Program> {
        self.exported_programs.get(name)
    }

    /// Fill in every `parsec_remote` call this grammar made against `module_name`,
    /// using `other`'s public members.
    ///
    /// Returns an error naming the first call that targets a name `other` does not
    /// export as [`Visibility::Public`].
    pub fn link(&self, module_name: &str, other: &CompiledGrammar) -> Result<(), BuildError> {
        let mut pending = self.pending_remote.borrow_mut();
        for ((module, name), slot) in pending.iter_mut() {
            if module != module_name {
                continue;
            }
            let (compiled, visibility) = other
                .members
                .get(name)
                .ok_or_else(|| BuildError::UndefinedParsec {
                    name: format!("{module}::{name}"),
                })?;
            if *visibility != Visibility::Public {
                return Err(BuildError::UndefinedParsec {
                    name: format!("{module}::{name}"),
                });
            }
            *slot.borrow_mut() = Some(compiled.clone());
        }
        Ok(())
    }

    /// Parse `input` starting from the named, [`Visibility::Public`] member.
    ///
    /// Fails immediately, at the start of `input`, if `name` does not exist or is
    /// not public — there is no separate "not found" error surface, since the only
    /// way to reach a member from outside the grammar is the same name resolution a
    /// `parsec_remote` call would use.
    pub fn parse<'i>(&self, name: &str, input: &'i [u8], options: ParseOptions) -> Result<Success<'i>, Failure<'i>> {
        let member = self
            .members
            .get(name)
            .filter(|(_, visibility)| *visibility == Visibility::Public);
        let Some((compiled, _)) = member else {
            return Err(Failure::new(
                format!("no public definition named {name:?}"),
                input,
                options.context,
                options.position,
                0,
            ));
        };
        let start_offset = options.position.byte_offset;
        let state = ParseState::new(input, options.context, options.position);
        compiled.run(state).map(|s| Success::from_state(s, start_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_recursive_definition_resolves_through_a_slot() {
        // digit := '0'..'9' | (digit)  -- silly but exercises local recursion.
        let grammar = Grammar::new().define(
            "digits",
            Program::new()
                .bin_segment(
                    vec![crate::ir::RangeSpec::from_bytes(b'0'..=b'9').unwrap()],
                    vec![],
                    crate::ir::Modifier::Integer,
                )
                .unwrap()
                .choice(vec![Program::new().parsec_local("digits").unwrap(), Program::new()], None)
                .unwrap(),
            Visibility::Public,
        );
        let compiled = grammar.compile(CompileOptions::default()).unwrap();
        let result = compiled.parse("digits", b"123", ParseOptions::default()).unwrap();
        assert!(result.rest.is_empty());
    }

    #[test]
    fn cross_module_link_resolves_a_remote_call() {
        let helper = Grammar::new()
            .define("word", Program::new().string("ok").unwrap(), Visibility::Public)
            .compile(CompileOptions::default())
            .unwrap();
        let main = Grammar::new()
            .define(
                "entry",
                Program::new().parsec_remote("helper", "word").unwrap(),
                Visibility::Public,
            )
            .compile(CompileOptions::default())
            .unwrap();
        main.link("helper", &helper).unwrap();
        let result = main.parse("entry", b"ok", ParseOptions::default()).unwrap();
        assert!(result.rest.is_empty());
    }

    #[test]
    fn linking_against_an_internal_member_fails() {
        let helper = Grammar::new()
            .define("secret", Program::new().string("ok").unwrap(), Visibility::Internal)
            .compile(CompileOptions::default())
            .unwrap();
        let main = Grammar::new()
            .define(
                "entry",
                Program::new().parsec_remote("helper", "secret").unwrap(),
                Visibility::Public,
            )
            .compile(CompileOptions::default())
            .unwrap();
        assert!(main.link("helper", &helper).is_err());
    }
}
