//! Execution tracing for compiled clauses.
//!
//! Mirrors the host crate's own tracing module: a no-op unless the `debug` feature
//! is enabled, in which case it prints each clause's entry/exit to stderr using the
//! same terminal-styling crates.

#[cfg(feature = "debug")]
mod styled {
    use anstream::eprintln;
    use anstyle::{AnsiColor, Style};

    const ENTER: Style = AnsiColor::Cyan.on_default();
    const OK: Style = AnsiColor::Green.on_default();
    const FAIL: Style = AnsiColor::Red.on_default();

    pub(super) fn enter(name: &str, offset: usize) {
        eprintln!("{ENTER}-> {name}{ENTER:#} at offset {offset}");
    }

    pub(super) fn exit_ok(name: &str, consumed: usize) {
        eprintln!("{OK}<- {name}{OK:#} consumed {consumed} bytes");
    }

    pub(super) fn exit_err(name: &str, reason: &str) {
        eprintln!("{FAIL}<- {name}{FAIL:#} failed: {reason}");
    }
}

/// Print a clause's entry, if `enabled`.
#[cfg_attr(not(feature = "debug"), allow(unused_variables))]
pub(crate) fn enter(enabled: bool, name: &str, offset: usize) {
    #[cfg(feature = "debug")]
    if enabled {
        styled::enter(name, offset);
    }
    #[cfg(not(feature = "debug"))]
    let _ = (enabled, name, offset);
}

/// Print a clause's successful exit, if `enabled`.
#[cfg_attr(not(feature = "debug"), allow(unused_variables))]
pub(crate) fn exit_ok(enabled: bool, name: &str, entry_offset: usize, exit_offset: usize) {
    #[cfg(feature = "debug")]
    if enabled {
        styled::exit_ok(name, exit_offset - entry_offset);
    }
    #[cfg(not(feature = "debug"))]
    let _ = (enabled, name, entry_offset, exit_offset);
}

/// Print a clause's failed exit, if `enabled`.
#[cfg_attr(not(feature = "debug"), allow(unused_variables))]
pub(crate) fn exit_err(enabled: bool, name: &str, reason: &str) {
    #[cfg(feature = "debug")]
    if enabled {
        styled::exit_err(name, reason);
    }
    #[cfg(not(feature = "debug"))]
    let _ = (enabled, name, reason);
}
