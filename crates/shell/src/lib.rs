//! Remote shell: an input line that stays put while the server log
//! scrolls above it.
//!
//! [`LineEditor`] and [`RemoteShell`] hold all of the behaviour and are
//! terminal-free; [`terminal::attach`] drives them from raw-mode key events.

pub mod line_editor;
pub mod shell;
pub mod terminal;

pub use line_editor::LineEditor;
pub use shell::{CommandFuture, CommandSink, RemoteShell};
