//! gush: a small line-oriented Unix shell.
//!
//! A line is lexed into `;`-separated groups, each group is expanded (`$NAME`, `$(...)`) into
//! a pipeline of [`parser::Command`]s, and the pipeline is run either in-process (builtins
//! such as `cd`, `path` and `history`) or as child processes wired together with pipes.
//!
//! The main entry point is [`Interpreter`], which owns the session state and drives both the
//! interactive prompt and batch scripts. The public modules expose the pieces it is built
//! from: the lexer and parser, the [`launcher::Launcher`] seam used to start processes, and
//! the bounded [`history::History`] replayed with `!N`.

mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod external;
pub mod history;
mod interpreter;
pub mod io_adapters;
pub mod launcher;
pub mod lexer;
pub mod parser;
pub mod pipeline;

/// Just a convenient re-export of the shell session.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{Interpreter, MAX_REPLAY_DEPTH, PROMPT};

pub use error::{ERROR_MSG, ShellError};
