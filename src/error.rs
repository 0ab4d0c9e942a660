//! Failure taxonomy of the shell and the single diagnostic every failure is reported with.

use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// The only text the shell itself ever writes to its error stream.
pub const ERROR_MSG: &str = "An error has occurred\n";

/// Everything that can go wrong while parsing or running a line.
///
/// The variants carry enough detail for `debug` logging; users only ever see [`ERROR_MSG`].
#[derive(Debug, Error)]
pub enum ShellError {
    /// `<` or `>` was the last word of its segment.
    #[error("syntax error: `{0}` needs a file name")]
    MissingRedirectTarget(char),

    #[error("command not found: {0}")]
    NotFound(String),

    /// A pipeline segment with no words, e.g. the middle of `a | | b`.
    #[error("empty command")]
    EmptyCommand,

    #[error("cannot open {}: {source}", path.display())]
    Redirect { path: PathBuf, source: io::Error },

    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("cannot spawn {}: {source}", program.display())]
    Spawn { program: PathBuf, source: io::Error },

    #[error("wait for pid {pid} failed: {source}")]
    Wait { pid: u32, source: io::Error },

    #[error("cannot read substituted output: {0}")]
    Capture(#[source] io::Error),

    /// A builtin was invoked with the wrong number or shape of arguments.
    #[error("{name}: invalid arguments")]
    InvalidArguments { name: &'static str },

    #[error("cd: {}: {source}", path.display())]
    ChangeDir { path: PathBuf, source: io::Error },

    #[error("pwd: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("kill {pid}: {source}")]
    Kill { pid: i32, source: io::Error },

    #[error("no history entry {0}")]
    HistoryMiss(usize),

    #[error("history replay nested deeper than {0} levels")]
    ReplayDepth(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    /// Failures after which no further pipeline stage should be started: the pipe or
    /// process could not be created at all, as opposed to one stage's program being bad.
    pub fn aborts_pipeline(&self) -> bool {
        match self {
            ShellError::Pipe(_) => true,
            ShellError::Spawn { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::OutOfMemory
            ),
            _ => false,
        }
    }
}

/// Reports `err` through the uniform diagnostic.
///
/// Write failures on the error stream itself are ignored: there is nowhere left to report them.
pub fn report(err: &ShellError, stderr: &mut dyn Write) {
    tracing::debug!(error = %err, "reporting failure");
    let _ = stderr.write_all(ERROR_MSG.as_bytes());
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_writes_only_fixed_line() {
        let mut out = Vec::new();
        report(&ShellError::NotFound("nope".to_string()), &mut out);
        report(&ShellError::InvalidArguments { name: "cd" }, &mut out);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "An error has occurred\nAn error has occurred\n"
        );
    }

    #[test]
    fn test_display_keeps_detail_for_logs() {
        let err = ShellError::MissingRedirectTarget('>');
        assert_eq!(err.to_string(), "syntax error: `>` needs a file name");
    }
}
