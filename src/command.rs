use crate::env::Environment;
use crate::error::ShellError;
use std::io::Write;

/// Object-safe trait for a command that runs inside the shell process.
///
/// Builtins get it through a blanket impl; see `builtin.rs`.
pub trait ExecutableCommand {
    /// Executes the command, writing any output to `stdout`.
    ///
    /// Errors are returned, never printed: the interpreter reports them uniformly.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment)
    -> Result<(), ShellError>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`. A recognized name with
/// malformed arguments yields an error before anything runs, so a rejected command has no
/// side effects at all (not even creating its `> FILE`).
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        name: &str,
        args: &[&str],
    ) -> Option<Result<Box<dyn ExecutableCommand>, ShellError>>;
}
