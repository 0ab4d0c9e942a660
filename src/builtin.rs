use crate::command::{CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use argh::{EarlyExit, FromArgs};
use std::env;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process, so `cd`, `path` and `exit` affect the
/// shell itself. Argument shape is checked while parsing, before the command exists; a
/// failing `execute` leaves the session unchanged.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    fn name() -> &'static str;

    /// Executes the command using the provided output stream and environment.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), ShellError>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<(), ShellError> {
        T::execute(*self, stdout, env)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        name: &str,
        args: &[&str],
    ) -> Option<Result<Box<dyn ExecutableCommand>, ShellError>> {
        if name != T::name() {
            return None;
        }
        // Builtins take no flags: every word, `-x` and `--` included, is positional.
        let positional: Vec<&str> = std::iter::once("--").chain(args.iter().copied()).collect();
        Some(match T::from_args(&[name], &positional) {
            Ok(cmd) => Ok(Box::new(cmd)),
            Err(EarlyExit { output, .. }) => {
                tracing::debug!(builtin = name, reason = %output.trim_end(), "bad arguments");
                Err(ShellError::InvalidArguments { name: T::name() })
            }
        })
    }
}

#[derive(FromArgs)]
/// Leave the shell.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<(), ShellError> {
        env.should_exit = true;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), ShellError> {
        let path = PathBuf::from(self.target);
        env::set_current_dir(&path).map_err(|source| ShellError::ChangeDir { path, source })
    }
}

#[derive(FromArgs)]
/// Replace the list of directories searched for commands.
pub struct Path {
    #[argh(positional, greedy)]
    /// new search directories, in order. None leaves only explicit paths runnable.
    pub dirs: Vec<String>,
}

impl BuiltinCommand for Path {
    fn name() -> &'static str {
        "path"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<(), ShellError> {
        tracing::debug!(dirs = ?self.dirs, "search path replaced");
        env.search_path.replace(self.dirs);
        Ok(())
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), ShellError> {
        let cwd = env::current_dir().map_err(ShellError::CurrentDir)?;
        writeln!(stdout, "{}", cwd.display())?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// List the remembered input lines with their numbers.
pub struct HistoryList {}

impl BuiltinCommand for HistoryList {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), ShellError> {
        env.history.print(stdout)?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Ask a process to terminate.
pub struct Kill {
    #[argh(positional, from_str_fn(parse_pid))]
    /// id of the process to send SIGTERM to.
    pub pid: i32,
}

fn parse_pid(value: &str) -> Result<i32, String> {
    match value.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(format!("not a process id: {value}")),
    }
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), ShellError> {
        terminate(self.pid)
    }
}

#[cfg(unix)]
fn terminate(pid: i32) -> Result<(), ShellError> {
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(ShellError::Kill {
            pid,
            source: std::io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
fn terminate(pid: i32) -> Result<(), ShellError> {
    Err(ShellError::Kill {
        pid,
        source: std::io::Error::from(std::io::ErrorKind::Unsupported),
    })
}

/// Factories for every named builtin. `!N` is handled by the interpreter itself.
pub(crate) fn builtin_factories() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Path>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<HistoryList>::default()),
        Box::new(Factory::<Kill>::default()),
    ]
}
