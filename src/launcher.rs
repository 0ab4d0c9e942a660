//! Declarative description of a child process and the one routine that turns it into one.
//!
//! All file-descriptor wiring is expressed as a [`Source`] for standard input and a [`Sink`]
//! for standard output. [`ProcessLauncher`] converts both into [`Stdio`] handles and spawns
//! the program; tests substitute their own [`Launcher`].

use crate::error::ShellError;
use std::fs::{File, OpenOptions};
use std::io::{PipeReader, PipeWriter, Read};
use std::path::PathBuf;
use std::process::{Child, Stdio};

/// Where a child's standard input comes from.
#[derive(Debug)]
pub enum Source {
    /// The shell's own standard input.
    Inherit,
    /// A file opened read-only.
    File(PathBuf),
    /// The read end of a pipe fed by the previous stage.
    Pipe(PipeReader),
}

/// Where a child's standard output goes.
#[derive(Debug)]
pub enum Sink {
    /// The shell's own standard output.
    Inherit,
    /// A file created or truncated.
    File(PathBuf),
    /// The write end of a pipe read by the next stage.
    Pipe(PipeWriter),
    /// A pipe back to the shell, read with [`Launched::read_output`].
    Capture,
}

impl Source {
    fn into_stdio(self) -> Result<Stdio, ShellError> {
        Ok(match self {
            Source::Inherit => Stdio::inherit(),
            Source::File(path) => match File::open(&path) {
                Ok(file) => file.into(),
                Err(source) => return Err(ShellError::Redirect { path, source }),
            },
            Source::Pipe(reader) => reader.into(),
        })
    }
}

impl Sink {
    fn into_stdio(self) -> Result<Stdio, ShellError> {
        Ok(match self {
            Sink::Inherit => Stdio::inherit(),
            Sink::File(path) => match create_truncate(&path) {
                Ok(file) => file.into(),
                Err(source) => return Err(ShellError::Redirect { path, source }),
            },
            Sink::Pipe(writer) => writer.into(),
            Sink::Capture => Stdio::piped(),
        })
    }
}

pub(crate) fn create_truncate(path: &PathBuf) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    options.open(path)
}

/// Everything needed to start one external program.
#[derive(Debug)]
pub struct ChildSpec {
    /// Resolved executable.
    pub program: PathBuf,
    /// Argument words; `argv[0]` is the name the user typed.
    pub argv: Vec<String>,
    pub stdin: Source,
    pub stdout: Sink,
}

/// A started child process.
pub trait Launched {
    fn id(&self) -> u32;

    /// Block until the child terminates. Its exit status is not inspected.
    fn wait(&mut self) -> Result<(), ShellError>;

    /// Read a [`Sink::Capture`] output to end of file. Empty for other sinks.
    fn read_output(&mut self) -> Result<Vec<u8>, ShellError>;
}

/// Starts children from [`ChildSpec`]s and hands out pipes to connect them.
pub trait Launcher {
    fn launch(&mut self, spec: ChildSpec) -> Result<Box<dyn Launched>, ShellError>;

    fn pipe(&mut self) -> Result<(PipeReader, PipeWriter), ShellError> {
        std::io::pipe().map_err(ShellError::Pipe)
    }
}

/// [`Launcher`] backed by real OS processes.
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&mut self, spec: ChildSpec) -> Result<Box<dyn Launched>, ShellError> {
        // Input is opened before output, so a bad `< file` never creates the `> file`.
        let stdin = spec.stdin.into_stdio()?;
        let stdout = spec.stdout.into_stdio()?;

        let mut cmd = std::process::Command::new(&spec.program);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if let Some(arg0) = spec.argv.first() {
                cmd.arg0(arg0);
            }
        }
        cmd.args(spec.argv.iter().skip(1)).stdin(stdin).stdout(stdout);

        // `cmd` owns the parent's copies of any pipe ends and drops them on return.
        let child = cmd.spawn().map_err(|source| ShellError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        tracing::debug!(pid = child.id(), program = %spec.program.display(), "spawned");
        Ok(Box::new(child))
    }
}

impl Launched for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn wait(&mut self) -> Result<(), ShellError> {
        let pid = Child::id(self);
        let status = Child::wait(self).map_err(|source| ShellError::Wait { pid, source })?;
        tracing::trace!(pid, ?status, "child finished");
        Ok(())
    }

    fn read_output(&mut self) -> Result<Vec<u8>, ShellError> {
        let mut buf = Vec::new();
        if let Some(mut out) = self.stdout.take() {
            out.read_to_end(&mut buf).map_err(ShellError::Capture)?;
        }
        Ok(buf)
    }
}
