//! Launching external commands: one at a time or wired together with pipes.

use crate::error::ShellError;
use crate::external::{SearchPath, find_command_path};
use crate::launcher::{ChildSpec, Launched, Launcher, Sink, Source};
use crate::parser::Command;

/// How a launch ended from the shell's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Every started child has terminated.
    Finished,
    /// Children were left running; the pid identifies the job (the last stage of a pipeline).
    Background(u32),
}

/// Result of launching a pipeline. Stage failures do not stop the other stages, so there
/// may be several errors to report.
#[derive(Debug)]
pub struct PipelineRun {
    pub launch: Launch,
    pub errors: Vec<ShellError>,
}

fn stage_spec(
    command: &Command,
    search_path: &SearchPath,
    stdin: Source,
    stdout: Sink,
) -> Result<ChildSpec, ShellError> {
    let name = command.name().ok_or(ShellError::EmptyCommand)?;
    let program = find_command_path(search_path, name)?;
    Ok(ChildSpec {
        program,
        argv: command.words.clone(),
        stdin,
        stdout,
    })
}

/// Launch one external command with its own redirections.
///
/// Nothing is spawned when the name cannot be resolved. A foreground command is waited for;
/// a background one is left running and never reaped.
pub fn launch_command(
    command: &Command,
    search_path: &SearchPath,
    launcher: &mut dyn Launcher,
) -> Result<Launch, ShellError> {
    let stdin = command
        .input_file
        .clone()
        .map_or(Source::Inherit, Source::File);
    let stdout = command
        .output_file
        .clone()
        .map_or(Sink::Inherit, Sink::File);

    let spec = stage_spec(command, search_path, stdin, stdout)?;
    let mut child = launcher.launch(spec)?;
    if command.background {
        return Ok(Launch::Background(child.id()));
    }
    child.wait()?;
    Ok(Launch::Finished)
}

struct Stages {
    children: Vec<Box<dyn Launched>>,
    /// Index into `children` of the final stage, when it started.
    last: Option<usize>,
    errors: Vec<ShellError>,
}

/// Start every stage, stage `i` writing into a pipe read by stage `i + 1`.
///
/// Only the first stage's `input_file` and the last stage's `output_file` are honoured.
/// When the last stage has no `output_file` its output goes to `Sink::Capture` if `capture`
/// is set, to the shell's standard output otherwise.
fn spawn_stages(
    commands: &[Command],
    capture: bool,
    search_path: &SearchPath,
    launcher: &mut dyn Launcher,
) -> Stages {
    let mut stages = Stages {
        children: Vec::with_capacity(commands.len()),
        last: None,
        errors: Vec::new(),
    };
    let mut upstream = None;

    for (i, command) in commands.iter().enumerate() {
        let is_last = i + 1 == commands.len();

        let stdin = match upstream.take() {
            Some(reader) => Source::Pipe(reader),
            None => command
                .input_file
                .clone()
                .map_or(Source::Inherit, Source::File),
        };

        let stdout = if is_last {
            match command.output_file.clone() {
                Some(path) => Sink::File(path),
                None if capture => Sink::Capture,
                None => Sink::Inherit,
            }
        } else {
            match launcher.pipe() {
                Ok((reader, writer)) => {
                    upstream = Some(reader);
                    Sink::Pipe(writer)
                }
                Err(e) => {
                    tracing::warn!(stage = i, error = %e, "pipeline aborted");
                    stages.errors.push(e);
                    break;
                }
            }
        };

        // On failure the spec is dropped, closing this stage's pipe ends: the next stage
        // reads EOF and the previous one gets a broken pipe.
        match stage_spec(command, search_path, stdin, stdout).and_then(|s| launcher.launch(s)) {
            Ok(child) => {
                tracing::trace!(stage = i, pid = child.id(), "stage started");
                if is_last {
                    stages.last = Some(stages.children.len());
                }
                stages.children.push(child);
            }
            Err(e) if e.aborts_pipeline() => {
                tracing::warn!(stage = i, error = %e, "pipeline aborted");
                stages.errors.push(e);
                break;
            }
            Err(e) => stages.errors.push(e),
        }
    }
    stages
}

fn wait_all(children: &mut [Box<dyn Launched>], errors: &mut Vec<ShellError>) {
    for child in children {
        if let Err(e) = child.wait() {
            errors.push(e);
        }
    }
}

/// Launch `commands` (at least two) as one pipeline.
///
/// Children already started keep running when a later stage fails; there is no way to
/// take them back.
pub fn launch_pipeline(
    commands: &[Command],
    background: bool,
    search_path: &SearchPath,
    launcher: &mut dyn Launcher,
) -> PipelineRun {
    let mut stages = spawn_stages(commands, false, search_path, launcher);

    if background {
        let launch = match stages.children.last() {
            Some(child) => Launch::Background(child.id()),
            None => Launch::Finished,
        };
        return PipelineRun {
            launch,
            errors: stages.errors,
        };
    }

    wait_all(&mut stages.children, &mut stages.errors);
    PipelineRun {
        launch: Launch::Finished,
        errors: stages.errors,
    }
}

/// Run `commands` in the foreground and collect what the last stage writes to standard
/// output. Used for `$(...)`.
pub fn capture_output(
    commands: &[Command],
    search_path: &SearchPath,
    launcher: &mut dyn Launcher,
) -> (Vec<u8>, Vec<ShellError>) {
    let mut stages = spawn_stages(commands, true, search_path, launcher);

    // Drain before waiting, or a chatty last stage blocks on a full pipe.
    let mut output = Vec::new();
    if let Some(last) = stages.last {
        match stages.children[last].read_output() {
            Ok(bytes) => output = bytes,
            Err(e) => stages.errors.push(e),
        }
    }

    wait_all(&mut stages.children, &mut stages.errors);
    (output, stages.errors)
}
