use anyhow::Context;
use argh::{EarlyExit, FromArgs};
use gush::{ERROR_MSG, Interpreter};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A small Unix shell. Reads commands from the terminal, or from SCRIPT in batch mode.
struct Args {
    #[argh(positional)]
    /// file to run line by line instead of prompting.
    script: Option<PathBuf>,
}

/// Log filter from `GUSH_LOG`, then `RUST_LOG`; silent by default so stderr carries only
/// the shell's own diagnostic.
fn init_tracing() {
    let filter = ["GUSH_LOG", "RUST_LOG"]
        .into_iter()
        .find_map(|var| EnvFilter::try_from_env(var).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_args() -> Result<Args, EarlyExit> {
    let argv: Vec<String> = std::env::args().collect();
    let (cmd, rest) = argv.split_first().map_or(("gush", &[][..]), |(c, r)| (c.as_str(), r));
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    Args::from_args(&[cmd], &rest)
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut sh = Interpreter::default();
    match args.script {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("cannot open script {}", path.display()))?;
            tracing::debug!(script = %path.display(), "batch mode");
            sh.run_script(BufReader::new(file))
        }
        None => sh.repl(),
    }
}

fn fail() -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(ERROR_MSG.as_bytes());
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(EarlyExit { output, status: Ok(()) }) => {
            println!("{output}");
            return ExitCode::SUCCESS;
        }
        Err(EarlyExit { output, .. }) => {
            tracing::debug!(reason = %output.trim_end(), "bad command line");
            return fail();
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "shell stopped");
            fail()
        }
    }
}
