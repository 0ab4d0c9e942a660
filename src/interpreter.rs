use crate::builtin::builtin_factories;
use crate::command::{CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::error::{self, ShellError};
use crate::launcher::{Launcher, ProcessLauncher, create_truncate};
use crate::lexer::split_into_groups;
use crate::parser::{Command, CommandList, Expand, build_command_list};
use crate::pipeline::{Launch, capture_output, launch_command, launch_pipeline};
use anyhow::Context;
use regex::Regex;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Prompt shown in interactive mode.
pub const PROMPT: &str = "gush> ";

/// How many `!N` replays may nest inside one another before giving up.
pub const MAX_REPLAY_DEPTH: usize = 16;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate, see [`crate::builtin`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

fn replay_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^!(\d+)").expect("valid replay regex"))
}

/// History number referenced by a `!N` command name.
fn replay_index(name: &str) -> Option<usize> {
    let caps = replay_regex().captures(name)?;
    // Too many digits to be resident anyway.
    Some(caps[1].parse().unwrap_or(usize::MAX))
}

/// A line-oriented shell session.
///
/// The interpreter owns an [`Environment`], the builtin factories queried by command name,
/// and the [`Launcher`] that starts external programs. Output of builtins and `!N` echoes
/// goes to the interpreter's own stdout; external programs inherit the process's.
///
/// Example
/// ```
/// use gush::Interpreter;
/// let mut sh = Interpreter::default();
/// sh.submit_line("path /opt/bin /usr/bin");
/// assert_eq!(sh.env().search_path.dirs(), &["/opt/bin", "/usr/bin"]);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    launcher: Box<dyn Launcher>,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories and launcher.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>, launcher: Box<dyn Launcher>) -> Self {
        Self {
            env: Environment::new(),
            commands,
            launcher,
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
        }
    }

    /// Redirect the shell's own output and diagnostics.
    pub fn with_output(
        mut self,
        stdout: impl Write + 'static,
        stderr: impl Write + 'static,
    ) -> Self {
        self.stdout = Box::new(stdout);
        self.stderr = Box::new(stderr);
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// `exit` has been run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Accept one line of input: record it in history and run it.
    ///
    /// Empty lines are neither recorded nor run.
    pub fn submit_line(&mut self, line: &str) {
        let line = line.strip_suffix('\n').unwrap_or(line);
        if line.is_empty() {
            return;
        }
        self.env.history.add(line);
        self.process_line(line);
    }

    /// Run every `;` group of `line` in order, without touching history.
    pub fn process_line(&mut self, line: &str) {
        self.process_line_at(line, 0);
    }

    fn process_line_at(&mut self, line: &str, depth: usize) {
        for group in split_into_groups(line) {
            if self.env.should_exit {
                tracing::debug!("exit requested, skipping rest of line");
                break;
            }
            let outcome = build_command_list(&group, self);
            for err in &outcome.errors {
                self.report(err);
            }
            self.run_list(outcome.commands, depth);
        }
    }

    fn run_list(&mut self, list: CommandList, depth: usize) {
        match list.commands.as_slice() {
            [] => {}
            [command] => {
                if let Err(e) = self.run_single(command, depth) {
                    self.report(&e);
                }
            }
            commands => {
                let _ = self.stdout.flush();
                let run = launch_pipeline(
                    commands,
                    list.is_background(),
                    &self.env.search_path,
                    self.launcher.as_mut(),
                );
                for err in &run.errors {
                    self.report(err);
                }
                if let Err(e) = self.announce(run.launch) {
                    self.report(&e);
                }
            }
        }
    }

    fn run_single(&mut self, command: &Command, depth: usize) -> Result<(), ShellError> {
        let Some(name) = command.name() else {
            return Ok(());
        };
        if let Some(n) = replay_index(name) {
            return self.replay(n, depth);
        }
        if let Some(builtin) = self.find_builtin(command) {
            return self.run_builtin(builtin?, command.output_file.as_ref());
        }

        self.stdout.flush()?;
        let launch = launch_command(command, &self.env.search_path, self.launcher.as_mut())?;
        self.announce(launch)
    }

    /// `None` when `command` is not a builtin; an error when it is one with bad arguments.
    fn find_builtin(
        &self,
        command: &Command,
    ) -> Option<Result<Box<dyn ExecutableCommand>, ShellError>> {
        let name = command.name()?;
        let args: Vec<&str> = command.args().iter().map(String::as_str).collect();
        self.commands
            .iter()
            .find_map(|factory| factory.try_create(name, &args))
    }

    fn run_builtin(
        &mut self,
        builtin: Box<dyn ExecutableCommand>,
        output_file: Option<&PathBuf>,
    ) -> Result<(), ShellError> {
        match output_file {
            Some(path) => {
                let mut file = create_truncate(path).map_err(|source| ShellError::Redirect {
                    path: path.clone(),
                    source,
                })?;
                builtin.execute(&mut file, &mut self.env)
            }
            None => {
                let res = builtin.execute(self.stdout.as_mut(), &mut self.env);
                self.stdout.flush()?;
                res
            }
        }
    }

    /// Run a builtin the way a subshell would: it sees the session but its changes to the
    /// environment and the working directory are thrown away.
    fn run_detached(
        &self,
        builtin: Box<dyn ExecutableCommand>,
        stdout: &mut dyn Write,
    ) -> Result<(), ShellError> {
        let mut scratch = self.env.clone();
        let cwd = std::env::current_dir().map_err(ShellError::CurrentDir)?;
        let res = builtin.execute(stdout, &mut scratch);
        if std::env::current_dir().ok().as_ref() != Some(&cwd) {
            std::env::set_current_dir(&cwd)
                .map_err(|source| ShellError::ChangeDir { path: cwd, source })?;
        }
        res
    }

    /// Echo history entry `n` and run it as if it had been typed.
    fn replay(&mut self, n: usize, depth: usize) -> Result<(), ShellError> {
        if depth >= MAX_REPLAY_DEPTH {
            return Err(ShellError::ReplayDepth(MAX_REPLAY_DEPTH));
        }
        let line = self
            .env
            .history
            .lookup(n)
            .ok_or(ShellError::HistoryMiss(n))?
            .to_string();
        tracing::debug!(n, %line, depth, "replaying history entry");
        writeln!(self.stdout, "{line}")?;
        self.stdout.flush()?;
        self.process_line_at(&line, depth + 1);
        Ok(())
    }

    fn announce(&mut self, launch: Launch) -> Result<(), ShellError> {
        if let Launch::Background(pid) = launch {
            writeln!(self.stdout, "[{pid}]")?;
            self.stdout.flush()?;
        }
        Ok(())
    }

    fn report(&mut self, err: &ShellError) {
        error::report(err, self.stderr.as_mut());
    }

    /// Interactive read loop on the terminal.
    ///
    /// Ends on `exit`, Ctrl-C or end of input.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new().context("cannot initialise line editor")?;

        while !self.env.should_exit {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    if !line.is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.submit_line(&line);
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(err) => return Err(err).context("cannot read input line"),
            }
        }
        Ok(())
    }

    /// Batch mode: run every line of `input` until it ends or `exit` is run.
    pub fn run_script(&mut self, input: impl BufRead) -> anyhow::Result<()> {
        for line in input.lines() {
            let line = line.context("cannot read script line")?;
            self.submit_line(&line);
            if self.env.should_exit {
                break;
            }
        }
        Ok(())
    }
}

impl Expand for Interpreter {
    fn lookup_var(&self, name: &str) -> Option<String> {
        self.env.get_var(name)
    }

    /// Runs the first group of `body` and collects its standard output. Builtins run
    /// detached, so `$(cd x)` or `$(exit)` leave the session alone.
    ///
    /// A failure only becomes the substitution's error when nothing was written; otherwise
    /// it is reported and the partial output is kept.
    fn capture(&mut self, body: &str) -> Result<String, ShellError> {
        let Some(group) = split_into_groups(body).into_iter().next() else {
            return Ok(String::new());
        };
        let outcome = build_command_list(&group, self);
        for err in &outcome.errors {
            self.report(err);
        }
        let commands = outcome.commands.commands;

        let builtin = match commands.as_slice() {
            [] => return Ok(String::new()),
            [single] => self.find_builtin(single),
            _ => None,
        };
        let (output, mut errors) = match builtin {
            Some(builtin) => {
                let mut buf = Vec::new();
                match builtin.and_then(|b| self.run_detached(b, &mut buf)) {
                    Ok(()) => (buf, Vec::new()),
                    Err(e) => (buf, vec![e]),
                }
            }
            None => capture_output(&commands, &self.env.search_path, self.launcher.as_mut()),
        };

        let last = errors.pop();
        for err in &errors {
            self.report(err);
        }
        let text = String::from_utf8_lossy(&output).into_owned();
        match last {
            Some(err) if text.is_empty() => Err(err),
            Some(err) => {
                self.report(&err);
                Ok(text)
            }
            None => Ok(text),
        }
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the builtins `exit`, `cd`, `path`, `pwd`, `history`
    /// and `kill`, launching external programs as real processes.
    fn default() -> Self {
        Self::new(builtin_factories(), Box::new(ProcessLauncher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ERROR_MSG;
    use crate::external::tests::lock_current_dir;
    use crate::io_adapters::MemWriter;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    struct Session {
        sh: Interpreter,
        out: Rc<RefCell<Vec<u8>>>,
        err: Rc<RefCell<Vec<u8>>>,
    }

    impl Session {
        fn new() -> Self {
            let (stdout, out) = MemWriter::with_handle();
            let (stderr, err) = MemWriter::with_handle();
            let mut sh = Interpreter::default().with_output(stdout, stderr);
            sh.env_mut()
                .search_path
                .replace(vec!["/bin".to_string(), "/usr/bin".to_string()]);
            Self { sh, out, err }
        }

        fn out(&self) -> String {
            String::from_utf8(self.out.borrow().clone()).unwrap()
        }

        fn err(&self) -> String {
            String::from_utf8(self.err.borrow().clone()).unwrap()
        }

        fn errors(&self) -> usize {
            self.err().matches(ERROR_MSG).count()
        }
    }

    #[test]
    fn test_replay_index() {
        assert_eq!(replay_index("!3"), Some(3));
        assert_eq!(replay_index("!12x"), Some(12));
        assert_eq!(replay_index("!"), None);
        assert_eq!(replay_index("!x"), None);
        assert_eq!(replay_index("ls"), None);
    }

    #[test]
    fn test_empty_lines_are_not_recorded() {
        let mut s = Session::new();
        s.sh.submit_line("");
        s.sh.submit_line("\n");
        assert_eq!(s.sh.env().history.lifetime_count(), 0);
        assert!(s.err().is_empty());
    }

    #[test]
    fn test_history_lists_itself() {
        let mut s = Session::new();
        s.sh.submit_line("path /bin");
        s.sh.submit_line("history");
        assert_eq!(s.out(), "1 path /bin\n2 history\n");
    }

    #[test]
    fn test_replay_echoes_and_reruns() {
        let mut s = Session::new();
        s.sh.submit_line("history");
        s.sh.submit_line("!1");
        assert_eq!(s.out(), "1 history\nhistory\n1 history\n2 !1\n");
        assert!(s.err().is_empty());
    }

    #[test]
    fn test_replay_of_evicted_entry_fails() {
        let mut s = Session::new();
        for i in 0..11 {
            s.sh.submit_line(&format!("path /p{i}"));
        }
        s.sh.submit_line("!1");
        assert_eq!(s.errors(), 1);
        assert!(s.out().is_empty());
        assert_eq!(s.sh.env().search_path.dirs(), &["/p10".to_string()]);

        // Entries 4..=13 are resident now; entry 4 is the fourth `path` line.
        s.sh.submit_line("!4");
        assert_eq!(s.errors(), 1);
        assert_eq!(s.out(), "path /p3\n");
        assert_eq!(s.sh.env().search_path.dirs(), &["/p3".to_string()]);
    }

    #[test]
    fn test_self_referencing_replay_is_bounded() {
        let mut s = Session::new();
        s.sh.submit_line("!1");
        assert_eq!(s.out(), "!1\n".repeat(MAX_REPLAY_DEPTH));
        assert_eq!(s.errors(), 1);
    }

    #[test]
    fn test_exit_skips_remaining_groups() {
        let mut s = Session::new();
        s.sh.submit_line("exit; path /never");
        assert!(s.sh.should_exit());
        assert_eq!(s.sh.env().search_path.dirs().len(), 2);
    }

    #[test]
    fn test_bad_builtin_arguments_share_one_diagnostic() {
        let _lock = lock_current_dir();
        let cwd = std::env::current_dir().unwrap();
        let mut s = Session::new();

        for line in ["cd a b", "kill abc", "exit x", "pwd extra"] {
            s.sh.submit_line(line);
        }

        assert_eq!(s.err(), ERROR_MSG.repeat(4));
        assert!(s.out().is_empty());
        assert!(!s.sh.should_exit());
        assert_eq!(std::env::current_dir().unwrap(), cwd);
        assert_eq!(s.sh.env().search_path.dirs().len(), 2);
    }

    #[test]
    fn test_unknown_command_is_reported() {
        let mut s = Session::new();
        s.sh.submit_line("no-such-command-for-gush");
        assert_eq!(s.err(), ERROR_MSG);
    }

    #[test]
    fn test_missing_redirect_target_is_reported() {
        let mut s = Session::new();
        s.sh.submit_line("pwd >");
        assert_eq!(s.errors(), 1);
    }

    #[test]
    fn test_variable_expansion_in_builtin_args() {
        let mut s = Session::new();
        let path = std::env::var("PATH").unwrap();
        s.sh.submit_line("path $PATH/x '$PATH' $ x$PATH");
        assert_eq!(
            s.sh.env().search_path.dirs(),
            &[path, "$PATH".to_string(), String::new(), "x$PATH".to_string()]
        );
    }

    #[test]
    fn test_path_keeps_dash_words() {
        let mut s = Session::new();
        s.sh.submit_line("path -a /b");
        assert_eq!(s.sh.env().search_path.dirs(), &["-a", "/b"]);
        s.sh.submit_line("path -- /x");
        assert_eq!(s.sh.env().search_path.dirs(), &["--", "/x"]);
        assert!(s.err().is_empty());
    }

    #[test]
    fn test_rejected_builtin_leaves_redirect_target_alone() {
        let _lock = lock_current_dir();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");
        fs::write(&target, "precious\n").unwrap();
        let mut s = Session::new();

        for line in ["cd a b", "kill abc", "exit x", "pwd extra"] {
            s.sh.submit_line(&format!("{line} > {}", target.display()));
        }

        assert_eq!(s.errors(), 4);
        assert!(!s.sh.should_exit());
        assert_eq!(fs::read_to_string(&target).unwrap(), "precious\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_command_substitution_splices_output() {
        let mut s = Session::new();
        s.sh.submit_line("path a$(echo b)c $(echo one | tr a-z A-Z)");
        assert!(s.err().is_empty(), "{}", s.err());
        assert_eq!(
            s.sh.env().search_path.dirs(),
            &["abc".to_string(), "ONE".to_string()]
        );
    }

    #[test]
    fn test_substitution_runs_builtins() {
        let _lock = lock_current_dir();
        let cwd = std::env::current_dir().unwrap();
        let mut s = Session::new();
        s.sh.submit_line("path $(pwd)");
        assert_eq!(
            s.sh.env().search_path.dirs(),
            &[cwd.display().to_string()]
        );
    }

    #[test]
    fn test_substituted_builtins_do_not_touch_session() {
        let _lock = lock_current_dir();
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::new();

        s.sh.submit_line("path $(exit)");
        assert!(!s.sh.should_exit());
        assert_eq!(s.sh.env().search_path.dirs(), &[""]);

        s.sh.submit_line(&format!("path x$(cd {})y", dir.path().display()));
        assert_eq!(std::env::current_dir().unwrap(), cwd);
        assert_eq!(s.sh.env().search_path.dirs(), &["xy"]);
        assert!(s.err().is_empty(), "{}", s.err());
    }

    #[test]
    fn test_failed_substitution_expands_to_nothing() {
        let mut s = Session::new();
        s.sh.submit_line("path x$(no-such-command-for-gush)y");
        assert_eq!(s.errors(), 1);
        assert_eq!(s.sh.env().search_path.dirs(), &["xy".to_string()]);
    }

    #[test]
    fn test_builtin_output_redirection() {
        let _lock = lock_current_dir();
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cwd.txt");
        let mut s = Session::new();

        s.sh.submit_line(&format!("pwd > {}", out.display()));

        assert!(s.out().is_empty());
        assert_eq!(fs::read_to_string(out).unwrap(), format!("{}\n", cwd.display()));
    }

    #[test]
    #[cfg(unix)]
    fn test_groups_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let mut s = Session::new();

        s.sh.submit_line(&format!(
            "echo hello > {a}; cat < {a} > {b}",
            a = first.display(),
            b = second.display()
        ));

        assert!(s.err().is_empty(), "{}", s.err());
        assert_eq!(fs::read_to_string(second).unwrap(), "hello\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_pipeline_with_boundary_redirections() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, "b\na\nb\n").unwrap();
        let mut s = Session::new();

        s.sh.submit_line(&format!(
            "cat < {} | grep b | wc -l > {}",
            input.display(),
            output.display()
        ));

        assert!(s.err().is_empty(), "{}", s.err());
        assert_eq!(fs::read_to_string(output).unwrap().trim(), "2");
    }

    #[test]
    #[cfg(unix)]
    fn test_background_returns_immediately() {
        let mut s = Session::new();
        let started = Instant::now();

        s.sh.submit_line("sleep 5 &");

        assert!(started.elapsed() < Duration::from_secs(3));
        let out = s.out();
        let pid = out
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .expect("pid announcement");
        s.sh.submit_line(&format!("kill {pid}"));
        assert!(s.err().is_empty(), "{}", s.err());
    }

    #[test]
    fn test_run_script_stops_at_exit() -> anyhow::Result<()> {
        let mut s = Session::new();
        let script = "path /a\n\nhistory\nexit\npath /b\n";
        s.sh.run_script(std::io::Cursor::new(script))?;
        assert_eq!(s.out(), "1 path /a\n2 history\n");
        assert!(s.sh.should_exit());
        assert_eq!(s.sh.env().search_path.dirs(), &["/a".to_string()]);
        Ok(())
    }
}
