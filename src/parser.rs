//! Expansion of lexed words and construction of [`Command`]s.

use crate::error::ShellError;
use crate::lexer::{RawGroup, RawWord};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// One pipeline stage: argument words plus structured redirections.
///
/// `words` never contains the operators `<`, `>` or `&`; the builder turns those into the
/// other fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Argument words; word 0 is the program or builtin name.
    pub words: Vec<String>,
    pub background: bool,
    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
}

impl Command {
    pub fn name(&self) -> Option<&str> {
        self.words.first().map(String::as_str)
    }

    /// Arguments after the command name.
    pub fn args(&self) -> &[String] {
        self.words.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// The commands of one `;`-separated group, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    pub commands: Vec<Command>,
}

impl CommandList {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// A pipeline runs in the background when any of its stages asked for it.
    pub fn is_background(&self) -> bool {
        self.commands.iter().any(|c| c.background)
    }
}

/// What the builder needs from the outside world to expand words.
pub trait Expand {
    /// Value of the variable `name`, `None` when unset.
    fn lookup_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    /// Run `body` as a command line and return everything it wrote to standard output.
    fn capture(&mut self, body: &str) -> Result<String, ShellError>;
}

/// A built list together with the syntax and substitution failures met along the way.
///
/// Failures do not discard the list: a segment stops at its first syntax error but keeps
/// the words gathered before it, and sibling segments are unaffected.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub commands: CommandList,
    pub errors: Vec<ShellError>,
}

fn var_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+").expect("valid variable regex"))
}

struct Builder<'a> {
    expand: &'a mut dyn Expand,
    errors: Vec<ShellError>,
}

impl Builder<'_> {
    fn build_list(&mut self, group: &RawGroup) -> CommandList {
        let commands = group
            .segments
            .iter()
            .map(|segment| self.build_command(segment, group.background))
            .collect();
        CommandList { commands }
    }

    fn build_command(&mut self, segment: &[RawWord], background: bool) -> Command {
        let mut command = Command {
            background,
            ..Command::default()
        };

        let mut words = segment.iter();
        while let Some(raw) = words.next() {
            let redirect = if raw.is_operator("<") {
                Some('<')
            } else if raw.is_operator(">") {
                Some('>')
            } else {
                None
            };

            match redirect {
                Some(op) => {
                    let Some(target) = words.next() else {
                        self.errors.push(ShellError::MissingRedirectTarget(op));
                        break;
                    };
                    let file = PathBuf::from(self.expand_word(target));
                    if op == '<' {
                        command.input_file = Some(file);
                    } else {
                        command.output_file = Some(file);
                    }
                }
                None if raw.is_operator("&") => command.background = true,
                None => {
                    let word = self.expand_word(raw);
                    command.words.push(word);
                }
            }
        }

        tracing::debug!(?command, "built command");
        command
    }

    /// Apply `$NAME` expansion, or else at most one `$(...)` substitution.
    fn expand_word(&mut self, raw: &RawWord) -> String {
        let text = raw.text();
        if raw.is_live_dollar(0) && !text.starts_with("$(") {
            return self.expand_var(text);
        }

        let Some(open) = text
            .match_indices("$(")
            .map(|(i, _)| i)
            .find(|&i| raw.is_live_dollar(i))
        else {
            return text.to_string();
        };
        let Some(close) = matching_paren(text, open + 1) else {
            return text.to_string();
        };

        let body = &text[open + 2..close];
        let output = match self.expand.capture(body) {
            Ok(mut out) => {
                if out.ends_with('\n') {
                    out.pop();
                }
                out
            }
            Err(e) => {
                self.errors.push(e);
                String::new()
            }
        };
        format!("{}{}{}", &text[..open], output, &text[close + 1..])
    }

    /// The whole word becomes the value of the name after `$`. Unset variables and a `$`
    /// with no name expand to nothing.
    fn expand_var(&self, text: &str) -> String {
        match var_name_regex().find(&text[1..]) {
            Some(name) => self.expand.lookup_var(name.as_str()).unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Byte index of the `)` closing the `(` at byte index `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Expand the words of `group` and group them into a [`CommandList`].
///
/// Substitutions run immediately through `expand`, left to right.
pub fn build_command_list(group: &RawGroup, expand: &mut dyn Expand) -> ParseOutcome {
    let mut builder = Builder {
        expand,
        errors: Vec::new(),
    };
    let commands = builder.build_list(group);
    ParseOutcome {
        commands,
        errors: builder.errors,
    }
}
