use crate::external::SearchPath;
use crate::history::History;
use std::env as stdenv;

/// Mutable state owned by one shell session.
///
/// The environment contains:
/// - `search_path`: directories probed for bare command names, replaced by `path`.
/// - `history`: the last few input lines, replayed with `!N`.
/// - `should_exit`: set by `exit`; the read loop checks it after every line.
///
/// The working directory is not stored here: `cd` and `pwd` act on the process itself, so
/// spawned children inherit it.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub search_path: SearchPath,
    pub history: History,
    pub should_exit: bool,
}

impl Environment {
    /// Fresh session state: search path `/bin`, empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of a process environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        stdenv::var(key).ok()
    }
}
