use crate::error::ShellError;
use std::path::{Path, PathBuf};

/// Directory probed first when the shell starts.
pub const DEFAULT_SEARCH_DIR: &str = "/bin";

/// Ordered list of directories probed to resolve a bare command name.
///
/// It is only ever replaced wholesale (see the `path` builtin); there is no way to edit
/// a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<String>,
}

impl Default for SearchPath {
    fn default() -> Self {
        Self::new(vec![DEFAULT_SEARCH_DIR.to_string()])
    }
}

impl SearchPath {
    pub fn new(dirs: Vec<String>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    /// Swap in `dirs` as the new list. The previous list is dropped as a whole.
    pub fn replace(&mut self, dirs: Vec<String>) {
        self.dirs = dirs;
    }
}

/// Resolve a command name to an executable the way the shell does.
///
/// Behavior:
/// - Empty name: not found.
/// - Name containing `/` (absolute, `./foo`, `bin/foo`, ...): returned unchanged if it is
///   executable, never searched for.
/// - Bare name: probe the current working directory, then each entry of `search_path` in
///   order, and return the first `dir/name` that is executable.
pub fn find_command_path(search_path: &SearchPath, name: &str) -> Result<PathBuf, ShellError> {
    let not_found = || ShellError::NotFound(name.to_string());

    if name.is_empty() {
        return Err(not_found());
    }

    if name.contains('/') {
        let path = Path::new(name);
        return if is_executable(path) {
            Ok(path.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let cwd = std::env::current_dir().ok();
    let candidates = cwd
        .into_iter()
        .chain(search_path.dirs().iter().map(PathBuf::from))
        .map(|dir| dir.join(name));

    for candidate in candidates {
        if is_executable(&candidate) {
            tracing::debug!(command = name, path = %candidate.display(), "resolved");
            return Ok(candidate);
        }
    }
    Err(not_found())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Serializes tests that read or change the process working directory.
    pub(crate) fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(unix)]
    pub(crate) fn make_executable(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    fn path_of(dirs: &[&Path]) -> SearchPath {
        SearchPath::new(dirs.iter().map(|d| d.to_string_lossy().to_string()).collect())
    }

    #[test]
    fn test_default_search_path_is_bin() {
        assert_eq!(SearchPath::default().dirs(), &["/bin".to_string()]);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing() {
        let res = find_command_path(&SearchPath::new(Vec::new()), "/bin/sh");
        assert_eq!(res.unwrap(), PathBuf::from("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let res = find_command_path(&SearchPath::default(), "/bin/nonexisting");
        assert!(matches!(res, Err(ShellError::NotFound(_))));
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_file_is_skipped() {
        let _lock = lock_current_dir();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("tool"), "not a program").unwrap();
        let expected = make_executable(second.path(), "tool");

        let res = find_command_path(&path_of(&[first.path(), second.path()]), "tool");
        assert_eq!(res.unwrap(), expected);
    }

    #[test]
    #[cfg(unix)]
    fn search_order_is_respected() {
        let _lock = lock_current_dir();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let in_first = make_executable(first.path(), "tool");
        make_executable(second.path(), "tool");

        let res = find_command_path(&path_of(&[first.path(), second.path()]), "tool");
        assert_eq!(res.unwrap(), in_first);
    }

    #[test]
    #[cfg(unix)]
    fn replaced_path_forgets_old_dirs() {
        let _lock = lock_current_dir();
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        make_executable(old.path(), "only_in_old");

        let mut search = path_of(&[old.path()]);
        assert!(find_command_path(&search, "only_in_old").is_ok());

        search.replace(vec![new.path().to_string_lossy().to_string()]);
        assert!(find_command_path(&search, "only_in_old").is_err());
    }

    #[test]
    #[cfg(unix)]
    fn empty_search_path_finds_nothing_bare() {
        let _lock = lock_current_dir();
        let res = find_command_path(&SearchPath::new(Vec::new()), "sh");
        assert!(res.is_err());
    }

    #[test]
    #[cfg(unix)]
    fn current_dir_is_probed_first() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let work = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        make_executable(work.path(), "local_tool");
        make_executable(other.path(), "local_tool");

        std::env::set_current_dir(work.path()).expect("set cwd");
        let res = find_command_path(&path_of(&[other.path()]), "local_tool");
        std::env::set_current_dir(&cwd_before).ok();

        let found = res.expect("expected to find local_tool in the working directory");
        assert_eq!(
            fs::canonicalize(found).unwrap(),
            fs::canonicalize(work.path().join("local_tool")).unwrap()
        );
    }

    #[test]
    #[cfg(unix)]
    fn dot_prefixed_path_is_checked_directly() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let work = tempfile::tempdir().unwrap();
        make_executable(work.path(), "foo");

        std::env::set_current_dir(work.path()).expect("set cwd");
        let found = find_command_path(&SearchPath::new(Vec::new()), "./foo");
        let missing = find_command_path(&SearchPath::new(Vec::new()), "./bar");
        std::env::set_current_dir(&cwd_before).ok();

        assert_eq!(found.unwrap(), PathBuf::from("./foo"));
        assert!(missing.is_err());
    }

    #[test]
    fn empty_name_is_not_found() {
        let res = find_command_path(&SearchPath::default(), "");
        assert!(matches!(res, Err(ShellError::NotFound(_))));
    }
}
