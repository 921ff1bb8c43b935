//! `%NAME%` token expansion and the path predicates the validators rely on.
//!
//! Stored configuration values routinely embed host variables such as
//! `%WINDIR%\Temp\php_errors.log`; every filesystem check expands them first.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;

lazy_static::lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"%([A-Za-z_][A-Za-z0-9_()]*)%").unwrap();
}

/// Expands `%NAME%` tokens from a set of host variables, falling back to the
/// process environment. Unknown tokens are left untouched.
#[derive(Debug, Clone, Default)]
pub struct EnvExpander {
    /// Keys are stored upper-cased; host variable names are case-insensitive
    overrides: HashMap<String, String>,
}

impl EnvExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables<I, K, V>(variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let overrides = variables
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_uppercase(), v.into()))
            .collect();
        Self { overrides }
    }

    pub fn lookup(&self, name: &str) -> Option<String> {
        self.overrides
            .get(&name.to_ascii_uppercase())
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    pub fn expand(&self, value: &str) -> String {
        if !value.contains('%') {
            return value.to_string();
        }
        TOKEN_RE
            .replace_all(value, |caps: &Captures| {
                self.lookup(&caps[1])
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// True for absolute paths, including drive-rooted Windows paths such as
/// `C:\php` regardless of the platform the check runs on.
pub fn is_rooted_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    if Path::new(path).is_absolute() || path.starts_with('\\') || path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Rooted file path whose parent directory exists; the file itself may not.
pub fn parent_dir_exists(path: &str) -> bool {
    if !is_rooted_path(path) {
        return false;
    }
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
        _ => false,
    }
}

/// Rooted path naming an existing directory.
pub fn dir_exists(path: &str) -> bool {
    is_rooted_path(path) && Path::new(path).is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expands_override_case_insensitively() {
        let env = EnvExpander::with_variables([("WinDir", "/srv/windows")]);
        assert_eq!(env.expand("%WINDIR%/Temp"), "/srv/windows/Temp");
        assert_eq!(env.expand("%windir%/Temp"), "/srv/windows/Temp");
    }

    #[test]
    fn test_unknown_token_left_verbatim() {
        let env = EnvExpander::new();
        assert_eq!(
            env.expand("%PHPMGR_SURELY_UNDEFINED_VAR%\\x"),
            "%PHPMGR_SURELY_UNDEFINED_VAR%\\x"
        );
        assert_eq!(env.expand("100%"), "100%");
    }

    #[test]
    fn test_rooted_paths() {
        assert!(is_rooted_path("C:\\php\\ext"));
        assert!(is_rooted_path("/usr/lib/php"));
        assert!(is_rooted_path("\\\\server\\share"));
        assert!(!is_rooted_path("ext"));
        assert!(!is_rooted_path("C:ext"));
        assert!(!is_rooted_path(""));
    }

    #[test]
    fn test_file_check_uses_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("php_errors.log");
        let log = log.to_str().unwrap();

        assert!(parent_dir_exists(log));
        assert!(!dir_exists(log));
        assert!(dir_exists(temp_dir.path().to_str().unwrap()));
        assert!(!parent_dir_exists("php_errors.log"));
        assert!(!parent_dir_exists(
            temp_dir.path().join("missing").join("x.log").to_str().unwrap()
        ));
    }
}
