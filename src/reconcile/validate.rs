// ============================================================================
// Compliance Checks
// ============================================================================
//
// Two independent groups, each short-circuiting on its first failure:
//
//   pool group      routing entry + process-pool entry (+ settings location)
//   settings group  the interpreter's settings file
//
// The boolean verdicts wrap these; the `Violation` is kept for diagnostics.
//
// ============================================================================

use super::state::Registration;
use crate::config::ManagerConfig;
use crate::core::{EnvExpander, dir_exists, is_rooted_path, parent_dir_exists};
use crate::ini::SettingsStore;
use crate::storage::ResourceType;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Flags that must hold exact values, as (setting, required value)
pub const COMPATIBILITY_FLAGS: [(&str, &str); 2] =
    [("cgi.force_redirect", "0"), ("cgi.fix_pathinfo", "1")];

pub const IMPERSONATION_FLAG: &str = "fastcgi.impersonate";
pub const EXTENSION_DIR: &str = "extension_dir";
pub const LOG_ERRORS: &str = "log_errors";
pub const ERROR_LOG: &str = "error_log";
pub const SESSION_SAVE_PATH: &str = "session.save_path";

/// First recommendation a registration fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Violation {
    NotRegistered,
    ResourceTypeTooNarrow {
        handler: String,
        resource_type: String,
    },
    MaxRequestsVariableMissing(String),
    MaxRequestsVariableInvalid {
        variable: String,
        value: String,
    },
    MaxRequestsBelowInstanceCap {
        bound: i64,
        cap: u64,
    },
    SettingsDirVariableMissing(String),
    SettingsDirUnusable {
        variable: String,
        value: String,
    },
    FileWatchMismatch {
        expected: String,
        actual: Option<String>,
    },
    SettingsFileMissing(String),
    ExtensionDirInvalid(Option<String>),
    ErrorLoggingDisabled,
    ErrorLogInvalid(Option<String>),
    SessionPathInvalid(Option<String>),
    FlagMismatch {
        setting: String,
        expected: String,
        actual: Option<String>,
    },
}

fn show(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<unset>")
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotRegistered => write!(f, "no interpreter is registered"),
            Violation::ResourceTypeTooNarrow {
                handler,
                resource_type,
            } => write!(
                f,
                "routing entry '{}' only serves {} resources",
                handler, resource_type
            ),
            Violation::MaxRequestsVariableMissing(var) => {
                write!(f, "environment variable {} is not set", var)
            }
            Violation::MaxRequestsVariableInvalid { variable, value } => {
                write!(f, "{}='{}' is not an integer", variable, value)
            }
            Violation::MaxRequestsBelowInstanceCap { bound, cap } => write!(
                f,
                "request bound {} is lower than the instance cap {}",
                bound, cap
            ),
            Violation::SettingsDirVariableMissing(var) => {
                write!(f, "environment variable {} is not set", var)
            }
            Violation::SettingsDirUnusable { variable, value } => write!(
                f,
                "{}='{}' does not point at a directory holding the settings file",
                variable, value
            ),
            Violation::FileWatchMismatch { expected, actual } => write!(
                f,
                "file watch is '{}', expected '{}'",
                show(actual),
                expected
            ),
            Violation::SettingsFileMissing(path) => {
                write!(f, "settings file '{}' does not exist", path)
            }
            Violation::ExtensionDirInvalid(value) => write!(
                f,
                "extension_dir '{}' is not an absolute path inside the interpreter directory",
                show(value)
            ),
            Violation::ErrorLoggingDisabled => write!(f, "log_errors is not enabled"),
            Violation::ErrorLogInvalid(value) => write!(
                f,
                "error_log '{}' is not an absolute file path in an existing directory",
                show(value)
            ),
            Violation::SessionPathInvalid(value) => write!(
                f,
                "session.save_path '{}' is not an existing absolute directory",
                show(value)
            ),
            Violation::FlagMismatch {
                setting,
                expected,
                actual,
            } => write!(f, "{} is '{}', expected '{}'", setting, show(actual), expected),
        }
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .trim_end_matches('/')
        .to_ascii_lowercase()
}

/// Case-insensitive "is `path` inside (or equal to) `dir`"
pub(crate) fn path_is_under(path: &str, dir: &str) -> bool {
    let path = normalize(path);
    let dir = normalize(dir);
    !dir.is_empty() && (path == dir || path.starts_with(&format!("{}/", dir)))
}

pub(crate) fn same_path(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Invariants 1-4: routing entry, process pool and settings location
pub fn check_pool_group(
    registration: &Registration,
    supports_file_watch: bool,
    config: &ManagerConfig,
    env: &EnvExpander,
) -> Option<Violation> {
    let handler = &registration.handler;
    let pool = &registration.pool;

    if !handler.resource_type.accepts_both() {
        return Some(Violation::ResourceTypeTooNarrow {
            handler: handler.name.clone(),
            resource_type: format!("{:?}", handler.resource_type),
        });
    }

    let variable = &config.max_requests_variable;
    let Some(raw_bound) = pool.env(variable) else {
        return Some(Violation::MaxRequestsVariableMissing(variable.clone()));
    };
    let Ok(bound) = raw_bound.trim().parse::<i64>() else {
        return Some(Violation::MaxRequestsVariableInvalid {
            variable: variable.clone(),
            value: raw_bound.to_string(),
        });
    };
    let cap = pool.instance_max_requests;
    match i64::try_from(cap) {
        Ok(cap_i64) if bound >= cap_i64 => {}
        _ => return Some(Violation::MaxRequestsBelowInstanceCap { bound, cap }),
    }

    let variable = &config.settings_dir_variable;
    let Some(settings_dir) = pool.env(variable) else {
        return Some(Violation::SettingsDirVariableMissing(variable.clone()));
    };
    let expanded = env.expand(settings_dir);
    if !dir_exists(&expanded) || !Path::new(&expanded).join(&config.settings_file_name).is_file() {
        return Some(Violation::SettingsDirUnusable {
            variable: variable.clone(),
            value: settings_dir.to_string(),
        });
    }

    if supports_file_watch {
        let expected = registration.settings_path(config, env).display().to_string();
        let matches = pool
            .monitor_changes_to
            .as_deref()
            .is_some_and(|actual| same_path(&env.expand(actual), &expected));
        if !matches {
            return Some(Violation::FileWatchMismatch {
                expected,
                actual: pool.monitor_changes_to.clone(),
            });
        }
    }

    None
}

fn value_of<S: SettingsStore + ?Sized>(store: &S, name: &str) -> Option<String> {
    store.get_setting(name).map(|s| s.trimmed_value().to_string())
}

/// `session.save_path` may carry a `N;MODE;` prefix before the directory
fn session_directory(value: &str) -> &str {
    value.rsplit(';').next().unwrap_or(value)
}

/// Invariants 5-9: the settings file
pub fn check_settings_group<S: SettingsStore + ?Sized>(
    store: &S,
    interpreter_dir: &str,
    env: &EnvExpander,
) -> Option<Violation> {
    let extension_dir = value_of(store, EXTENSION_DIR);
    let expanded_interpreter_dir = env.expand(interpreter_dir);
    let extension_dir_ok = extension_dir.as_deref().is_some_and(|value| {
        let expanded = env.expand(value);
        is_rooted_path(&expanded) && path_is_under(&expanded, &expanded_interpreter_dir)
    });
    if !extension_dir_ok {
        return Some(Violation::ExtensionDirInvalid(extension_dir));
    }

    let logging_on = store
        .get_setting(LOG_ERRORS)
        .is_some_and(|setting| setting.is_enabled());
    if !logging_on {
        return Some(Violation::ErrorLoggingDisabled);
    }

    let error_log = value_of(store, ERROR_LOG);
    if !error_log
        .as_deref()
        .is_some_and(|value| parent_dir_exists(&env.expand(value)))
    {
        return Some(Violation::ErrorLogInvalid(error_log));
    }

    let session_path = value_of(store, SESSION_SAVE_PATH);
    if !session_path
        .as_deref()
        .is_some_and(|value| dir_exists(&env.expand(session_directory(value))))
    {
        return Some(Violation::SessionPathInvalid(session_path));
    }

    let flags = COMPATIBILITY_FLAGS
        .iter()
        .copied()
        .chain(std::iter::once((IMPERSONATION_FLAG, "1")));
    for (setting, expected) in flags {
        let actual = value_of(store, setting);
        if actual.as_deref() != Some(expected) {
            return Some(Violation::FlagMismatch {
                setting: setting.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    None
}
