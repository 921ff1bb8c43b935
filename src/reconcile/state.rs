//! Resolution of the active registration

use crate::config::ManagerConfig;
use crate::core::{EnvExpander, Result};
use crate::storage::{ManagementUnit, ProcessPoolEntry, ProcessPoolStore, RoutingEntry, RoutingStore};
use crate::transaction::Lease;
use std::path::{Path, PathBuf};

/// The routing entry active for the interpreter pattern and the process pool
/// serving its executable.
///
/// Only ever handed out inside a [`Lease`]: a commit makes it stale and it has
/// to be resolved again.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub handler: RoutingEntry,
    pub pool: ProcessPoolEntry,
}

impl Registration {
    pub fn handler_name(&self) -> &str {
        &self.handler.name
    }

    pub fn executable(&self) -> &str {
        &self.handler.script_processor
    }

    /// Directory holding the executable, tokens left unexpanded
    pub fn interpreter_dir(&self) -> PathBuf {
        interpreter_dir(self.executable())
    }

    /// Where the settings file lives, tokens expanded; it may not exist
    pub fn settings_path(&self, config: &ManagerConfig, env: &EnvExpander) -> PathBuf {
        interpreter_dir(&env.expand(self.executable())).join(&config.settings_file_name)
    }
}

pub(crate) fn interpreter_dir(executable: &str) -> PathBuf {
    Path::new(executable)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// File name of an executable path, splitting on either separator style
pub(crate) fn executable_file_name(executable: &str) -> &str {
    executable.rsplit(['\\', '/']).next().unwrap_or(executable)
}

/// Find the current registration, if both halves resolve
///
/// The routing store's first-match rule already puts local entries ahead of
/// inherited ones. A missing half means "unregistered", which is not an error.
pub fn resolve_current<U: ManagementUnit>(
    unit: &U,
    pattern: &str,
) -> Result<Option<Lease<Registration>>> {
    let epoch = unit.epoch();
    let Some(handler) = unit.routing()?.active_entry(pattern)? else {
        return Ok(None);
    };
    let Some(pool) = unit
        .process_pools()?
        .get_by_path(&handler.script_processor)?
    else {
        return Ok(None);
    };
    Ok(Some(Lease::new(epoch, Registration { handler, pool })))
}
