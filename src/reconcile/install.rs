// ============================================================================
// Registration Workflow
// ============================================================================
//
//   Unvalidated -> PathChecked -> PrerequisitesChecked -> SettingsFileEnsured
//     -> PoolEntryEnsured -> RoutingEntryEnsured -> Committed -> PostCommitTuned
//
// Every guard runs before anything is staged in the stores. Pool and routing
// entries are built detached and only linked into their collections once
// complete; nothing reaches the host before the commit step.
//
// ============================================================================

use super::ordering::promote;
use super::repair::{SettingsMode, apply_pool_group, apply_settings_group, recommended_settings};
use super::state::{Registration, executable_file_name, interpreter_dir, resolve_current};
use crate::config::ManagerConfig;
use crate::core::{EnvExpander, ManagerError, Result};
use crate::ini::{IniFile, SettingsStore};
use crate::storage::{
    AccessRequirement, ManagementUnit, ProcessPoolStore, ResourceType, RoutingEntry, RoutingStore,
};
use crate::transaction::Lease;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallStage {
    Unvalidated,
    PathChecked,
    PrerequisitesChecked,
    SettingsFileEnsured,
    PoolEntryEnsured,
    RoutingEntryEnsured,
    Committed,
    PostCommitTuned,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Unvalidated => "UNVALIDATED",
            InstallStage::PathChecked => "PATH_CHECKED",
            InstallStage::PrerequisitesChecked => "PREREQUISITES_CHECKED",
            InstallStage::SettingsFileEnsured => "SETTINGS_FILE_ENSURED",
            InstallStage::PoolEntryEnsured => "POOL_ENTRY_ENSURED",
            InstallStage::RoutingEntryEnsured => "ROUTING_ENTRY_ENSURED",
            InstallStage::Committed => "COMMITTED",
            InstallStage::PostCommitTuned => "POST_COMMIT_TUNED",
        };
        f.write_str(name)
    }
}

/// What a registration run created versus found
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub registration: Lease<Registration>,
    pub settings_path: PathBuf,
    pub settings_file_created: bool,
    pub pool_created: bool,
    pub handler_created: bool,
    pub stage: InstallStage,
}

struct Installer<'a, U: ManagementUnit> {
    unit: &'a mut U,
    config: &'a ManagerConfig,
    env: &'a EnvExpander,
    stage: InstallStage,
}

impl<'a, U: ManagementUnit> Installer<'a, U> {
    fn advance(&mut self, next: InstallStage) {
        debug_assert!(next > self.stage);
        event!(Level::DEBUG, from = %self.stage, to = %next, "registration stage");
        self.stage = next;
    }

    /// Guards 1-2: recognised file name, file present after expansion
    fn check_path(&mut self, executable: &str) -> Result<String> {
        let file_name = executable_file_name(executable);
        if !self.config.is_recognized_executable(file_name) {
            return Err(ManagerError::InvalidArgument(format!(
                "'{}' is not one of {}",
                file_name,
                self.config.executable_names.join(", ")
            )));
        }
        let expanded = self.env.expand(executable);
        if !Path::new(&expanded).is_file() {
            return Err(ManagerError::not_found("Executable", expanded));
        }
        self.advance(InstallStage::PathChecked);
        Ok(expanded)
    }

    /// Guard 3: extension directory beside the executable
    fn check_prerequisites(&mut self, dir: &Path) -> Result<()> {
        let extensions = dir.join(&self.config.extensions_dir_name);
        if !extensions.is_dir() {
            return Err(ManagerError::not_found(
                "Extensions directory",
                extensions.display().to_string(),
            ));
        }
        self.advance(InstallStage::PrerequisitesChecked);
        Ok(())
    }

    /// Step 4: copy the first available template when the settings file is missing
    fn ensure_settings_file(&mut self, dir: &Path) -> Result<(PathBuf, bool)> {
        let settings_path = dir.join(&self.config.settings_file_name);
        let mut created = false;
        if !settings_path.is_file() {
            let template = self
                .config
                .settings_templates
                .iter()
                .map(|name| dir.join(name))
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| {
                    let wanted = self
                        .config
                        .settings_templates
                        .first()
                        .map(|name| dir.join(name).display().to_string())
                        .unwrap_or_default();
                    ManagerError::not_found("Settings template", wanted)
                })?;
            fs::copy(&template, &settings_path).map_err(|err| {
                ManagerError::Io(format!(
                    "Failed to copy '{}' to '{}': {}",
                    template.display(),
                    settings_path.display(),
                    err
                ))
            })?;
            event!(Level::INFO, template = %template.display(), "settings file provisioned from template");
            created = true;
        }
        self.advance(InstallStage::SettingsFileEnsured);
        Ok((settings_path, created))
    }

    /// Step 5: find or create the process pool for this executable
    fn ensure_pool(&mut self, executable: &str, dir: &Path, settings_path: &Path) -> Result<bool> {
        let pools = self.unit.process_pools_mut()?;
        if pools.get_by_path(executable)?.is_some() {
            self.advance(InstallStage::PoolEntryEnsured);
            return Ok(false);
        }

        let mut pool = pools.create(executable);
        pool.instance_max_requests = self.config.max_requests;
        pool.activity_timeout = self.config.activity_timeout;
        pool.request_timeout = self.config.request_timeout;
        pool.set_env(&self.config.settings_dir_variable, dir.display().to_string());
        pool.set_env(
            &self.config.max_requests_variable,
            self.config.max_requests.to_string(),
        );
        if pools.supports_file_watch() {
            pool.monitor_changes_to = Some(settings_path.display().to_string());
        }
        pools.add(pool)?;

        self.advance(InstallStage::PoolEntryEnsured);
        Ok(true)
    }

    /// Step 6: find, create or promote the routing entry for this executable
    fn ensure_handler(&mut self, executable: &str) -> Result<bool> {
        let pattern = self.config.handler_pattern.as_str();
        let routing = self.unit.routing_mut()?;

        let created = match routing.entry_for(pattern, executable)? {
            None => {
                let name = unique_handler_name(&*routing, &self.config.handler_name_prefix)?;
                let mut entry = RoutingEntry::new(&name, pattern, executable);
                entry.verb = "*".to_string();
                entry.modules = self.config.module_binding.clone();
                entry.require_access = AccessRequirement::Script;
                entry.resource_type = ResourceType::Either;
                routing.insert_at(0, entry)?;
                true
            }
            Some(existing) => {
                if let Some(active) = routing.active_entry(pattern)? {
                    if active.name != existing.name {
                        promote(routing, &existing.name, &active.name)?;
                    }
                }
                false
            }
        };

        self.advance(InstallStage::RoutingEntryEnsured);
        Ok(created)
    }

    /// Step 7: commit and resolve against the fresh handles
    fn commit(&mut self) -> Result<Lease<Registration>> {
        let epoch = self.unit.commit()?;
        self.unit.resync()?;
        self.advance(InstallStage::Committed);
        event!(Level::INFO, %epoch, "registration committed");
        self.resolve()
    }

    fn resolve(&self) -> Result<Lease<Registration>> {
        resolve_current(&*self.unit, &self.config.handler_pattern)?.ok_or_else(|| {
            ManagerError::Store("registration did not resolve after commit".to_string())
        })
    }
}

/// `<prefix>`, or `<prefix>_<n>` with the smallest free `n`
fn unique_handler_name<R: RoutingStore + ?Sized>(routing: &R, prefix: &str) -> Result<String> {
    let taken: Vec<String> = routing.entries()?.into_iter().map(|e| e.name).collect();
    let is_free = |candidate: &str| !taken.iter().any(|name| name.eq_ignore_ascii_case(candidate));
    if is_free(prefix) {
        return Ok(prefix.to_string());
    }
    let mut n = 1usize;
    loop {
        let candidate = format!("{}_{}", prefix, n);
        if is_free(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Register `executable` and make it the active interpreter
pub fn register<U: ManagementUnit>(
    unit: &mut U,
    config: &ManagerConfig,
    env: &EnvExpander,
    executable: &str,
) -> Result<InstallOutcome> {
    let span = info_span!("phpmanager.register", executable = %executable);
    let _guard = span.enter();

    let mut installer = Installer {
        unit,
        config,
        env,
        stage: InstallStage::Unvalidated,
    };

    let executable = installer.check_path(executable)?;
    let dir = interpreter_dir(&executable);
    installer.check_prerequisites(&dir)?;
    let (settings_path, settings_file_created) = installer.ensure_settings_file(&dir)?;
    let pool_created = installer.ensure_pool(&executable, &dir, &settings_path)?;
    let handler_created = installer.ensure_handler(&executable)?;
    let mut registration = installer.commit()?;

    if !(pool_created && handler_created) {
        apply_pool_group(installer.unit, &registration, config, env)?;
        registration = installer.resolve()?;
    }

    let current = registration.get(installer.unit.epoch())?;
    let plan = recommended_settings(
        config,
        current.handler_name(),
        &current.interpreter_dir(),
        SettingsMode::NewRegistration,
    );
    let mut settings = IniFile::load(&settings_path)?;
    if apply_settings_group(&mut settings, &plan) {
        settings.save(&settings_path)?;
    }
    installer.advance(InstallStage::PostCommitTuned);

    event!(
        Level::INFO,
        handler = %current.handler_name(),
        pool_created,
        handler_created,
        settings_file_created,
        "interpreter registered"
    );

    Ok(InstallOutcome {
        registration,
        settings_path,
        settings_file_created,
        pool_created,
        handler_created,
        stage: installer.stage,
    })
}
