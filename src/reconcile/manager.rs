// ============================================================================
// PhpConfigurationManager
// ============================================================================
//
// Holds the management unit and the current registration lease. Every
// operation that commits re-resolves the lease before returning, so the
// cached registration never outlives the epoch it was read in.
//
// ============================================================================

use super::discovery::{Candidate, ResourceVersionProbe, UNKNOWN_VERSION, VersionProbe, discover};
use super::install::{InstallOutcome, register};
use super::ordering::promote;
use super::repair::{
    SettingsMode, apply_pool_group, apply_settings_group, backup_path, recommended_settings,
};
use super::state::{Registration, resolve_current};
use super::validate::{ERROR_LOG, Violation, check_pool_group, check_settings_group};
use crate::config::ManagerConfig;
use crate::core::{EnvExpander, ManagerError, Result};
use crate::ini::{IniFile, SettingsStore};
use crate::storage::{ManagementUnit, ProcessPoolStore, RoutingStore};
use crate::transaction::Lease;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, event, info_span};

/// Summary of the active registration for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationInfo {
    pub handler_name: String,
    pub executable: String,
    pub version: String,
    pub settings_path: PathBuf,
    pub error_log: Option<String>,
    pub enabled_extensions: usize,
    pub installed_extensions: usize,
}

/// First failure of each validation group; `None` means compliant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceReport {
    pub pool_group: Option<Violation>,
    pub settings_group: Option<Violation>,
}

impl ComplianceReport {
    pub fn is_compliant(&self) -> bool {
        self.pool_group.is_none() && self.settings_group.is_none()
    }
}

pub struct PhpConfigurationManager<U: ManagementUnit> {
    unit: U,
    config: ManagerConfig,
    env: EnvExpander,
    probe: Box<dyn VersionProbe>,
    current: Option<Lease<Registration>>,
}

impl<U: ManagementUnit> PhpConfigurationManager<U> {
    /// Wrap `unit` and resolve the current registration
    pub fn new(unit: U, config: ManagerConfig) -> Result<Self> {
        let env = config.expander();
        let current = resolve_current(&unit, &config.handler_pattern)?;
        Ok(Self {
            unit,
            config,
            env,
            probe: Box::new(ResourceVersionProbe),
            current,
        })
    }

    pub fn with_version_probe(mut self, probe: impl VersionProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn unit(&self) -> &U {
        &self.unit
    }

    pub fn into_unit(self) -> U {
        self.unit
    }

    /// The active registration, or `None` when unregistered
    pub fn current(&self) -> Result<Option<&Registration>> {
        match &self.current {
            Some(lease) => Ok(Some(lease.get(self.unit.epoch())?)),
            None => Ok(None),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.current.is_some()
    }

    fn refresh(&mut self) -> Result<()> {
        self.current = resolve_current(&self.unit, &self.config.handler_pattern)?;
        Ok(())
    }

    fn settings_file_of(&self, registration: &Registration) -> PathBuf {
        registration.settings_path(&self.config, &self.env)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Every registered interpreter whose executable exists
    pub fn candidates(&self) -> Result<Vec<Candidate>> {
        discover(
            self.unit.routing()?,
            &self.config.handler_pattern,
            &*self.probe,
            &self.env,
        )
    }

    /// Path of the active interpreter's settings file
    ///
    /// Fails with `NotFound` when unregistered or when the file is absent.
    pub fn settings_path(&self) -> Result<PathBuf> {
        let Some(current) = self.current()? else {
            return Err(ManagerError::not_found(
                "Settings file",
                format!("<unregistered {}>", self.config.handler_pattern),
            ));
        };
        let path = self.settings_file_of(current);
        if !path.is_file() {
            return Err(ManagerError::not_found("Settings file", path.display().to_string()));
        }
        Ok(path)
    }

    pub fn current_info(&self) -> Result<Option<RegistrationInfo>> {
        let Some(current) = self.current()? else {
            return Ok(None);
        };
        let settings_path = self.settings_path()?;
        let settings = IniFile::load(&settings_path)?;

        let executable = self.env.expand(current.executable());
        let version = self
            .probe
            .version(Path::new(&executable))
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let extension_dir = Path::new(&executable)
            .parent()
            .map(|dir| dir.join(&self.config.extensions_dir_name));

        Ok(Some(RegistrationInfo {
            handler_name: current.handler_name().to_string(),
            executable: current.executable().to_string(),
            version,
            settings_path,
            error_log: settings
                .get_setting(ERROR_LOG)
                .map(|s| s.trimmed_value().to_string()),
            enabled_extensions: settings.enabled_extension_count(),
            installed_extensions: extension_dir.as_deref().map_or(0, count_modules),
        }))
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn check_pool_group(&self) -> Result<Option<Violation>> {
        let Some(current) = self.current()? else {
            return Ok(Some(Violation::NotRegistered));
        };
        let supports_watch = self.unit.process_pools()?.supports_file_watch();
        Ok(check_pool_group(current, supports_watch, &self.config, &self.env))
    }

    pub fn check_settings_group(&self) -> Result<Option<Violation>> {
        let Some(current) = self.current()? else {
            return Ok(Some(Violation::NotRegistered));
        };
        let path = self.settings_file_of(current);
        if !path.is_file() {
            return Ok(Some(Violation::SettingsFileMissing(path.display().to_string())));
        }
        let settings = IniFile::load(&path)?;
        let interpreter_dir = current.interpreter_dir().display().to_string();
        Ok(check_settings_group(&settings, &interpreter_dir, &self.env))
    }

    pub fn is_pool_group_compliant(&self) -> Result<bool> {
        Ok(self.check_pool_group()?.is_none())
    }

    pub fn is_settings_group_compliant(&self) -> Result<bool> {
        Ok(self.check_settings_group()?.is_none())
    }

    pub fn diagnose(&self) -> Result<ComplianceReport> {
        Ok(ComplianceReport {
            pool_group: self.check_pool_group()?,
            settings_group: self.check_settings_group()?,
        })
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Register `executable` and make it the active interpreter
    pub fn register(&mut self, executable: &str) -> Result<InstallOutcome> {
        let outcome = register(&mut self.unit, &self.config, &self.env, executable);
        // a failure after commit still leaves a new epoch behind
        let refreshed = self.refresh();
        let outcome = outcome?;
        refreshed?;
        Ok(outcome)
    }

    /// Make the routing entry called `name` the active one
    ///
    /// A no-op when unregistered or when `name` is already active.
    pub fn select_handler(&mut self, name: &str) -> Result<()> {
        let span = info_span!("phpmanager.select_handler", handler = %name);
        let _guard = span.enter();

        let Some(current) = self.current()? else {
            event!(Level::DEBUG, "unregistered; nothing to switch");
            return Ok(());
        };
        let active = current.handler_name().to_string();
        if active == name {
            return Ok(());
        }

        let routing = self.unit.routing()?;
        let target = routing
            .get(name)?
            .ok_or_else(|| ManagerError::not_found("Handler", name))?;
        if !target.matches_pattern(&self.config.handler_pattern) {
            return Err(ManagerError::InvalidArgument(format!(
                "handler '{}' does not serve '{}'",
                target.name, self.config.handler_pattern
            )));
        }
        if self
            .unit
            .process_pools()?
            .get_by_path(&target.script_processor)?
            .is_none()
        {
            return Err(ManagerError::not_found(
                "Process pool",
                target.script_processor,
            ));
        }

        promote(self.unit.routing_mut()?, &target.name, &active)?;
        let epoch = self.unit.commit()?;
        self.unit.resync()?;
        self.refresh()?;
        event!(Level::INFO, from = %active, to = %target.name, %epoch, "active handler switched");
        Ok(())
    }

    /// Bring the routing entry and process pool in line with the recommendations
    ///
    /// Returns whether anything was committed.
    pub fn apply_pool_group_settings(&mut self) -> Result<bool> {
        let Some(lease) = self.current.clone() else {
            return Ok(false);
        };
        let changed = apply_pool_group(&mut self.unit, &lease, &self.config, &self.env)?;
        if changed {
            self.refresh()?;
        }
        Ok(changed)
    }

    /// Repair whichever groups are non-compliant
    ///
    /// Returns the backup of the settings file when that file was edited,
    /// `None` when it was already compliant.
    pub fn apply_recommended_settings(&mut self) -> Result<Option<PathBuf>> {
        let span = info_span!("phpmanager.apply_recommended_settings");
        let _guard = span.enter();

        if !self.is_registered() {
            return Ok(None);
        }

        if let Some(violation) = self.check_pool_group()? {
            event!(Level::INFO, %violation, "repairing pool group");
            self.apply_pool_group_settings()?;
        }

        let Some(violation) = self.check_settings_group()? else {
            return Ok(None);
        };
        event!(Level::INFO, %violation, "repairing settings group");

        let settings_path = self.settings_path()?;
        let backup = backup_path(&settings_path, &self.config.backup_suffix);
        fs::copy(&settings_path, &backup).map_err(|err| {
            ManagerError::Io(format!(
                "Failed to back up '{}' to '{}': {}",
                settings_path.display(),
                backup.display(),
                err
            ))
        })?;

        let (handler_name, interpreter_dir) = match self.current()? {
            Some(current) => (current.handler_name().to_string(), current.interpreter_dir()),
            None => return Ok(None),
        };
        let plan = recommended_settings(
            &self.config,
            &handler_name,
            &interpreter_dir,
            SettingsMode::Repair,
        );
        let mut settings = IniFile::load(&settings_path)?;
        if apply_settings_group(&mut settings, &plan) {
            settings.save(&settings_path)?;
        }
        event!(Level::INFO, backup = %backup.display(), "settings file repaired");
        Ok(Some(backup))
    }
}

/// Number of loadable modules (`*.dll`) in an extension directory
fn count_modules(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    entry
                        .path()
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("dll"))
                })
                .count()
        })
        .unwrap_or(0)
}
