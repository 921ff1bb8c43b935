//! Corrective edits that bring a registration up to the recommendations.
//!
//! Both appliers compare before they write, so a second run over a compliant
//! registration stages nothing and commits nothing.

use super::ordering::copy_down;
use super::state::Registration;
use super::validate::{
    COMPATIBILITY_FLAGS, ERROR_LOG, EXTENSION_DIR, IMPERSONATION_FLAG, LOG_ERRORS, SESSION_SAVE_PATH,
};
use crate::config::ManagerConfig;
use crate::core::{EnvExpander, Result};
use crate::ini::{Extension, Setting, SettingsStore};
use crate::storage::{ManagementUnit, ProcessPoolStore, ResourceType, RoutingStore};
use crate::transaction::Lease;
use std::ffi::OsString;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use tracing::{Level, event};

const SECTION_PHP: &str = "PHP";
const SECTION_SESSION: &str = "Session";

/// Which flavour of settings repair to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsMode {
    /// Reconcile an existing file; the caller backs it up first
    Repair,
    /// First provisioning right after registration; also sets one-time defaults
    NewRegistration,
}

/// Settings and extension toggles to upsert into the settings file
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsPlan {
    pub settings: Vec<Setting>,
    pub extensions: Vec<Extension>,
}

/// `<original path><suffix>`, e.g. `C:\php\php.ini-phpmanager`
pub fn backup_path(settings_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(settings_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn join_setting_path(base: &str, leaf: &str) -> String {
    format!(
        "{}{}{}",
        base.trim_end_matches(['\\', '/']),
        MAIN_SEPARATOR,
        leaf
    )
}

/// The fixed list of recommended settings for one registration
pub fn recommended_settings(
    config: &ManagerConfig,
    handler_name: &str,
    interpreter_dir: &Path,
    mode: SettingsMode,
) -> SettingsPlan {
    let extension_dir = interpreter_dir
        .join(&config.extensions_dir_name)
        .display()
        .to_string();
    let error_log = join_setting_path(
        &config.temp_directory,
        &format!("{}_errors.log", handler_name),
    );

    let mut settings = vec![
        Setting::new(EXTENSION_DIR, extension_dir, SECTION_PHP),
        Setting::new(LOG_ERRORS, "On", SECTION_PHP),
        Setting::new(ERROR_LOG, error_log, SECTION_PHP),
        Setting::new(SESSION_SAVE_PATH, config.temp_directory.as_str(), SECTION_SESSION),
    ];
    settings.extend(
        COMPATIBILITY_FLAGS
            .iter()
            .map(|(name, value)| Setting::new(name, *value, SECTION_PHP)),
    );
    settings.push(Setting::new(IMPERSONATION_FLAG, "1", SECTION_PHP));

    let mut extensions = Vec::new();
    if mode == SettingsMode::NewRegistration {
        settings.push(Setting::new("fastcgi.logging", "0", SECTION_PHP));
        settings.push(Setting::new(
            "max_execution_time",
            config.max_execution_time.to_string(),
            SECTION_PHP,
        ));
        settings.push(Setting::new("display_errors", "Off", SECTION_PHP));
        extensions = config
            .default_extensions
            .iter()
            .map(|name| Extension::new(name, true))
            .collect();
    }

    SettingsPlan {
        settings,
        extensions,
    }
}

/// Upsert the plan; returns whether anything differed
pub fn apply_settings_group<S: SettingsStore + ?Sized>(store: &mut S, plan: &SettingsPlan) -> bool {
    let settings_changed = plan.settings.iter().any(|wanted| {
        store
            .get_setting(&wanted.name)
            .is_none_or(|current| current.trimmed_value() != wanted.trimmed_value())
    });
    let current_extensions = store.extensions();
    let extensions_changed = plan.extensions.iter().any(|wanted| {
        !current_extensions
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(&wanted.name) && e.enabled == wanted.enabled)
    });

    if settings_changed {
        store.add_or_update_settings(&plan.settings);
    }
    if extensions_changed {
        store.update_extensions(&plan.extensions);
    }
    settings_changed || extensions_changed
}

/// Bring the routing entry and process pool in line, then commit
///
/// Returns `false` without committing when both were already in line. An
/// inherited routing entry is copied down first so it can be edited locally.
pub fn apply_pool_group<U: ManagementUnit>(
    unit: &mut U,
    registration: &Lease<Registration>,
    config: &ManagerConfig,
    env: &EnvExpander,
) -> Result<bool> {
    let current = registration.get(unit.epoch())?;
    let interpreter_dir = current.interpreter_dir().display().to_string();
    let settings_path = current.settings_path(config, env).display().to_string();

    let mut handler = current.handler.clone();
    handler.resource_type = ResourceType::Either;
    let handler_changed = handler.resource_type != current.handler.resource_type;

    let supports_watch = unit.process_pools()?.supports_file_watch();
    let mut pool = current.pool.clone();
    pool.set_env(&config.max_requests_variable, config.max_requests.to_string());
    pool.instance_max_requests = config.max_requests;
    pool.set_env(&config.settings_dir_variable, interpreter_dir);
    if supports_watch {
        pool.monitor_changes_to = Some(settings_path);
    }
    let pool_changed = pool != current.pool;

    if !handler_changed && !pool_changed {
        return Ok(false);
    }

    if handler_changed {
        let routing = unit.routing_mut()?;
        if current.handler.is_inherited() {
            copy_down(routing)?;
        }
        routing.replace(&handler)?;
    }
    if pool_changed {
        unit.process_pools_mut()?.replace(&pool)?;
    }

    let epoch = unit.commit()?;
    unit.resync()?;
    event!(
        Level::INFO,
        handler = %handler.name,
        handler_changed,
        pool_changed,
        %epoch,
        "pool group brought in line"
    );
    Ok(true)
}
