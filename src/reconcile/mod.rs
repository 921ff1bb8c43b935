// ============================================================================
// Reconciliation Engine
// ============================================================================
//
//   resolve ──> discover / validate ──> repair
//      ^                                  │
//      └────────── re-resolve after every commit
//
// `state` finds the active registration, `validate` checks it against the
// recommended configuration, `repair` and `install` change it, `ordering`
// moves routing entries, and `manager` ties them into one façade.
//
// ============================================================================

pub mod discovery;
pub mod install;
pub mod manager;
pub mod ordering;
pub mod repair;
pub mod state;
pub mod validate;

pub use discovery::{Candidate, ResourceVersionProbe, UNKNOWN_VERSION, VersionProbe, discover};
pub use install::{InstallOutcome, InstallStage, register};
pub use manager::{ComplianceReport, PhpConfigurationManager, RegistrationInfo};
pub use ordering::{copy_down, promote};
pub use repair::{
    SettingsMode, SettingsPlan, apply_pool_group, apply_settings_group, backup_path,
    recommended_settings,
};
pub use state::{Registration, resolve_current};
pub use validate::{Violation, check_pool_group, check_settings_group};
