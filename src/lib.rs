// ============================================================================
// phpmanager
// ============================================================================
//
// Reconciles a PHP interpreter's registration with the host web server's
// routing and process-pool configuration and with the interpreter's own
// settings file.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod ini;
pub mod reconcile;
pub mod storage;
pub mod transaction;

pub use config::ManagerConfig;
pub use core::{EnvExpander, ManagerError, Result};
pub use ini::{Extension, IniFile, Setting, SettingsStore};
pub use reconcile::{
    Candidate, ComplianceReport, InstallOutcome, InstallStage, PhpConfigurationManager,
    Registration, RegistrationInfo, ResourceVersionProbe, VersionProbe, Violation,
};
pub use storage::{
    HostConfiguration, ManagementUnit, MemoryUnit, ProcessPoolEntry, ProcessPoolStore,
    ResourceType, RoutingEntry, RoutingStore,
};
pub use transaction::{Epoch, Lease};
