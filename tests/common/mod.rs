//! Shared fixture: a throwaway host with fake interpreter installs on disk

#![allow(dead_code)]

use phpmanager::{HostConfiguration, ManagerConfig, MemoryUnit, PhpConfigurationManager};
use std::fs;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use tempfile::TempDir;

pub const TEMPLATE: &str = "\
[PHP]
engine = On
log_errors = Off
display_errors = On
max_execution_time = 30
;extension=php_curl.dll
;extension=php_gd2.dll

[Session]
session.save_path = \"/nonexistent\"
";

pub struct Host {
    pub temp: TempDir,
    pub windir: PathBuf,
}

impl Host {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let windir = temp.path().join("windows");
        fs::create_dir_all(windir.join("Temp")).unwrap();
        Self { temp, windir }
    }

    /// Config whose `%WINDIR%` points inside the fixture
    pub fn config(&self) -> ManagerConfig {
        ManagerConfig::new()
            .host_variable("WINDIR", &self.windir.display().to_string())
            .temp_directory(&format!("%WINDIR%{}Temp", MAIN_SEPARATOR))
    }

    /// Lay out `<name>/php-cgi.exe`, `<name>/ext` and the recommended template
    pub fn install_php(&self, name: &str, version: &str) -> String {
        let dir = self.temp.path().join(name);
        fs::create_dir_all(dir.join("ext")).unwrap();
        fs::write(dir.join("ext").join("php_curl.dll"), b"").unwrap();
        fs::write(dir.join("ext").join("php_gd2.dll"), b"").unwrap();
        fs::write(dir.join("php.ini-recommended"), TEMPLATE).unwrap();
        let exe = dir.join("php-cgi.exe");
        fs::write(&exe, format!("PHP {}", version)).unwrap();
        exe.display().to_string()
    }

    pub fn settings_path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name).join("php.ini")
    }

    pub fn manager(&self, host: HostConfiguration) -> PhpConfigurationManager<MemoryUnit> {
        self.manager_for(MemoryUnit::new(host))
    }

    pub fn manager_for(&self, unit: MemoryUnit) -> PhpConfigurationManager<MemoryUnit> {
        PhpConfigurationManager::new(unit, self.config())
            .unwrap()
            .with_version_probe(file_probe)
    }
}

/// Fake executables carry their banner as file content
pub fn file_probe(executable: &Path) -> Option<String> {
    fs::read_to_string(executable)
        .ok()?
        .strip_prefix("PHP ")
        .map(str::to_string)
}
