//! Integration tests for validation and the corrective steps

mod common;

use common::Host;
use phpmanager::{
    HostConfiguration, IniFile, ManagementUnit, ProcessPoolEntry, ResourceType, RoutingEntry,
    Setting, SettingsStore, Violation,
};
use std::fs;
use std::path::PathBuf;

/// One handler + pool for `exe`, with a settings file, but nothing tuned
fn untuned_host(exe: &str) -> HostConfiguration {
    let dir = PathBuf::from(exe).parent().unwrap().to_path_buf();
    fs::copy(dir.join("php.ini-recommended"), dir.join("php.ini")).unwrap();
    let mut handler = RoutingEntry::new("PHP53_via_FastCGI", "*.php", exe);
    handler.resource_type = ResourceType::File;
    HostConfiguration {
        handlers: vec![handler],
        process_pools: vec![ProcessPoolEntry::new(exe)],
        ..Default::default()
    }
}

fn break_setting(host: &Host, name: &str, value: &str) {
    let path = host.settings_path("php7");
    let mut ini = IniFile::load(&path).unwrap();
    ini.add_or_update_settings(&[Setting::new(name, value, "PHP")]);
    ini.save(&path).unwrap();
}

#[test]
fn test_bound_below_instance_cap_is_non_compliant() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();
    assert!(manager.is_pool_group_compliant().unwrap());

    let mut config = manager.unit().committed().clone();
    config.process_pools[0].set_env("PHP_FCGI_MAX_REQUESTS", "5000");
    assert_eq!(config.process_pools[0].instance_max_requests, 10000);

    let manager = host.manager(config);
    assert!(!manager.is_pool_group_compliant().unwrap());
    assert_eq!(
        manager.check_pool_group().unwrap(),
        Some(Violation::MaxRequestsBelowInstanceCap {
            bound: 5000,
            cap: 10000
        })
    );
}

#[test]
fn test_pool_group_repair_is_idempotent() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(untuned_host(&exe));
    assert!(matches!(
        manager.check_pool_group().unwrap(),
        Some(Violation::ResourceTypeTooNarrow { .. })
    ));

    assert!(manager.apply_pool_group_settings().unwrap());
    assert!(manager.is_pool_group_compliant().unwrap());
    let epoch = manager.unit().epoch();
    let snapshot = manager.unit().committed().clone();

    assert!(!manager.apply_pool_group_settings().unwrap());
    assert!(manager.is_pool_group_compliant().unwrap());
    assert_eq!(manager.unit().epoch(), epoch);
    assert_eq!(manager.unit().committed(), &snapshot);

    let pool = &snapshot.process_pools[0];
    assert_eq!(pool.env("PHP_FCGI_MAX_REQUESTS"), Some("10000"));
    assert_eq!(pool.instance_max_requests, 10000);
    assert_eq!(snapshot.handlers[0].resource_type, ResourceType::Either);
}

#[test]
fn test_pool_repair_copies_inherited_handler_down() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let config = untuned_host(&exe);
    let unit = phpmanager::MemoryUnit::for_scope(config, "site");
    let mut manager = host.manager_for(unit);

    assert!(manager.apply_pool_group_settings().unwrap());
    let committed = manager.unit().committed();
    // parent scope keeps its narrow entry; the site gets a local, fixed copy
    assert_eq!(committed.handlers[0].resource_type, ResourceType::File);
    let site = &committed.scopes["site"];
    assert!(site.clear_inherited);
    assert_eq!(site.local.len(), 1);
    assert_eq!(site.local[0].resource_type, ResourceType::Either);
    assert!(manager.is_pool_group_compliant().unwrap());
}

#[test]
fn test_settings_repair_backs_up_and_is_idempotent() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(untuned_host(&exe));
    let settings = host.settings_path("php7");
    let before = fs::read_to_string(&settings).unwrap();
    assert!(!manager.is_settings_group_compliant().unwrap());

    let backup = manager.apply_recommended_settings().unwrap().unwrap();
    let mut expected = settings.clone().into_os_string();
    expected.push("-phpmanager");
    assert_eq!(backup, PathBuf::from(expected));
    assert_eq!(fs::read_to_string(&backup).unwrap(), before);

    assert!(manager.is_settings_group_compliant().unwrap());
    assert!(manager.is_pool_group_compliant().unwrap());
    let after = fs::read_to_string(&settings).unwrap();

    assert_eq!(manager.apply_recommended_settings().unwrap(), None);
    assert_eq!(fs::read_to_string(&settings).unwrap(), after);
}

#[test]
fn test_compliant_registration_needs_no_backup() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();

    assert!(manager.diagnose().unwrap().is_compliant());
    assert_eq!(manager.apply_recommended_settings().unwrap(), None);
    let mut backup = host.settings_path("php7").into_os_string();
    backup.push("-phpmanager");
    assert!(!PathBuf::from(backup).exists());
}

#[test]
fn test_repair_mode_leaves_extensions_alone() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();

    let path = host.settings_path("php7");
    let mut ini = IniFile::load(&path).unwrap();
    ini.update_extensions(&[phpmanager::Extension::new("php_curl.dll", false)]);
    ini.add_or_update_settings(&[Setting::new("log_errors", "Off", "PHP")]);
    ini.save(&path).unwrap();

    assert_eq!(
        manager.check_settings_group().unwrap(),
        Some(Violation::ErrorLoggingDisabled)
    );
    assert!(manager.apply_recommended_settings().unwrap().is_some());

    let ini = IniFile::load(&path).unwrap();
    assert!(
        ini.extensions()
            .iter()
            .any(|e| e.name == "php_curl.dll" && !e.enabled)
    );
    assert_eq!(ini.get_setting("log_errors").unwrap().value, "On");
}

#[test]
fn test_settings_checks_report_first_failure() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();

    break_setting(&host, "cgi.fix_pathinfo", "0");
    assert_eq!(
        manager.check_settings_group().unwrap(),
        Some(Violation::FlagMismatch {
            setting: "cgi.fix_pathinfo".to_string(),
            expected: "1".to_string(),
            actual: Some("0".to_string()),
        })
    );

    break_setting(&host, "error_log", "relative/php_errors.log");
    assert!(matches!(
        manager.check_settings_group().unwrap(),
        Some(Violation::ErrorLogInvalid(_))
    ));

    break_setting(&host, "extension_dir", "/somewhere/else/ext");
    assert!(matches!(
        manager.check_settings_group().unwrap(),
        Some(Violation::ExtensionDirInvalid(_))
    ));
}

#[test]
fn test_missing_settings_file() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();
    fs::remove_file(host.settings_path("php7")).unwrap();

    assert!(matches!(
        manager.check_settings_group().unwrap(),
        Some(Violation::SettingsFileMissing(_))
    ));
    assert!(matches!(
        manager.check_pool_group().unwrap(),
        Some(Violation::SettingsDirUnusable { .. })
    ));
    assert!(manager.settings_path().is_err());
}

#[test]
fn test_describe_current_registration() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();

    let info = manager.current_info().unwrap().unwrap();
    assert_eq!(info.handler_name, "PHP_via_FastCGI");
    assert_eq!(info.executable, exe);
    assert_eq!(info.version, "7.4.33");
    assert_eq!(info.settings_path, host.settings_path("php7"));
    assert_eq!(info.enabled_extensions, 13);
    assert_eq!(info.installed_extensions, 2);
    assert!(
        info.error_log
            .unwrap()
            .ends_with("PHP_via_FastCGI_errors.log")
    );
}

#[test]
fn test_paths_with_special_characters_stay_quoted() {
    let host = Host::new();
    let name = "Program Files (x86)/PHP";
    let exe = host.install_php(name, "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();

    let path = host.settings_path(name);
    let ext_dir = host.temp.path().join(name).join("ext").display().to_string();
    let quoted_line = format!("extension_dir = \"{}\"\n", ext_dir);
    assert!(fs::read_to_string(&path).unwrap().contains(&quoted_line));
    assert!(manager.is_settings_group_compliant().unwrap());

    let mut ini = IniFile::load(&path).unwrap();
    ini.add_or_update_settings(&[Setting::new("log_errors", "Off", "PHP")]);
    ini.save(&path).unwrap();

    assert!(manager.apply_recommended_settings().unwrap().is_some());
    let repaired = fs::read_to_string(&path).unwrap();
    assert!(repaired.contains(&quoted_line));
    assert!(repaired.contains("log_errors = On"));
    assert!(manager.is_settings_group_compliant().unwrap());
}

#[test]
fn test_inline_comment_on_compliant_setting() {
    let host = Host::new();
    let exe = host.install_php("php7", "7.4.33");
    let mut manager = host.manager(HostConfiguration::default());
    manager.register(&exe).unwrap();

    let path = host.settings_path("php7");
    let content = fs::read_to_string(&path)
        .unwrap()
        .replace("log_errors = On", "log_errors = On ; keep a log");
    fs::write(&path, &content).unwrap();

    assert!(manager.is_settings_group_compliant().unwrap());
    assert_eq!(manager.apply_recommended_settings().unwrap(), None);
    assert_eq!(fs::read_to_string(&path).unwrap(), content);
}
