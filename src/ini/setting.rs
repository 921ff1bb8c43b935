use crate::core::Result;
use std::path::Path;

/// A single `name = value` pair and the section it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub name: String,
    pub value: String,
    pub section: String,
}

impl Setting {
    pub fn new(name: &str, value: impl Into<String>, section: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            section: section.to_string(),
        }
    }

    /// Value with surrounding whitespace and double quotes removed
    pub fn trimmed_value(&self) -> &str {
        let value = self.value.trim();
        value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// `On`, `1`, `true` or `yes`, any case
    pub fn is_enabled(&self) -> bool {
        matches!(
            self.trimmed_value().to_ascii_lowercase().as_str(),
            "on" | "1" | "true" | "yes"
        )
    }
}

/// A loadable extension module and whether it is switched on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub enabled: bool,
}

impl Extension {
    pub fn new(name: &str, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            enabled,
        }
    }
}

/// Key/value settings store backing the interpreter
///
/// Setting names compare case-insensitively.
pub trait SettingsStore {
    fn get_setting(&self, name: &str) -> Option<Setting>;

    /// Overwrite existing settings in place, append the rest to their section
    fn add_or_update_settings(&mut self, settings: &[Setting]);

    fn extensions(&self) -> Vec<Extension>;

    fn update_extensions(&mut self, updates: &[Extension]);

    fn save(&self, path: &Path) -> Result<()>;

    fn enabled_extension_count(&self) -> usize {
        self.extensions().iter().filter(|e| e.enabled).count()
    }
}
