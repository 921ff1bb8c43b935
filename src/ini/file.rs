use super::{Extension, Setting, SettingsStore};
use crate::core::{ManagerError, Result};
use crate::storage::atomic_write;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const EXTENSION_KEY: &str = "extension";
const EXTENSION_SECTION: &str = "ExtensionList";

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Section { name: String, raw: String },
    Setting {
        name: String,
        value: String,
        section: String,
        /// Trailing `; ...` after the value, kept across rewrites
        comment: Option<String>,
        /// Original text; dropped once the value changes
        raw: Option<String>,
    },
    Extension {
        name: String,
        enabled: bool,
        raw: Option<String>,
    },
    Other(String),
}

/// Line-preserving php.ini model
///
/// Untouched lines are written back byte for byte; only edited settings are
/// re-rendered as `name = value`.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    lines: Vec<Line>,
    path: Option<PathBuf>,
    crlf: bool,
}

fn split_pair(text: &str) -> Option<(&str, &str)> {
    let (name, value) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name, value.trim()))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Split `value ; comment` on the first `;` outside double quotes
fn split_comment(value: &str) -> (&str, Option<&str>) {
    let mut quoted = false;
    for (index, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => return (value[..index].trim_end(), Some(value[index..].trim_end())),
            _ => {}
        }
    }
    (value, None)
}

/// Characters php.ini only accepts inside a double-quoted value
const SPECIAL_CHARS: &[char] = &['?', '{', '}', '|', '&', '~', '!', '(', ')', '^', '"', ';', '='];

/// Quote `value` when it would not survive php.ini's parser bare
fn quote_value(value: &str) -> String {
    let bare = unquote(value);
    if bare.contains(char::is_whitespace) || bare.contains(SPECIAL_CHARS) {
        format!("\"{}\"", bare)
    } else {
        bare.to_string()
    }
}

fn parse_line(raw: &str, section: &str) -> Line {
    let trimmed = raw.trim();

    if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() > 2 {
        return Line::Section {
            name: trimmed[1..trimmed.len() - 1].trim().to_string(),
            raw: raw.to_string(),
        };
    }

    if let Some(commented) = trimmed.strip_prefix(';') {
        if let Some((name, value)) = split_pair(commented.trim_start_matches(';').trim()) {
            let (value, _) = split_comment(value);
            if name.eq_ignore_ascii_case(EXTENSION_KEY) && !value.is_empty() {
                return Line::Extension {
                    name: unquote(value).to_string(),
                    enabled: false,
                    raw: Some(raw.to_string()),
                };
            }
        }
        return Line::Other(raw.to_string());
    }

    let Some((name, value)) = split_pair(trimmed) else {
        return Line::Other(raw.to_string());
    };
    let (value, comment) = split_comment(value);
    if name.eq_ignore_ascii_case(EXTENSION_KEY) {
        return Line::Extension {
            name: unquote(value).to_string(),
            enabled: true,
            raw: Some(raw.to_string()),
        };
    }
    Line::Setting {
        name: name.to_string(),
        value: value.to_string(),
        section: section.to_string(),
        comment: comment.map(str::to_string),
        raw: Some(raw.to_string()),
    }
}

/// Comment or uncomment an `extension=` line, keeping any trailing note
fn toggle_raw(raw: &str, enable: bool) -> String {
    let body = raw.trim_start().trim_start_matches(';').trim_start();
    if enable {
        body.to_string()
    } else {
        format!(";{}", body)
    }
}

impl IniFile {
    pub fn parse(content: &str) -> Self {
        let mut lines = Vec::new();
        let mut section = String::new();
        for raw in content.lines() {
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let line = parse_line(raw, &section);
            if let Line::Section { name, .. } = &line {
                section = name.clone();
            }
            lines.push(line);
        }
        Self {
            lines,
            path: None,
            crlf: content.contains("\r\n"),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                ManagerError::not_found("Settings file", path.display().to_string())
            }
            _ => ManagerError::Io(format!("Failed to read '{}': {}", path.display(), err)),
        })?;
        let mut file = Self::parse(&content);
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Path the file was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Rewrite every assignment of `setting` whose unquoted value differs
    fn update_existing(&mut self, setting: &Setting) -> bool {
        let wanted = setting.trimmed_value();
        let mut found = false;
        for line in &mut self.lines {
            if let Line::Setting { name, value, raw, .. } = line {
                if name.eq_ignore_ascii_case(&setting.name) {
                    found = true;
                    if unquote(value.trim()) != wanted {
                        *value = quote_value(wanted);
                        *raw = None;
                    }
                }
            }
        }
        found
    }

    /// Index just past the last non-blank line of `section`
    fn section_insertion_point(&self, section: &str) -> Option<usize> {
        let start = self
            .lines
            .iter()
            .position(|l| matches!(l, Line::Section { name, .. } if name.eq_ignore_ascii_case(section)))?;
        let mut insert_at = start + 1;
        for (offset, line) in self.lines[start + 1..].iter().enumerate() {
            match line {
                Line::Section { .. } => break,
                Line::Other(text) if text.trim().is_empty() => {}
                _ => insert_at = start + 2 + offset,
            }
        }
        Some(insert_at)
    }

    fn insert_in_section(&mut self, section: &str, line: Line) {
        match self.section_insertion_point(section) {
            Some(index) => self.lines.insert(index, line),
            None => {
                if self.lines.last().is_some_and(|l| !matches!(l, Line::Other(t) if t.trim().is_empty())) {
                    self.lines.push(Line::Other(String::new()));
                }
                self.lines.push(Line::Section {
                    name: section.to_string(),
                    raw: format!("[{}]", section),
                });
                self.lines.push(line);
            }
        }
    }
}

impl fmt::Display for IniFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let newline = if self.crlf { "\r\n" } else { "\n" };
        for line in &self.lines {
            match line {
                Line::Section { raw, .. }
                | Line::Setting { raw: Some(raw), .. }
                | Line::Extension { raw: Some(raw), .. }
                | Line::Other(raw) => f.write_str(raw)?,
                Line::Setting {
                    name,
                    value,
                    comment: Some(comment),
                    ..
                } => write!(f, "{} = {} {}", name, value, comment)?,
                Line::Setting { name, value, .. } => write!(f, "{} = {}", name, value)?,
                Line::Extension { name, enabled, .. } => {
                    let prefix = if *enabled { "" } else { ";" };
                    write!(f, "{}{}={}", prefix, EXTENSION_KEY, name)?
                }
            }
            f.write_str(newline)?;
        }
        Ok(())
    }
}

impl SettingsStore for IniFile {
    fn get_setting(&self, name: &str) -> Option<Setting> {
        // later assignments override earlier ones
        self.lines.iter().rev().find_map(|line| match line {
            Line::Setting {
                name: key,
                value,
                section,
                ..
            } if key.eq_ignore_ascii_case(name) => Some(Setting::new(key, value.clone(), section)),
            _ => None,
        })
    }

    fn add_or_update_settings(&mut self, settings: &[Setting]) {
        for setting in settings {
            if self.update_existing(setting) {
                continue;
            }
            let line = Line::Setting {
                name: setting.name.clone(),
                value: quote_value(setting.trimmed_value()),
                section: setting.section.clone(),
                comment: None,
                raw: None,
            };
            self.insert_in_section(&setting.section, line);
        }
    }

    fn extensions(&self) -> Vec<Extension> {
        let mut result: Vec<Extension> = Vec::new();
        for line in &self.lines {
            if let Line::Extension { name, enabled, .. } = line {
                match result.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) {
                    Some(existing) => existing.enabled |= *enabled,
                    None => result.push(Extension::new(name, *enabled)),
                }
            }
        }
        result
    }

    fn update_extensions(&mut self, updates: &[Extension]) {
        for update in updates {
            let mut found = false;
            for line in &mut self.lines {
                if let Line::Extension { name, enabled, raw } = line {
                    if name.eq_ignore_ascii_case(&update.name) {
                        found = true;
                        if *enabled != update.enabled {
                            *enabled = update.enabled;
                            *raw = raw.as_deref().map(|text| toggle_raw(text, update.enabled));
                        }
                    }
                }
            }
            if !found && update.enabled {
                let line = Line::Extension {
                    name: update.name.clone(),
                    enabled: true,
                    raw: None,
                };
                self.insert_in_section(EXTENSION_SECTION, line);
            }
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.render().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "[PHP]\n\
; comment line\n\
engine = On\n\
log_errors = Off\n\
\n\
extension=php_curl.dll\n\
;extension=php_gd2.dll\n\
\n\
[Session]\n\
session.save_path = \"C:\\Temp\"\n";

    #[test]
    fn test_untouched_file_renders_identically() {
        let ini = IniFile::parse(SAMPLE);
        assert_eq!(ini.render(), SAMPLE);
    }

    #[test]
    fn test_crlf_is_preserved() {
        let content = "[PHP]\r\nengine = On\r\n";
        assert_eq!(IniFile::parse(content).render(), content);
    }

    #[test]
    fn test_get_setting_is_case_insensitive() {
        let ini = IniFile::parse(SAMPLE);
        let setting = ini.get_setting("LOG_ERRORS").unwrap();
        assert_eq!(setting.value, "Off");
        assert_eq!(setting.section, "PHP");

        let session = ini.get_setting("session.save_path").unwrap();
        assert_eq!(session.trimmed_value(), "C:\\Temp");
        assert_eq!(session.section, "Session");
        assert!(ini.get_setting("missing").is_none());
    }

    #[test]
    fn test_last_assignment_wins() {
        let ini = IniFile::parse("a = 1\na = 2\n");
        assert_eq!(ini.get_setting("a").unwrap().value, "2");
    }

    #[test]
    fn test_update_in_place_and_append_to_section() {
        let mut ini = IniFile::parse(SAMPLE);
        ini.add_or_update_settings(&[
            Setting::new("log_errors", "On", "PHP"),
            Setting::new("fastcgi.impersonate", "1", "PHP"),
            Setting::new("session.gc_maxlifetime", "1440", "Session"),
            Setting::new("opcache.enable", "1", "opcache"),
        ]);
        let rendered = ini.render();

        assert!(rendered.contains("log_errors = On\n"));
        assert!(!rendered.contains("log_errors = Off"));
        assert!(rendered.contains(";extension=php_gd2.dll\nfastcgi.impersonate = 1\n\n[Session]"));
        assert!(rendered.ends_with("[opcache]\nopcache.enable = 1\n"));
        assert!(rendered.contains("session.save_path = \"C:\\Temp\"\nsession.gc_maxlifetime = 1440\n"));
    }

    #[test]
    fn test_update_is_idempotent() {
        let settings = [
            Setting::new("log_errors", "On", "PHP"),
            Setting::new("cgi.fix_pathinfo", "1", "PHP"),
        ];
        let mut ini = IniFile::parse(SAMPLE);
        ini.add_or_update_settings(&settings);
        let once = ini.render();
        ini.add_or_update_settings(&settings);
        assert_eq!(ini.render(), once);
    }

    #[test]
    fn test_extension_toggles() {
        let mut ini = IniFile::parse(SAMPLE);
        assert_eq!(ini.enabled_extension_count(), 1);
        assert_eq!(ini.extensions().len(), 2);

        ini.update_extensions(&[
            Extension::new("php_gd2.dll", true),
            Extension::new("php_curl.dll", false),
            Extension::new("php_mbstring.dll", true),
            Extension::new("php_tidy.dll", false),
        ]);
        let rendered = ini.render();

        assert!(rendered.contains("\nextension=php_gd2.dll\n"));
        assert!(rendered.contains("\n;extension=php_curl.dll\n"));
        assert!(rendered.contains("[ExtensionList]\nextension=php_mbstring.dll\n"));
        assert!(!rendered.contains("php_tidy"));
        assert_eq!(ini.enabled_extension_count(), 2);
    }

    #[test]
    fn test_inline_comments_are_not_part_of_the_value() {
        let content = "[PHP]\nlog_errors = On ; log them\nextension=php_xsl.dll ; note\n";
        let ini = IniFile::parse(content);

        let setting = ini.get_setting("log_errors").unwrap();
        assert_eq!(setting.value, "On");
        assert!(setting.is_enabled());
        assert_eq!(ini.extensions(), vec![Extension::new("php_xsl.dll", true)]);
        assert_eq!(ini.render(), content);

        let quoted = IniFile::parse("session.save_path = \"2;C:\\Temp\" ; spread\n");
        assert_eq!(
            quoted.get_setting("session.save_path").unwrap().trimmed_value(),
            "2;C:\\Temp"
        );
    }

    #[test]
    fn test_rewrite_keeps_inline_comment() {
        let mut ini = IniFile::parse("[PHP]\nlog_errors = Off ; log them\n");
        ini.add_or_update_settings(&[Setting::new("log_errors", "On", "PHP")]);
        assert_eq!(ini.render(), "[PHP]\nlog_errors = On ; log them\n");
    }

    #[test]
    fn test_disabling_extension_keeps_note() {
        let mut ini = IniFile::parse("extension=php_xsl.dll ; note\n");
        ini.update_extensions(&[Extension::new("php_xsl.dll", false)]);
        assert_eq!(ini.render(), ";extension=php_xsl.dll ; note\n");
    }

    #[test]
    fn test_quoted_value_matching_wanted_is_left_alone() {
        let content = "[PHP]\nextension_dir = \"C:\\Program Files (x86)\\PHP\\ext\"\n";
        let mut ini = IniFile::parse(content);
        ini.add_or_update_settings(&[Setting::new(
            "extension_dir",
            "C:\\Program Files (x86)\\PHP\\ext",
            "PHP",
        )]);
        assert_eq!(ini.render(), content);
    }

    #[test]
    fn test_values_with_special_characters_are_quoted() {
        let mut ini = IniFile::parse("[PHP]\nextension_dir = ext\n");
        ini.add_or_update_settings(&[
            Setting::new("extension_dir", "C:\\Program Files (x86)\\PHP\\ext", "PHP"),
            Setting::new("error_log", "C:\\Temp\\php_errors.log", "PHP"),
        ]);
        let rendered = ini.render();
        assert!(rendered.contains("extension_dir = \"C:\\Program Files (x86)\\PHP\\ext\"\n"));
        assert!(rendered.contains("error_log = C:\\Temp\\php_errors.log\n"));
        assert_eq!(
            IniFile::parse(&rendered)
                .get_setting("extension_dir")
                .unwrap()
                .trimmed_value(),
            "C:\\Program Files (x86)\\PHP\\ext"
        );
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = IniFile::load(temp_dir.path().join("php.ini")).unwrap_err();
        assert!(matches!(err, ManagerError::NotFound { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("php.ini");
        let mut ini = IniFile::parse(SAMPLE);
        ini.add_or_update_settings(&[Setting::new("display_errors", "Off", "PHP")]);
        ini.save(&path).unwrap();

        let reloaded = IniFile::load(&path).unwrap();
        assert_eq!(reloaded.path(), Some(path.as_path()));
        assert_eq!(reloaded.get_setting("display_errors").unwrap().value, "Off");
    }
}
