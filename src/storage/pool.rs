use crate::core::Result;
use crate::transaction::Epoch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Worker-pool settings for one external executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPoolEntry {
    pub full_path: String,
    /// Secondary key; always empty for pools created here
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub instance_max_requests: u64,
    pub activity_timeout: u64,
    pub request_timeout: u64,
    #[serde(default)]
    pub monitor_changes_to: Option<String>,
}

impl ProcessPoolEntry {
    pub fn new(full_path: &str) -> Self {
        Self {
            full_path: full_path.to_string(),
            arguments: String::new(),
            environment: BTreeMap::new(),
            instance_max_requests: 200,
            activity_timeout: 30,
            request_timeout: 90,
            monitor_changes_to: None,
        }
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.full_path.eq_ignore_ascii_case(path)
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment.get(name).map(String::as_str)
    }

    /// Insert or overwrite an environment variable
    pub fn set_env(&mut self, name: &str, value: impl Into<String>) {
        self.environment.insert(name.to_string(), value.into());
    }
}

/// Process-pool collection (always the top-level scope)
pub trait ProcessPoolStore {
    fn epoch(&self) -> Epoch;

    fn entries(&self) -> Result<Vec<ProcessPoolEntry>>;

    /// Whether entries can carry a settings-file watch path
    fn supports_file_watch(&self) -> bool;

    fn add(&mut self, entry: ProcessPoolEntry) -> Result<()>;

    /// Overwrite the stored entry with the same path
    fn replace(&mut self, entry: &ProcessPoolEntry) -> Result<()>;

    /// A detached entry; nothing is stored until `add`
    fn create(&self, full_path: &str) -> ProcessPoolEntry {
        ProcessPoolEntry::new(full_path)
    }

    fn get_by_path(&self, path: &str) -> Result<Option<ProcessPoolEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|e| e.has_path(path) && e.arguments.is_empty()))
    }
}
