// ============================================================================
// Routing Entries
// ============================================================================
//
// An ordered collection of "pattern -> executable" rules. The first entry
// whose pattern matches wins, so position is precedence. In a child scope the
// collection is a merged view: local entries first, then the entries
// inherited from the top-level scope.
//
// ============================================================================

use crate::core::Result;
use crate::transaction::Epoch;
use serde::{Deserialize, Serialize};

/// Kind of resource an entry is willing to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResourceType {
    File,
    Directory,
    Either,
    #[default]
    Unspecified,
}

impl ResourceType {
    pub fn accepts_files(&self) -> bool {
        !matches!(self, ResourceType::Directory)
    }

    pub fn accepts_directories(&self) -> bool {
        !matches!(self, ResourceType::File)
    }

    pub fn accepts_both(&self) -> bool {
        self.accepts_files() && self.accepts_directories()
    }
}

/// Access level a request needs before the entry runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AccessRequirement {
    None,
    Read,
    Write,
    #[default]
    Script,
    Execute,
}

/// Where an entry in a merged view comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    #[default]
    Local,
    Inherited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub name: String,
    /// URL pattern, e.g. `*.php`
    pub path: String,
    pub verb: String,
    pub modules: String,
    pub script_processor: String,
    #[serde(default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub require_access: AccessRequirement,
    #[serde(skip)]
    pub origin: Origin,
}

impl RoutingEntry {
    pub fn new(name: &str, path: &str, script_processor: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            verb: "*".to_string(),
            modules: String::new(),
            script_processor: script_processor.to_string(),
            resource_type: ResourceType::default(),
            require_access: AccessRequirement::default(),
            origin: Origin::Local,
        }
    }

    pub fn matches_pattern(&self, pattern: &str) -> bool {
        self.path.eq_ignore_ascii_case(pattern)
    }

    pub fn targets(&self, executable: &str) -> bool {
        self.script_processor.eq_ignore_ascii_case(executable)
    }

    pub fn is_inherited(&self) -> bool {
        self.origin == Origin::Inherited
    }

    /// Same shape, owned by the scope it is inserted into
    pub fn local_copy(&self) -> Self {
        Self {
            origin: Origin::Local,
            ..self.clone()
        }
    }
}

/// Ordered routing collection at one configuration scope
pub trait RoutingStore {
    /// Epoch the store was issued in
    fn epoch(&self) -> Epoch;

    /// Whether this is the inheritance root
    fn is_top_level(&self) -> bool;

    /// Merged view in precedence order
    fn entries(&self) -> Result<Vec<RoutingEntry>>;

    fn insert_at(&mut self, index: usize, entry: RoutingEntry) -> Result<()>;

    fn remove(&mut self, name: &str) -> Result<()>;

    /// Overwrite the local entry carrying `entry.name`
    fn replace(&mut self, entry: &RoutingEntry) -> Result<()>;

    /// Drop every local entry and stop inheriting from the parent scope
    fn clear(&mut self) -> Result<()>;

    fn get(&self, name: &str) -> Result<Option<RoutingEntry>> {
        Ok(self.entries()?.into_iter().find(|e| e.name == name))
    }

    fn index_of(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.entries()?.iter().position(|e| e.name == name))
    }

    /// First entry matching `pattern`
    fn active_entry(&self, pattern: &str) -> Result<Option<RoutingEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|e| e.matches_pattern(pattern)))
    }

    fn entry_for(&self, pattern: &str, executable: &str) -> Result<Option<RoutingEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|e| e.matches_pattern(pattern) && e.targets(executable)))
    }

    fn matching(&self, pattern: &str) -> Result<Vec<RoutingEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.matches_pattern(pattern))
            .collect())
    }

    fn insert_copy_at(&mut self, index: usize, source: &RoutingEntry) -> Result<()> {
        self.insert_at(index, source.local_copy())
    }
}
