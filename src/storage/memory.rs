//! Reference host: routing and process-pool stores kept in memory, with an
//! optional JSON file written on every commit.

use super::persistence::atomic_write;
use super::{ManagementUnit, Origin, ProcessPoolEntry, ProcessPoolStore, RoutingEntry, RoutingStore};
use crate::core::{ManagerError, Result};
use crate::transaction::Epoch;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Local overrides of one child scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeHandlers {
    pub local: Vec<RoutingEntry>,
    /// Set once the scope stops inheriting the top-level entries
    #[serde(default)]
    pub clear_inherited: bool,
}

/// Committed state of the whole host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfiguration {
    /// Top-level routing entries, inherited by every scope
    #[serde(default)]
    pub handlers: Vec<RoutingEntry>,
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeHandlers>,
    #[serde(default)]
    pub process_pools: Vec<ProcessPoolEntry>,
    #[serde(default)]
    pub file_watch_supported: bool,
}

impl HostConfiguration {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|err| {
            ManagerError::Io(format!(
                "Failed to read host configuration '{}': {}",
                path.display(),
                err
            ))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &bytes)
    }
}

// ============================================================================
// Routing store
// ============================================================================

#[derive(Debug, Clone)]
pub struct MemoryRouting {
    epoch: Epoch,
    scope: Option<String>,
    local: Vec<RoutingEntry>,
    inherited: Vec<RoutingEntry>,
    clear_inherited: bool,
}

impl MemoryRouting {
    fn issue(config: &HostConfiguration, scope: Option<&str>, epoch: Epoch) -> Self {
        match scope {
            None => Self {
                epoch,
                scope: None,
                local: config.handlers.clone(),
                inherited: Vec::new(),
                clear_inherited: false,
            },
            Some(name) => {
                let overrides = config.scopes.get(name).cloned().unwrap_or_default();
                Self {
                    epoch,
                    scope: Some(name.to_string()),
                    local: overrides.local,
                    inherited: config.handlers.clone(),
                    clear_inherited: overrides.clear_inherited,
                }
            }
        }
    }

    fn inherits(&self) -> bool {
        self.scope.is_some() && !self.clear_inherited
    }

    fn contains(&self, name: &str) -> bool {
        self.local.iter().any(|e| e.name == name)
            || (self.inherits() && self.inherited.iter().any(|e| e.name == name))
    }

    fn write_into(&self, config: &mut HostConfiguration) {
        let local: Vec<RoutingEntry> = self.local.iter().map(RoutingEntry::local_copy).collect();
        match &self.scope {
            None => config.handlers = local,
            Some(name) => {
                config.scopes.insert(
                    name.clone(),
                    ScopeHandlers {
                        local,
                        clear_inherited: self.clear_inherited,
                    },
                );
            }
        }
    }
}

impl RoutingStore for MemoryRouting {
    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn is_top_level(&self) -> bool {
        self.scope.is_none()
    }

    fn entries(&self) -> Result<Vec<RoutingEntry>> {
        let mut view: Vec<RoutingEntry> = self.local.iter().map(RoutingEntry::local_copy).collect();
        if self.inherits() {
            view.extend(self.inherited.iter().map(|e| RoutingEntry {
                origin: Origin::Inherited,
                ..e.clone()
            }));
        }
        Ok(view)
    }

    fn insert_at(&mut self, index: usize, entry: RoutingEntry) -> Result<()> {
        if self.contains(&entry.name) {
            return Err(ManagerError::Store(format!(
                "Routing entry '{}' already exists",
                entry.name
            )));
        }
        if index > self.local.len() {
            return Err(ManagerError::Store(format!(
                "Cannot insert '{}' at {}: only {} local entries precede the inherited ones",
                entry.name,
                index,
                self.local.len()
            )));
        }
        self.local.insert(index, entry.local_copy());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        if let Some(pos) = self.local.iter().position(|e| e.name == name) {
            self.local.remove(pos);
            return Ok(());
        }
        if self.contains(name) {
            return Err(ManagerError::Store(format!(
                "Routing entry '{}' is inherited and cannot be removed here",
                name
            )));
        }
        Err(ManagerError::Store(format!("Routing entry '{}' not found", name)))
    }

    fn replace(&mut self, entry: &RoutingEntry) -> Result<()> {
        if let Some(slot) = self.local.iter_mut().find(|e| e.name == entry.name) {
            *slot = entry.local_copy();
            return Ok(());
        }
        if self.contains(&entry.name) {
            return Err(ManagerError::Store(format!(
                "Routing entry '{}' is inherited and cannot be modified here",
                entry.name
            )));
        }
        Err(ManagerError::Store(format!(
            "Routing entry '{}' not found",
            entry.name
        )))
    }

    fn clear(&mut self) -> Result<()> {
        self.local.clear();
        if self.scope.is_some() {
            self.clear_inherited = true;
        }
        Ok(())
    }
}

// ============================================================================
// Process-pool store
// ============================================================================

#[derive(Debug, Clone)]
pub struct MemoryPools {
    epoch: Epoch,
    entries: Vec<ProcessPoolEntry>,
    file_watch_supported: bool,
}

impl MemoryPools {
    fn issue(config: &HostConfiguration, epoch: Epoch) -> Self {
        Self {
            epoch,
            entries: config.process_pools.clone(),
            file_watch_supported: config.file_watch_supported,
        }
    }
}

impl ProcessPoolStore for MemoryPools {
    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn entries(&self) -> Result<Vec<ProcessPoolEntry>> {
        Ok(self.entries.clone())
    }

    fn supports_file_watch(&self) -> bool {
        self.file_watch_supported
    }

    fn add(&mut self, entry: ProcessPoolEntry) -> Result<()> {
        if self
            .entries
            .iter()
            .any(|e| e.has_path(&entry.full_path) && e.arguments == entry.arguments)
        {
            return Err(ManagerError::Store(format!(
                "Process pool for '{}' already exists",
                entry.full_path
            )));
        }
        if entry.monitor_changes_to.is_some() && !self.file_watch_supported {
            return Err(ManagerError::Store(
                "File watch is not supported by this host".to_string(),
            ));
        }
        self.entries.push(entry);
        Ok(())
    }

    fn replace(&mut self, entry: &ProcessPoolEntry) -> Result<()> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.has_path(&entry.full_path) && e.arguments == entry.arguments)
            .ok_or_else(|| {
                ManagerError::Store(format!("Process pool for '{}' not found", entry.full_path))
            })?;
        if !self.file_watch_supported && entry.monitor_changes_to != slot.monitor_changes_to {
            return Err(ManagerError::Store(
                "File watch is not supported by this host".to_string(),
            ));
        }
        *slot = entry.clone();
        Ok(())
    }
}

// ============================================================================
// Management unit
// ============================================================================

/// In-memory management unit bound to one routing scope
#[derive(Debug)]
pub struct MemoryUnit {
    committed: HostConfiguration,
    scope: Option<String>,
    epoch: Epoch,
    routing: MemoryRouting,
    pools: MemoryPools,
    backing_file: Option<PathBuf>,
}

impl MemoryUnit {
    /// Unit operating at the top-level scope
    pub fn new(config: HostConfiguration) -> Self {
        Self::build(config, None, None)
    }

    /// Unit operating at a child scope that inherits the top-level entries
    pub fn for_scope(config: HostConfiguration, scope: &str) -> Self {
        Self::build(config, Some(scope.to_string()), None)
    }

    /// Unit backed by a JSON file; a missing file starts empty
    pub fn open(path: impl AsRef<Path>, scope: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = HostConfiguration::load(&path)?;
        debug!("opened host configuration '{}'", path.display());
        Ok(Self::build(config, scope.map(str::to_string), Some(path)))
    }

    fn build(config: HostConfiguration, scope: Option<String>, backing_file: Option<PathBuf>) -> Self {
        let epoch = Epoch::default();
        let routing = MemoryRouting::issue(&config, scope.as_deref(), epoch);
        let pools = MemoryPools::issue(&config, epoch);
        Self {
            committed: config,
            scope,
            epoch,
            routing,
            pools,
            backing_file,
        }
    }

    /// Last committed state
    pub fn committed(&self) -> &HostConfiguration {
        &self.committed
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl ManagementUnit for MemoryUnit {
    type Routing = MemoryRouting;
    type Pools = MemoryPools;

    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn routing(&self) -> Result<&MemoryRouting> {
        self.routing.epoch.ensure_current(self.epoch)?;
        Ok(&self.routing)
    }

    fn routing_mut(&mut self) -> Result<&mut MemoryRouting> {
        self.routing.epoch.ensure_current(self.epoch)?;
        Ok(&mut self.routing)
    }

    fn process_pools(&self) -> Result<&MemoryPools> {
        self.pools.epoch.ensure_current(self.epoch)?;
        Ok(&self.pools)
    }

    fn process_pools_mut(&mut self) -> Result<&mut MemoryPools> {
        self.pools.epoch.ensure_current(self.epoch)?;
        Ok(&mut self.pools)
    }

    fn commit(&mut self) -> Result<Epoch> {
        self.routing.epoch.ensure_current(self.epoch)?;
        self.pools.epoch.ensure_current(self.epoch)?;

        let mut next = self.committed.clone();
        self.routing.write_into(&mut next);
        next.process_pools = self.pools.entries.clone();

        if let Some(path) = &self.backing_file {
            if let Err(err) = next.save(path) {
                warn!("commit to '{}' failed, discarding staged edits: {}", path.display(), err);
                self.resync()?;
                return Err(err);
            }
        }

        self.committed = next;
        self.epoch = self.epoch.next();
        debug!("committed host configuration, now at {}", self.epoch);
        Ok(self.epoch)
    }

    fn resync(&mut self) -> Result<()> {
        self.routing = MemoryRouting::issue(&self.committed, self.scope.as_deref(), self.epoch);
        self.pools = MemoryPools::issue(&self.committed, self.epoch);
        Ok(())
    }
}
