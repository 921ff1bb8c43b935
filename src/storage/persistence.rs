//! File persistence shared by the host configuration and the settings file

use crate::core::{ManagerError, Result};
use log::debug;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `bytes` through a sibling temp file and rename
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| {
        ManagerError::Io(format!(
            "Failed to create parent directory '{}': {}",
            parent.display(),
            err
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| {
        ManagerError::Io(format!(
            "Failed to create temp file in '{}': {}",
            parent.display(),
            err
        ))
    })?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| {
        ManagerError::Io(format!(
            "Failed to replace '{}': {}",
            path.display(),
            err.error
        ))
    })?;

    debug!("wrote {} bytes to '{}'", bytes.len(), path.display());
    Ok(())
}
