//! Enumeration of every registered interpreter candidate

use crate::core::{EnvExpander, Result};
use crate::storage::RoutingStore;
use pelite::{FileMap, PeFile};
use serde::Serialize;
use std::path::Path;
use tracing::{Level, event};

pub const UNKNOWN_VERSION: &str = "unknown";

/// Reads the interpreter version embedded in an executable
pub trait VersionProbe {
    fn version(&self, executable: &Path) -> Option<String>;
}

impl<F> VersionProbe for F
where
    F: Fn(&Path) -> Option<String>,
{
    fn version(&self, executable: &Path) -> Option<String> {
        (self)(executable)
    }
}

/// Reads the product version from the executable's `VS_VERSIONINFO` resource.
///
/// The file is mapped and parsed, never run. Anything that is not a PE image
/// with a fixed version block yields `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceVersionProbe;

impl VersionProbe for ResourceVersionProbe {
    fn version(&self, executable: &Path) -> Option<String> {
        let map = FileMap::open(executable).ok()?;
        let image = PeFile::from_bytes(&map).ok()?;
        let info = image.resources().ok()?.version_info().ok()?;
        let fixed = info.fixed()?;
        let product = &fixed.dwProductVersion;
        Some(format!("{}.{}.{}", product.Major, product.Minor, product.Patch))
    }
}

/// A routing entry for the interpreter pattern whose executable exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub handler_name: String,
    pub executable: String,
    pub version: String,
}

/// Every matching entry with an executable on disk, in precedence order
///
/// Entries whose executable is missing are skipped. A probe that cannot read
/// the version yields [`UNKNOWN_VERSION`] rather than dropping the candidate.
pub fn discover<R: RoutingStore + ?Sized>(
    routing: &R,
    pattern: &str,
    probe: &dyn VersionProbe,
    env: &EnvExpander,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for entry in routing.matching(pattern)? {
        let expanded = env.expand(&entry.script_processor);
        let path = Path::new(&expanded);
        if !path.is_file() {
            event!(Level::DEBUG, handler = %entry.name, executable = %expanded, "skipping candidate without executable");
            continue;
        }
        let version = probe.version(path).unwrap_or_else(|| {
            event!(Level::WARN, executable = %expanded, "could not read interpreter version");
            UNKNOWN_VERSION.to_string()
        });
        candidates.push(Candidate {
            handler_name: entry.name,
            executable: entry.script_processor,
            version,
        });
    }
    Ok(candidates)
}
