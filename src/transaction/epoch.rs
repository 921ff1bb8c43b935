use crate::core::{ManagerError, Result};

/// Commit generation of a management unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub const fn new(raw: u64) -> Self {
        Epoch(raw)
    }

    /// The epoch that follows a successful commit
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Fail with `StaleHandle` unless `self` was issued in `current`
    pub fn ensure_current(self, current: Epoch) -> Result<()> {
        if self == current {
            Ok(())
        } else {
            Err(ManagerError::StaleHandle {
                issued: self,
                current,
            })
        }
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch_{}", self.0)
    }
}

/// A value read from a store, valid only inside the epoch it was issued in.
///
/// The inner value stays readable after a commit (for logging and reports),
/// but `get` refuses to hand it out once the unit has moved on.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease<T> {
    epoch: Epoch,
    value: T,
}

impl<T> Lease<T> {
    pub fn new(epoch: Epoch, value: T) -> Self {
        Self { epoch, value }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Borrow the value after checking it against the unit's current epoch
    pub fn get(&self, current: Epoch) -> Result<&T> {
        self.epoch.ensure_current(current)?;
        Ok(&self.value)
    }

    /// Borrow without an epoch check; for diagnostics only
    pub fn peek(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
