//! Copy-down of inherited routing entries and precedence reordering

use crate::core::{ManagerError, Result};
use crate::storage::RoutingStore;

/// Replace the merged view of a child scope with local copies, same order
///
/// A no-op at the top-level scope, where nothing is inherited.
pub fn copy_down<R: RoutingStore + ?Sized>(routing: &mut R) -> Result<()> {
    if routing.is_top_level() {
        return Ok(());
    }
    let view = routing.entries()?;
    routing.clear()?;
    for (index, entry) in view.iter().enumerate() {
        routing.insert_copy_at(index, entry)?;
    }
    Ok(())
}

/// Move `target` directly ahead of `active` so it becomes the first match
///
/// Both names must exist; a missing one is a caller bug, reported as
/// `PreconditionViolated`.
///
/// The index of `active` is read after `target` is removed. Whenever the
/// target sits after the active entry, which is always the case when it is
/// reached through registration or handler selection (the active entry is the
/// first match), removal leaves that index unchanged, so the target lands at
/// the active entry's former index. Only a target that already precedes the
/// active entry is placed differently: directly ahead of it rather than at its
/// old slot.
pub fn promote<R: RoutingStore + ?Sized>(routing: &mut R, target: &str, active: &str) -> Result<()> {
    if target == active {
        return Ok(());
    }
    copy_down(routing)?;

    let entry = routing.get(target)?.ok_or_else(|| {
        ManagerError::PreconditionViolated(format!("routing entry '{}' does not exist", target))
    })?;
    if routing.index_of(active)?.is_none() {
        return Err(ManagerError::PreconditionViolated(format!(
            "routing entry '{}' does not exist",
            active
        )));
    }

    // index of `active` is taken after the removal so it is never off by one
    routing.remove(target)?;
    let index = routing.index_of(active)?.ok_or_else(|| {
        ManagerError::PreconditionViolated(format!("routing entry '{}' vanished", active))
    })?;
    routing.insert_copy_at(index, &entry)
}
