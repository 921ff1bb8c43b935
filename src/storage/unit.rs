use super::{ProcessPoolStore, RoutingStore};
use crate::core::Result;
use crate::transaction::Epoch;

/// Transaction boundary over the routing and process-pool stores
///
/// Edits made through the store handles are buffered until `commit`. A commit
/// advances the epoch and leaves the handles stale: `routing`/`process_pools`
/// fail with `StaleHandle` until `resync` issues fresh ones.
pub trait ManagementUnit {
    type Routing: RoutingStore;
    type Pools: ProcessPoolStore;

    fn epoch(&self) -> Epoch;

    fn routing(&self) -> Result<&Self::Routing>;

    fn routing_mut(&mut self) -> Result<&mut Self::Routing>;

    fn process_pools(&self) -> Result<&Self::Pools>;

    fn process_pools_mut(&mut self) -> Result<&mut Self::Pools>;

    /// Persist both stores; returns the new epoch
    ///
    /// On failure the staged edits are dropped and the handles show the last
    /// committed state again, still in the current epoch.
    fn commit(&mut self) -> Result<Epoch>;

    /// Reissue store handles for the current epoch
    fn resync(&mut self) -> Result<()>;
}
