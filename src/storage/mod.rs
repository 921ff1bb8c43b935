pub mod memory;
pub mod persistence;
pub mod pool;
pub mod routing;
pub mod unit;

pub use memory::{HostConfiguration, MemoryPools, MemoryRouting, MemoryUnit, ScopeHandlers};
pub use persistence::atomic_write;
pub use pool::{ProcessPoolEntry, ProcessPoolStore};
pub use routing::{AccessRequirement, Origin, ResourceType, RoutingEntry, RoutingStore};
pub use unit::ManagementUnit;
