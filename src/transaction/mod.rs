// ============================================================================
// Transaction Epochs
// ============================================================================
//
// The host configuration stores buffer edits until the management unit
// commits them. A commit invalidates every handle issued before it, so each
// handle and every value derived from one is tagged with the epoch it was
// issued in:
//
//   epoch_1 ──commit──> epoch_2 ──commit──> epoch_3
//      │                   │
//      └─ leases from here are stale once epoch_2 begins
//
// ============================================================================

pub mod epoch;

pub use epoch::{Epoch, Lease};
