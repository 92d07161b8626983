//! Shared hash table contract.
//!
//! The table's bucket layout, replacement policy and internal
//! synchronization are the collaborator's business. The core's only
//! obligations are to hand the pool over on resize (the table shards by
//! thread count) and never to resize while a search is in flight; every
//! resize path waits for the pool to go quiescent first.

use crate::thread::PoolShared;

pub trait HashTable: Send + Sync {
    /// Resizes the table to `mb` megabytes for the given pool.
    fn resize(&self, mb: usize, pool: &PoolShared);

    /// Drops all stored entries.
    fn clear(&self);

    /// Permille fill rate, for protocol info output.
    fn hashfull(&self) -> usize {
        0
    }
}
