//! Per-uid mutual exclusion.
//!
//! Same-principal operations must not interleave between reading the
//! watermark and writing the outcome. A fixed set of striped mutexes keyed
//! by a hash of the uid gives that without unbounded per-uid state.

#![allow(clippy::disallowed_types, reason = "Guards are only held on blocking threads")]

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Number of stripes.
pub const STRIPES: usize = 64;

/// Striped uid locks. Clones share the stripes.
#[derive(Debug, Clone)]
pub struct UidLocks {
    stripes: Arc<[Mutex<()>]>,
}

impl Default for UidLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl UidLocks {
    /// Create [`STRIPES`] unlocked stripes.
    pub fn new() -> Self {
        Self { stripes: (0..STRIPES).map(|_| Mutex::new(())).collect() }
    }

    /// Block until the stripe for `uid` is free.
    ///
    /// Poisoning is ignored: the guarded data is `()`, and ledger state is
    /// protected by its own conditional writes.
    pub fn lock(&self, uid: &str) -> MutexGuard<'_, ()> {
        self.stripes[stripe(uid)].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stripe(uid: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    uid.hash(&mut hasher);
    (hasher.finish() % STRIPES as u64) as usize
}
