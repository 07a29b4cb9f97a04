//! Ledger snapshots.

use keystamp_core::{Principal, Revocation};
use keystamp_server::{Ledger, StorageError};

/// Everything the ledger holds at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Clock when the snapshot was taken
    pub now_ms: i64,
    /// Active principals
    pub principals: Vec<Principal>,
    /// Revocation records
    pub revocations: Vec<Revocation>,
}

impl LedgerSnapshot {
    /// Read both tables of `ledger`.
    pub fn capture<L: Ledger>(ledger: &L, now_ms: i64) -> Result<Self, StorageError> {
        Ok(Self {
            now_ms,
            principals: ledger.list_principals()?,
            revocations: ledger.list_revocations()?,
        })
    }

    /// Snapshot with no rows.
    pub fn empty() -> Self {
        Self::default()
    }
}
