#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::{Arc, Mutex},
};

use keystamp_core::{Principal, Revocation};

use super::{Ledger, PRINCIPALS_TABLE, REVOCATIONS_TABLE, StorageError, check_revocable};

/// In-memory ledger for tests, simulation and `--in-memory` runs.
///
/// `BTreeMap`s keep listings ordered without sorting. All state is wrapped in
/// Arc<Mutex<>> to allow Clone and concurrent access. Uses `lock().expect()`,
/// which panics if the mutex is poisoned. Every operation holds the lock for
/// its whole duration, so each one (including `revoke_principal`) is atomic.
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Mutex<MemoryLedgerInner>>,
}

struct MemoryLedgerInner {
    /// uid -> principal
    principals: BTreeMap<String, Principal>,

    /// cert digest -> revocation
    revocations: BTreeMap<String, Revocation>,
}

impl MemoryLedger {
    /// Create a new empty `MemoryLedger`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryLedgerInner {
                principals: BTreeMap::new(),
                revocations: BTreeMap::new(),
            })),
        }
    }

    /// Number of active principals.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn principal_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").principals.len()
    }

    /// Number of revocation records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn revocation_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").revocations.len()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::expect_used)]
impl Ledger for MemoryLedger {
    fn find_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.principals.get(uid).cloned())
    }

    fn find_principals_by_digest(&self, digest: &str) -> Result<Vec<Principal>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.principals.values().filter(|p| p.pubkey_digest == digest).cloned().collect())
    }

    fn list_principals(&self) -> Result<Vec<Principal>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.principals.values().cloned().collect())
    }

    fn insert_principal(&self, principal: &Principal) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        match inner.principals.entry(principal.uid.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                table: PRINCIPALS_TABLE,
                key: principal.uid.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(principal.clone());
                Ok(())
            },
        }
    }

    fn delete_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.principals.remove(uid))
    }

    fn update_principal_timestamp(
        &self,
        uid: &str,
        timestamp: i64,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        match inner.principals.get_mut(uid) {
            Some(principal) if principal.timestamp < timestamp => {
                principal.timestamp = timestamp;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    fn find_revocation(&self, cert_digest: &str) -> Result<Option<Revocation>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.revocations.get(cert_digest).cloned())
    }

    fn list_revocations(&self) -> Result<Vec<Revocation>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.revocations.values().cloned().collect())
    }

    fn insert_revocation(&self, revocation: &Revocation) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        match inner.revocations.entry(revocation.cert_digest.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                table: REVOCATIONS_TABLE,
                key: revocation.cert_digest.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(revocation.clone());
                Ok(())
            },
        }
    }

    fn revoke_principal(
        &self,
        uid: &str,
        watermark: i64,
        revocation: &Revocation,
    ) -> Result<Principal, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let current = inner.principals.get(uid).ok_or_else(|| StorageError::Conflict {
            key: uid.to_string(),
            reason: "principal no longer exists".to_string(),
        })?;
        check_revocable(current, watermark, revocation)?;

        if inner.revocations.contains_key(&revocation.cert_digest) {
            return Err(StorageError::AlreadyExists {
                table: REVOCATIONS_TABLE,
                key: revocation.cert_digest.clone(),
            });
        }

        inner.revocations.insert(revocation.cert_digest.clone(), revocation.clone());
        inner.principals.remove(uid).ok_or_else(|| StorageError::Conflict {
            key: uid.to_string(),
            reason: "principal no longer exists".to_string(),
        })
    }
}
