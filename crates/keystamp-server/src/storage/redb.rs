//! Redb-backed durable ledger.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Every write, including the composite revocation, is one transaction.

use std::{path::Path, sync::Arc};

use keystamp_core::{Principal, Revocation};
use redb::{Database, ReadableTable, Table, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{Ledger, PRINCIPALS_TABLE, REVOCATIONS_TABLE, StorageError, check_revocable};

/// Table: principals
/// Key: uid
/// Value: CBOR-encoded Principal
const PRINCIPALS: TableDefinition<&str, &[u8]> = TableDefinition::new("principals");

/// Table: pubkey_index
/// Key: "{pubkey_digest}/{uid}"
/// Value: uid
const PUBKEY_INDEX: TableDefinition<&str, &str> = TableDefinition::new("pubkey_index");

/// Table: revocations
/// Key: cert digest
/// Value: CBOR-encoded Revocation
const REVOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("revocations");

/// Durable ledger backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (PRINCIPALS, PUBKEY_INDEX,
    /// REVOCATIONS).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(PUBKEY_INDEX).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(REVOCATIONS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Ledger for RedbLedger {
    fn find_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;

        let row = table.get(uid).map_err(|e| StorageError::Io(e.to_string()))?;
        row.map(|value| decode(value.value())).transpose()
    }

    fn find_principals_by_digest(&self, digest: &str) -> Result<Vec<Principal>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let index = txn.open_table(PUBKEY_INDEX).map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;

        let (start, end) = index_range(digest);
        let entries = index
            .range(start.as_str()..end.as_str())
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut principals = Vec::new();
        for entry in entries {
            let (_, uid) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            let row = table.get(uid.value()).map_err(|e| StorageError::Io(e.to_string()))?;
            if let Some(value) = row {
                principals.push(decode(value.value())?);
            }
        }

        Ok(principals)
    }

    fn list_principals(&self) -> Result<Vec<Principal>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;

        scan(&table)
    }

    fn insert_principal(&self, principal: &Principal) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut index =
                txn.open_table(PUBKEY_INDEX).map_err(|e| StorageError::Io(e.to_string()))?;

            let exists = table
                .get(principal.uid.as_str())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some();
            if exists {
                return Err(StorageError::AlreadyExists {
                    table: PRINCIPALS_TABLE,
                    key: principal.uid.clone(),
                });
            }

            let bytes = encode(principal)?;
            table
                .insert(principal.uid.as_str(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            let key = index_key(&principal.pubkey_digest, &principal.uid);
            index
                .insert(key.as_str(), principal.uid.as_str())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn delete_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let removed = {
            let mut table =
                txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut index =
                txn.open_table(PUBKEY_INDEX).map_err(|e| StorageError::Io(e.to_string()))?;

            remove_principal(&mut table, &mut index, uid)?
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(removed)
    }

    fn update_principal_timestamp(
        &self,
        uid: &str,
        timestamp: i64,
    ) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;

            let current: Option<Principal> = {
                let row = table.get(uid).map_err(|e| StorageError::Io(e.to_string()))?;
                row.map(|value| decode(value.value())).transpose()?
            };

            let Some(mut principal) = current else {
                return Ok(false);
            };
            if principal.timestamp >= timestamp {
                return Ok(false);
            }

            principal.timestamp = timestamp;
            let bytes = encode(&principal)?;
            table.insert(uid, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(true)
    }

    fn find_revocation(&self, cert_digest: &str) -> Result<Option<Revocation>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(REVOCATIONS).map_err(|e| StorageError::Io(e.to_string()))?;

        let row = table.get(cert_digest).map_err(|e| StorageError::Io(e.to_string()))?;
        row.map(|value| decode(value.value())).transpose()
    }

    fn list_revocations(&self) -> Result<Vec<Revocation>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(REVOCATIONS).map_err(|e| StorageError::Io(e.to_string()))?;

        scan(&table)
    }

    fn insert_revocation(&self, revocation: &Revocation) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(REVOCATIONS).map_err(|e| StorageError::Io(e.to_string()))?;
            insert_revocation_row(&mut table, revocation)?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn revoke_principal(
        &self,
        uid: &str,
        watermark: i64,
        revocation: &Revocation,
    ) -> Result<Principal, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let removed = {
            let mut principals =
                txn.open_table(PRINCIPALS).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut index =
                txn.open_table(PUBKEY_INDEX).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut revocations =
                txn.open_table(REVOCATIONS).map_err(|e| StorageError::Io(e.to_string()))?;

            let current: Principal = {
                let row = principals.get(uid).map_err(|e| StorageError::Io(e.to_string()))?;
                let value = row.ok_or_else(|| StorageError::Conflict {
                    key: uid.to_string(),
                    reason: "principal no longer exists".to_string(),
                })?;
                decode(value.value())?
            };
            check_revocable(&current, watermark, revocation)?;

            insert_revocation_row(&mut revocations, revocation)?;
            remove_principal(&mut principals, &mut index, uid)?;
            current
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(removed)
    }
}

/// Remove `uid` and its index entry inside an open write transaction.
fn remove_principal(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    index: &mut Table<'_, &'static str, &'static str>,
    uid: &str,
) -> Result<Option<Principal>, StorageError> {
    let removed: Option<Principal> = {
        let row = table.remove(uid).map_err(|e| StorageError::Io(e.to_string()))?;
        row.map(|value| decode(value.value())).transpose()?
    };

    if let Some(principal) = &removed {
        let key = index_key(&principal.pubkey_digest, uid);
        index.remove(key.as_str()).map_err(|e| StorageError::Io(e.to_string()))?;
    }

    Ok(removed)
}

/// Append a revocation inside an open write transaction.
fn insert_revocation_row(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    revocation: &Revocation,
) -> Result<(), StorageError> {
    let exists = table
        .get(revocation.cert_digest.as_str())
        .map_err(|e| StorageError::Io(e.to_string()))?
        .is_some();
    if exists {
        return Err(StorageError::AlreadyExists {
            table: REVOCATIONS_TABLE,
            key: revocation.cert_digest.clone(),
        });
    }

    let bytes = encode(revocation)?;
    table
        .insert(revocation.cert_digest.as_str(), bytes.as_slice())
        .map_err(|e| StorageError::Io(e.to_string()))?;

    Ok(())
}

/// Decode every value of a table in key order.
fn scan<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> Result<Vec<T>, StorageError> {
    let mut rows = Vec::new();
    for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
        let (_, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(row, &mut bytes)?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(ciborium::from_reader(bytes)?)
}

/// Index key: digest and uid separated by `/`.
///
/// Digests are fixed-length hex, so `/` never occurs inside one.
fn index_key(digest: &str, uid: &str) -> String {
    format!("{digest}/{uid}")
}

/// Half-open key range covering every index entry for `digest`.
///
/// `0` is the byte after `/`.
fn index_range(digest: &str) -> (String, String) {
    (format!("{digest}/"), format!("{digest}0"))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn principal(uid: &str, pubkey: &str, ts: i64) -> Principal {
        Principal::new(uid, pubkey, format!("digest-{uid}"), ts)
    }

    #[test]
    fn index_follows_principal_lifecycle() {
        let dir = tempdir().unwrap();
        let ledger = RedbLedger::open(dir.path().join("ledger.redb")).unwrap();

        ledger.insert_principal(&principal("alice", "SHARED", 1)).unwrap();
        ledger.insert_principal(&principal("bob", "SHARED", 1)).unwrap();
        assert_eq!(ledger.find_principals_by_pubkey("SHARED").unwrap().len(), 2);

        ledger.delete_principal("alice").unwrap();
        let left = ledger.find_principals_by_pubkey("SHARED").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].uid, "bob");
    }

    #[test]
    fn duplicate_insert_leaves_original() {
        let dir = tempdir().unwrap();
        let ledger = RedbLedger::open(dir.path().join("ledger.redb")).unwrap();

        ledger.insert_principal(&principal("alice", "K1", 1)).unwrap();
        let err = ledger.insert_principal(&principal("alice", "K2", 2)).unwrap_err();

        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(ledger.find_principal("alice").unwrap().unwrap().pubkey, "K1");
        assert!(ledger.find_principals_by_pubkey("K2").unwrap().is_empty());
    }

    #[test]
    fn revoke_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        let ledger = RedbLedger::open(dir.path().join("ledger.redb")).unwrap();
        ledger.insert_principal(&principal("alice", "K", 10)).unwrap();

        // Revocation already present: the principal must survive
        let record = Revocation { cert_digest: "digest-alice".into(), timestamp: 20 };
        ledger.insert_revocation(&record).unwrap();
        assert!(ledger.revoke_principal("alice", 10, &record).is_err());
        assert!(ledger.find_principal("alice").unwrap().is_some());
    }

    #[test]
    fn revoke_checks_watermark() {
        let dir = tempdir().unwrap();
        let ledger = RedbLedger::open(dir.path().join("ledger.redb")).unwrap();
        ledger.insert_principal(&principal("alice", "K", 10)).unwrap();
        let record = Revocation { cert_digest: "digest-alice".into(), timestamp: 20 };

        let err = ledger.revoke_principal("alice", 9, &record).unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let removed = ledger.revoke_principal("alice", 10, &record).unwrap();
        assert_eq!(removed.timestamp, 10);
        assert!(ledger.find_principals_by_pubkey("K").unwrap().is_empty());
        assert_eq!(ledger.list_revocations().unwrap(), vec![record]);
    }

    #[test]
    fn timestamp_update_is_conditional() {
        let dir = tempdir().unwrap();
        let ledger = RedbLedger::open(dir.path().join("ledger.redb")).unwrap();
        ledger.insert_principal(&principal("alice", "K", 10)).unwrap();

        assert!(!ledger.update_principal_timestamp("alice", 10).unwrap());
        assert!(ledger.update_principal_timestamp("alice", 12).unwrap());
        assert!(!ledger.update_principal_timestamp("ghost", 12).unwrap());
        assert_eq!(ledger.find_principal("alice").unwrap().unwrap().timestamp, 12);
    }
}
