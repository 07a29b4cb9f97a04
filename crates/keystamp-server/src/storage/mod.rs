//! Principal and revocation ledger.
//!
//! Trait-based abstraction over the two tables the CA keeps:
//!
//! - `principals`: one row per active identity, unique on uid, indexed by
//!   public key digest
//! - `revocations`: append-only, unique on certificate digest
//!
//! The trait is synchronous (no async). The HTTP layer moves ledger work onto
//! blocking threads.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticLedger;
pub use error::StorageError;
use keystamp_core::{Principal, Revocation, pubkey_digest};
pub use memory::MemoryLedger;

pub use self::redb::RedbLedger;

/// Ledger of principals and revocations.
///
/// Must be Clone (shared by every request), Send + Sync (thread-safe), and
/// synchronous. Implementations share internal state via Arc, so clones
/// access the same underlying tables.
///
/// # Invariants
///
/// - At most one principal per uid
/// - A certificate digest is never both live (on a principal) and revoked
/// - Revocations are never removed
/// - A principal's `timestamp` never decreases
pub trait Ledger: Clone + Send + Sync + 'static {
    /// Principal with this uid, if active.
    fn find_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError>;

    /// Principals whose `pubkey_digest` equals `digest`.
    fn find_principals_by_digest(&self, digest: &str) -> Result<Vec<Principal>, StorageError>;

    /// Every active principal, ordered by uid.
    fn list_principals(&self) -> Result<Vec<Principal>, StorageError>;

    /// Insert a new principal.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the uid is taken. Nothing is written in that case.
    fn insert_principal(&self, principal: &Principal) -> Result<(), StorageError>;

    /// Remove a principal, returning the removed row.
    fn delete_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError>;

    /// Advance a principal's watermark to `timestamp`.
    ///
    /// Conditional: only writes when the stored value is strictly lower.
    /// Returns whether the watermark moved. A missing principal is `false`.
    ///
    /// Part of the store contract only: no `Authority` operation calls it,
    /// since registration sets the watermark and revocation deletes the row.
    fn update_principal_timestamp(&self, uid: &str, timestamp: i64)
    -> Result<bool, StorageError>;

    /// Revocation record for `cert_digest`, if any.
    fn find_revocation(&self, cert_digest: &str) -> Result<Option<Revocation>, StorageError>;

    /// Every revocation, ordered by digest.
    fn list_revocations(&self) -> Result<Vec<Revocation>, StorageError>;

    /// Append a revocation.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the digest is already revoked.
    fn insert_revocation(&self, revocation: &Revocation) -> Result<(), StorageError>;

    /// Principals registered under the public key PEM `pubkey`.
    fn find_principals_by_pubkey(&self, pubkey: &str) -> Result<Vec<Principal>, StorageError> {
        self.find_principals_by_digest(&pubkey_digest(pubkey))
    }

    /// Revoke `uid`'s certificate and remove the principal.
    ///
    /// The row must still carry `watermark` as its timestamp and
    /// `revocation.cert_digest` as its certificate, otherwise `Conflict`.
    ///
    /// This default runs three independent steps: check, append the
    /// revocation, delete the row. The revocation goes first so a crash in
    /// between leaves a revoked certificate with a stale row rather than a
    /// live certificate nobody can revoke. A failure after the append is
    /// `PartialWrite`. Backends with transactions override this atomically.
    fn revoke_principal(
        &self,
        uid: &str,
        watermark: i64,
        revocation: &Revocation,
    ) -> Result<Principal, StorageError> {
        let current = self.find_principal(uid)?.ok_or_else(|| StorageError::Conflict {
            key: uid.to_string(),
            reason: "principal no longer exists".to_string(),
        })?;
        check_revocable(&current, watermark, revocation)?;

        self.insert_revocation(revocation)?;

        match self.delete_principal(uid) {
            Ok(Some(removed)) => Ok(removed),
            Ok(None) => Err(StorageError::PartialWrite {
                completed: format!("revocation of {}", revocation.cert_digest),
                reason: format!("principal {uid} vanished before removal"),
            }),
            Err(e) => Err(StorageError::PartialWrite {
                completed: format!("revocation of {}", revocation.cert_digest),
                reason: e.to_string(),
            }),
        }
    }
}

/// Preconditions for revoking `current`.
pub(crate) fn check_revocable(
    current: &Principal,
    watermark: i64,
    revocation: &Revocation,
) -> Result<(), StorageError> {
    if current.timestamp != watermark {
        return Err(StorageError::Conflict {
            key: current.uid.clone(),
            reason: format!("watermark moved from {watermark} to {}", current.timestamp),
        });
    }
    if current.cert_digest != revocation.cert_digest {
        return Err(StorageError::Conflict {
            key: current.uid.clone(),
            reason: "certificate changed".to_string(),
        });
    }
    Ok(())
}

/// Table names used in errors.
pub(crate) const PRINCIPALS_TABLE: &str = "principals";
pub(crate) const REVOCATIONS_TABLE: &str = "revocations";
