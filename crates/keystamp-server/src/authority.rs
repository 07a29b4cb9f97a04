//! The certificate authority's operations.
//!
//! [`Authority`] ties the protocol core to a [`Ledger`]: it reads principal
//! state, authenticates against it, issues or revokes, and writes the
//! outcome. Everything here is synchronous; the HTTP layer runs it on
//! blocking threads.
//!
//! # Ordering
//!
//! Register: uid check, uid lock, duplicate check, authenticate (freshness,
//! monotonicity, key, signature), issue, insert.
//!
//! Revoke: freshness, uid lock, read principal, authenticate against the
//! stored key and watermark, conditional `revoke_principal`.
//!
//! # Replay protection
//!
//! Per-uid locks serialize operations within this process. The ledger's
//! unique constraints and the watermark condition inside `revoke_principal`
//! cover writers that do not share the locks.

use std::sync::Arc;

use keystamp_core::{
    AuthorityError, Authenticator, CaKey, Claim, Environment, IssuedCertificate, Operation,
    Principal, RequestSignature, Revocation, issue_certificate, validate_uid,
};

use crate::{
    config::AuthorityConfig,
    locks::UidLocks,
    storage::{Ledger, StorageError},
};

impl From<StorageError> for AuthorityError {
    fn from(err: StorageError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// The CA's core operations over a ledger.
///
/// Clone is cheap: the CA key and locks are shared, ledgers share state.
#[derive(Clone)]
pub struct Authority<E: Environment, L: Ledger> {
    env: E,
    ledger: L,
    ca: Arc<CaKey>,
    authenticator: Authenticator,
    config: AuthorityConfig,
    locks: UidLocks,
}

impl<E: Environment, L: Ledger> Authority<E, L> {
    /// Create an authority.
    pub fn new(env: E, ledger: L, ca: Arc<CaKey>, config: AuthorityConfig) -> Self {
        Self {
            authenticator: Authenticator::new(config.freshness_window),
            env,
            ledger,
            ca,
            config,
            locks: UidLocks::new(),
        }
    }

    /// CA key material.
    pub fn ca(&self) -> &CaKey {
        &self.ca
    }

    /// Underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Environment (clock and randomness).
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Register `uid` with `pubkey` and issue its certificate.
    ///
    /// The signature must cover `POST:/user` and be made with `pubkey`. The
    /// new principal's watermark is the signature timestamp.
    pub fn register(
        &self,
        uid: &str,
        pubkey: &str,
        signature: &RequestSignature,
    ) -> Result<IssuedCertificate, AuthorityError> {
        validate_uid(uid)?;

        let _guard = self.locks.lock(uid);

        if self.read(|ledger| ledger.find_principal(uid))?.is_some() {
            return Err(AuthorityError::DuplicatePrincipal { uid: uid.to_string() });
        }

        let now = self.env.wall_clock_millis();
        let key = self
            .authenticator
            .authenticate(&Claim::unregistered(uid, pubkey), Operation::Register, signature, now)
            .inspect_err(|e| tracing::warn!(%uid, error = %e, "registration rejected"))?;

        let issued = issue_certificate(&self.ca, uid, &key, &self.env)
            .inspect_err(|e| tracing::error!(%uid, error = %e, "certificate issuance failed"))?;

        let principal = Principal::new(uid, pubkey, &issued.fingerprint, signature.timestamp);
        self.ledger.insert_principal(&principal).map_err(|e| match e {
            StorageError::AlreadyExists { .. } => {
                AuthorityError::DuplicatePrincipal { uid: uid.to_string() }
            },
            other => other.into(),
        })?;

        tracing::info!(
            %uid,
            cert_digest = %issued.fingerprint,
            serial = %issued.serial,
            "certificate issued"
        );

        Ok(issued)
    }

    /// Active principals: one by uid, or all of them.
    ///
    /// An unknown uid is `PrincipalNotFound`, not an empty list.
    pub fn lookup(&self, uid: Option<&str>) -> Result<Vec<Principal>, AuthorityError> {
        match uid {
            Some(uid) => {
                let principal = self.read(|ledger| ledger.find_principal(uid))?;
                principal
                    .map(|p| vec![p])
                    .ok_or_else(|| AuthorityError::PrincipalNotFound { uid: uid.to_string() })
            },
            None => self.read(L::list_principals),
        }
    }

    /// Uids registered under the public key PEM `pubkey`.
    pub fn lookup_by_pubkey(&self, pubkey: &str) -> Result<Vec<String>, AuthorityError> {
        let principals = self.read(|ledger| ledger.find_principals_by_pubkey(pubkey))?;
        Ok(principals.into_iter().map(|p| p.uid).collect())
    }

    /// Revoke `uid`'s certificate.
    ///
    /// The signature must cover `DELETE:/user`, be made with the stored key
    /// and carry a timestamp above the stored watermark.
    pub fn revoke(
        &self,
        uid: &str,
        signature: &RequestSignature,
    ) -> Result<Revocation, AuthorityError> {
        let now = self.env.wall_clock_millis();
        self.authenticator
            .check_freshness(signature.timestamp, now)
            .inspect_err(|e| tracing::warn!(%uid, error = %e, "revocation rejected"))?;

        let _guard = self.locks.lock(uid);

        let principal = self
            .read(|ledger| ledger.find_principal(uid))?
            .ok_or_else(|| AuthorityError::PrincipalNotFound { uid: uid.to_string() })?;

        self.authenticator
            .authenticate(&Claim::registered(uid, &principal), Operation::Revoke, signature, now)
            .inspect_err(|e| tracing::warn!(%uid, error = %e, "revocation rejected"))?;

        let record = Revocation { cert_digest: principal.cert_digest.clone(), timestamp: now };

        match self.ledger.revoke_principal(uid, principal.timestamp, &record) {
            Ok(_) => {
                tracing::info!(%uid, cert_digest = %record.cert_digest, "certificate revoked");
                Ok(record)
            },
            Err(StorageError::Conflict { reason, .. }) => {
                tracing::warn!(%uid, %reason, "revocation lost a race");
                Err(AuthorityError::ReplayedTimestamp {
                    timestamp: signature.timestamp,
                    watermark: principal.timestamp,
                })
            },
            Err(StorageError::AlreadyExists { .. }) => self.finish_revocation(uid, record),
            Err(StorageError::PartialWrite { reason, .. }) => {
                tracing::error!(
                    %uid,
                    cert_digest = %record.cert_digest,
                    %reason,
                    "revocation recorded but principal not removed"
                );
                Err(AuthorityError::PartialRevocation {
                    uid: uid.to_string(),
                    cert_digest: record.cert_digest,
                    reason,
                })
            },
            Err(other) => Err(other.into()),
        }
    }

    /// Every revocation record.
    pub fn list_revocations(&self) -> Result<Vec<Revocation>, AuthorityError> {
        self.read(L::list_revocations)
    }

    /// Whether a certificate digest has been revoked.
    ///
    /// Hex case and surrounding whitespace are ignored.
    pub fn check_revoked(&self, digest: &str) -> Result<bool, AuthorityError> {
        let digest = digest.trim().to_ascii_lowercase();
        Ok(self.read(|ledger| ledger.find_revocation(&digest))?.is_some())
    }

    /// Complete a revocation interrupted after its record was written.
    ///
    /// The certificate is already revoked; only the stale row is left.
    fn finish_revocation(
        &self,
        uid: &str,
        record: Revocation,
    ) -> Result<Revocation, AuthorityError> {
        tracing::warn!(
            %uid,
            cert_digest = %record.cert_digest,
            "completing earlier partial revocation"
        );

        self.ledger.delete_principal(uid).map_err(|e| AuthorityError::PartialRevocation {
            uid: uid.to_string(),
            cert_digest: record.cert_digest.clone(),
            reason: e.to_string(),
        })?;

        let existing = self.read(|ledger| ledger.find_revocation(&record.cert_digest))?;
        Ok(existing.unwrap_or(record))
    }

    /// Run a ledger read, retrying transient failures with backoff.
    fn read<T>(
        &self,
        op: impl Fn(&L) -> Result<T, StorageError>,
    ) -> Result<T, AuthorityError> {
        let attempts = self.config.read_attempts.max(1);
        let mut backoff = self.config.read_backoff;
        let mut attempt = 1;

        loop {
            match op(&self.ledger) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::debug!(attempt, error = %e, "retrying ledger read");
                    self.env.sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use keystamp_core::{
        CaIdentity, canonical_message,
        env::test_utils::{MOCK_EPOCH_MS, MockEnv},
    };
    use keystamp_crypto::{SignatureEncoding, public_key_pem};
    use p256::{
        ecdsa::{Signature, SigningKey, signature::Signer},
        pkcs8::{EncodePrivateKey, LineEnding},
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::storage::{ChaoticLedger, MemoryLedger};

    fn ca() -> Arc<CaKey> {
        let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(7));
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        Arc::new(CaKey::from_pkcs8_pem(&pem, CaIdentity::default(), MOCK_EPOCH_MS).unwrap())
    }

    fn user(seed: u64) -> (SigningKey, String) {
        let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(seed));
        let pem = public_key_pem(key.verifying_key());
        (key, pem)
    }

    fn sign(key: &SigningKey, uid: &str, pem: &str, op: Operation, ts: i64) -> RequestSignature {
        let signature: Signature = key.sign(canonical_message(ts, uid, pem, op).as_bytes());
        RequestSignature {
            sig: STANDARD.encode(signature.to_der().as_bytes()),
            timestamp: ts,
            encoding: SignatureEncoding::Der,
        }
    }

    fn authority<L: Ledger>(env: &MockEnv, ledger: L) -> Authority<MockEnv, L> {
        Authority::new(env.clone(), ledger, ca(), AuthorityConfig::default())
    }

    #[test]
    fn register_then_lookup() {
        let env = MockEnv::new();
        let authority = authority(&env, MemoryLedger::new());
        let (key, pem) = user(1);

        let now = env.wall_clock_millis();
        let sig = sign(&key, "alice", &pem, Operation::Register, now);
        let issued = authority.register("alice", &pem, &sig).unwrap();

        let found = authority.lookup(Some("alice")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cert_digest, issued.fingerprint);
        assert_eq!(found[0].timestamp, now);
        assert_eq!(authority.lookup_by_pubkey(&pem).unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn duplicate_registration_rejected_before_authentication() {
        let env = MockEnv::new();
        let authority = authority(&env, MemoryLedger::new());
        let (key, pem) = user(1);

        let now = env.wall_clock_millis();
        let sig = sign(&key, "alice", &pem, Operation::Register, now);
        authority.register("alice", &pem, &sig).unwrap();

        // Garbage signature: the duplicate check answers first
        let garbage = RequestSignature {
            sig: "AAAA".into(),
            timestamp: now + 1,
            encoding: SignatureEncoding::Der,
        };
        assert_eq!(
            authority.register("alice", &pem, &garbage).unwrap_err(),
            AuthorityError::DuplicatePrincipal { uid: "alice".into() }
        );
        assert_eq!(authority.ledger().principal_count(), 1);
    }

    #[test]
    fn unknown_uid_lookup_is_not_found() {
        let env = MockEnv::new();
        let authority = authority(&env, MemoryLedger::new());

        assert!(matches!(
            authority.lookup(Some("ghost")),
            Err(AuthorityError::PrincipalNotFound { .. })
        ));
        assert!(authority.lookup(None).unwrap().is_empty());
    }

    #[test]
    fn revoke_records_digest_with_server_time() {
        let env = MockEnv::new();
        let authority = authority(&env, MemoryLedger::new());
        let (key, pem) = user(2);

        let t0 = env.wall_clock_millis();
        let issued = authority
            .register("bob", &pem, &sign(&key, "bob", &pem, Operation::Register, t0))
            .unwrap();

        env.advance(Duration::from_secs(1));
        let t1 = env.wall_clock_millis();
        let sig = sign(&key, "bob", &pem, Operation::Revoke, t1);
        let record = authority.revoke("bob", &sig).unwrap();

        assert_eq!(record.cert_digest, issued.fingerprint);
        assert_eq!(record.timestamp, t1);
        assert!(authority.check_revoked(&issued.fingerprint.to_uppercase()).unwrap());
        assert!(authority.lookup(None).unwrap().is_empty());
    }

    #[test]
    fn revoke_with_registration_timestamp_is_replay() {
        let env = MockEnv::new();
        let authority = authority(&env, MemoryLedger::new());
        let (key, pem) = user(3);

        let t0 = env.wall_clock_millis();
        let sig = sign(&key, "carol", &pem, Operation::Register, t0);
        authority.register("carol", &pem, &sig).unwrap();

        let result = authority.revoke("carol", &sign(&key, "carol", &pem, Operation::Revoke, t0));
        assert_eq!(
            result.unwrap_err(),
            AuthorityError::ReplayedTimestamp { timestamp: t0, watermark: t0 }
        );
        assert_eq!(authority.ledger().principal_count(), 1);
    }

    #[test]
    fn revoke_unknown_uid_is_not_found() {
        let env = MockEnv::new();
        let authority = authority(&env, MemoryLedger::new());
        let (key, pem) = user(4);

        let now = env.wall_clock_millis();
        let result = authority.revoke("ghost", &sign(&key, "ghost", &pem, Operation::Revoke, now));
        assert!(matches!(result, Err(AuthorityError::PrincipalNotFound { .. })));
    }

    #[test]
    fn stale_revoke_rejected_before_lookup() {
        let env = MockEnv::new();
        let authority = authority(&env, ChaoticLedger::new(MemoryLedger::new(), 1.0));
        let (key, pem) = user(5);

        // Every ledger call would fail; freshness must answer first
        let stale = env.wall_clock_millis() - 31_000;
        let result = authority.revoke("dave", &sign(&key, "dave", &pem, Operation::Revoke, stale));
        assert!(matches!(result, Err(AuthorityError::StaleSignature { .. })));
        assert_eq!(authority.ledger().operation_count(), 0);
    }

    #[test]
    fn reads_retry_with_backoff() {
        let env = MockEnv::new();
        let config = AuthorityConfig {
            read_attempts: 3,
            read_backoff: Duration::from_millis(50),
            ..AuthorityConfig::default()
        };
        let ledger = ChaoticLedger::new(MemoryLedger::new(), 1.0);
        let authority = Authority::new(env.clone(), ledger, ca(), config);

        let start = env.wall_clock_millis();
        let result = authority.list_revocations();

        assert!(matches!(result, Err(AuthorityError::StorageUnavailable(_))));
        assert_eq!(authority.ledger().operation_count(), 3);
        // 50ms then 100ms of simulated backoff
        assert_eq!(env.wall_clock_millis() - start, 150);
    }

    #[test]
    fn interrupted_revocation_is_completed_by_retry() {
        let env = MockEnv::new();
        let ledger = MemoryLedger::new();
        let authority = authority(&env, ledger.clone());
        let (key, pem) = user(6);

        let t0 = env.wall_clock_millis();
        let issued = authority
            .register("erin", &pem, &sign(&key, "erin", &pem, Operation::Register, t0))
            .unwrap();

        // Simulate a crash between the append and the delete
        let record = Revocation { cert_digest: issued.fingerprint.clone(), timestamp: t0 + 5 };
        ledger.insert_revocation(&record).unwrap();

        env.advance(Duration::from_millis(10));
        let t1 = env.wall_clock_millis();
        let result = authority.revoke("erin", &sign(&key, "erin", &pem, Operation::Revoke, t1));

        assert_eq!(result.unwrap(), record);
        assert_eq!(ledger.principal_count(), 0);
        assert_eq!(ledger.revocation_count(), 1);
    }
}
