//! Chaotic ledger wrapper for fault injection testing
//!
//! Ledger wrapper that randomly fails operations to test error handling and
//! recovery. It does not override `revoke_principal`, so revocations run as
//! separate steps and can fail halfway, which is the case worth testing.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use keystamp_core::{Principal, Revocation};

use super::{Ledger, StorageError};

/// Chaotic ledger wrapper that randomly injects failures
///
/// Delegates to an underlying ledger but fails operations based on a
/// configured failure rate. Uses Arc<Mutex<>> for the RNG state, making it
/// Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticLedger<L: Ledger> {
    inner: L,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operation counter
    operation_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic randomness.
/// This ensures chaos tests are reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    /// Check if we should fail (returns true with probability = `failure_rate`)
    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<L: Ledger> ChaoticLedger<L> {
    /// Create a new chaotic ledger wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: L, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: L, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying ledger (for checking invariants after chaos).
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Total number of ledger operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        {
            *self.operation_count.lock().expect("operation_count mutex poisoned") += 1;
        }

        #[allow(clippy::expect_used)]
        let mut rng = self.rng.lock().expect("ChaoticRng mutex poisoned");
        if rng.should_fail(self.failure_rate) {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<L: Ledger> Ledger for ChaoticLedger<L> {
    fn find_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError> {
        self.inject()?;
        self.inner.find_principal(uid)
    }

    fn find_principals_by_digest(&self, digest: &str) -> Result<Vec<Principal>, StorageError> {
        self.inject()?;
        self.inner.find_principals_by_digest(digest)
    }

    fn list_principals(&self) -> Result<Vec<Principal>, StorageError> {
        self.inject()?;
        self.inner.list_principals()
    }

    fn insert_principal(&self, principal: &Principal) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.insert_principal(principal)
    }

    fn delete_principal(&self, uid: &str) -> Result<Option<Principal>, StorageError> {
        self.inject()?;
        self.inner.delete_principal(uid)
    }

    fn update_principal_timestamp(
        &self,
        uid: &str,
        timestamp: i64,
    ) -> Result<bool, StorageError> {
        self.inject()?;
        self.inner.update_principal_timestamp(uid, timestamp)
    }

    fn find_revocation(&self, cert_digest: &str) -> Result<Option<Revocation>, StorageError> {
        self.inject()?;
        self.inner.find_revocation(cert_digest)
    }

    fn list_revocations(&self) -> Result<Vec<Revocation>, StorageError> {
        self.inject()?;
        self.inner.list_revocations()
    }

    fn insert_revocation(&self, revocation: &Revocation) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.insert_revocation(revocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLedger;

    fn principal(uid: &str) -> Principal {
        Principal::new(uid, "K", format!("digest-{uid}"), 1)
    }

    #[test]
    fn test_chaotic_with_zero_failure_rate() {
        let chaotic = ChaoticLedger::new(MemoryLedger::new(), 0.0);

        for i in 0..100 {
            chaotic.insert_principal(&principal(&format!("user-{i}"))).unwrap();
        }

        assert_eq!(chaotic.list_principals().unwrap().len(), 100);
        assert_eq!(chaotic.operation_count(), 101);
    }

    #[test]
    fn test_chaotic_with_100_failure_rate() {
        let chaotic = ChaoticLedger::new(MemoryLedger::new(), 1.0);

        assert!(chaotic.insert_principal(&principal("alice")).is_err());
        assert!(chaotic.find_principal("alice").is_err());
        assert!(chaotic.list_revocations().is_err());
        assert_eq!(chaotic.inner().principal_count(), 0);
    }

    #[test]
    fn test_chaotic_deterministic_with_seed() {
        let chaotic1 = ChaoticLedger::with_seed(MemoryLedger::new(), 0.5, 42);
        let chaotic2 = ChaoticLedger::with_seed(MemoryLedger::new(), 0.5, 42);

        for i in 0..100 {
            let row = principal(&format!("user-{i}"));
            let result1 = chaotic1.insert_principal(&row);
            let result2 = chaotic2.insert_principal(&row);

            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }

    #[test]
    fn test_chaotic_revoke_can_stop_halfway() {
        // Seeds until the delete step fails after the append succeeded
        let mut seen_partial = false;
        for seed in 0..500 {
            let memory = MemoryLedger::new();
            memory.insert_principal(&principal("alice")).unwrap();
            let chaotic = ChaoticLedger::with_seed(memory, 0.3, seed);
            let record = Revocation { cert_digest: "digest-alice".into(), timestamp: 2 };

            let result = chaotic.revoke_principal("alice", 1, &record);
            if let Err(StorageError::PartialWrite { .. }) = result {
                seen_partial = true;
                assert_eq!(chaotic.inner().revocation_count(), 1);
                assert_eq!(chaotic.inner().principal_count(), 1);
                break;
            }
        }
        assert!(seen_partial);
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn test_chaotic_rejects_invalid_failure_rate() {
        let _chaotic = ChaoticLedger::new(MemoryLedger::new(), 1.5);
    }
}
