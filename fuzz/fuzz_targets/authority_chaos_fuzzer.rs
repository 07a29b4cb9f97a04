//! Fuzz target for the authority under ledger failures
//!
//! Drives register and revoke requests (valid, replayed, forged, stale)
//! against an authority whose ledger fails at random.
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%)
//! - Mixed valid and invalid requests from a handful of clients
//! - Clock jumps in both directions
//!
//! # Invariants
//!
//! - The authority NEVER panics on storage errors
//! - A digest is both live and revoked only after a reported
//!   `PartialRevocation` for it
//! - Watermarks never decrease while a principal exists

#![no_main]

use std::collections::{HashMap, HashSet};

use arbitrary::Arbitrary;
use keystamp_core::{AuthorityError, Operation};
use keystamp_harness::{TestClient, sim_authority};
use keystamp_server::{AuthorityConfig, ChaoticLedger, Ledger, MemoryLedger};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    /// Seed for the CA, the environment and the ledger RNG
    seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    /// Sequence of requests
    operations: Vec<ChaosOperation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum ChaosOperation {
    Register { client: u8 },
    Revoke { client: u8, offset_ms: i16 },
    Forge { attacker: u8, victim: u8 },
    Shift { millis: i32 },
}

const CLIENTS: u8 = 4;

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let ledger = ChaoticLedger::with_seed(MemoryLedger::new(), failure_rate, scenario.seed);
    let inner = ledger.inner().clone();
    let authority = sim_authority(scenario.seed, ledger, AuthorityConfig::default());
    let env = authority.env().clone();

    let clients: Vec<TestClient> = (0..CLIENTS)
        .map(|i| TestClient::new(format!("client-{i}"), u64::from(i) + 1))
        .collect();
    let client = |id: u8| &clients[usize::from(id % CLIENTS)];

    let mut partial: HashSet<String> = HashSet::new();
    let mut watermarks: HashMap<String, i64> = HashMap::new();

    for op in scenario.operations.iter().take(64) {
        match op {
            ChaosOperation::Register { client: id } => {
                let c = client(*id);
                let sig = c.sign(Operation::Register, env.now());
                let _ = authority.register(c.uid(), c.pubkey(), &sig);
            },
            ChaosOperation::Revoke { client: id, offset_ms } => {
                let c = client(*id);
                let sig = c.sign(Operation::Revoke, env.now() + i64::from(*offset_ms));
                if let Err(AuthorityError::PartialRevocation { cert_digest, .. }) =
                    authority.revoke(c.uid(), &sig)
                {
                    partial.insert(cert_digest);
                }
            },
            ChaosOperation::Forge { attacker, victim } => {
                let victim = client(*victim);
                let sig = client(*attacker).forge_for(victim, Operation::Revoke, env.now());
                if let Err(AuthorityError::PartialRevocation { cert_digest, .. }) =
                    authority.revoke(victim.uid(), &sig)
                {
                    partial.insert(cert_digest);
                }
            },
            ChaosOperation::Shift { millis } => env.shift(i64::from(*millis)),
        }

        let principals = inner.list_principals().expect("memory ledger never fails");
        let revoked: HashSet<String> = inner
            .list_revocations()
            .expect("memory ledger never fails")
            .into_iter()
            .map(|r| r.cert_digest)
            .collect();

        for principal in &principals {
            if revoked.contains(&principal.cert_digest) {
                assert!(
                    partial.contains(&principal.cert_digest),
                    "unreported live revoked digest {}",
                    principal.cert_digest
                );
            }
            if let Some(&previous) = watermarks.get(&principal.uid) {
                let uid = &principal.uid;
                assert!(principal.timestamp >= previous, "watermark of {uid} decreased");
            }
        }

        watermarks = principals.into_iter().map(|p| (p.uid, p.timestamp)).collect();
    }
});
