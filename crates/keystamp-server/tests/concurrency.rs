//! Concurrent registration and revocation of one principal.
//!
//! Many threads race on the same uid, each with its own valid signature:
//! revocations with distinct fresh timestamps, registrations with distinct
//! keys. Exactly one may win; the rest must fail without writing anything.
//! Covered both within one authority (per-uid locks) and across two
//! authorities sharing a ledger, which is what two server processes on one
//! database look like.

use std::{sync::Arc, thread, time::Duration};

use keystamp_core::{AuthorityError, Operation};
use keystamp_harness::{SimEnv, TestClient, sim_ca};
use keystamp_server::{Authority, AuthorityConfig, Ledger, MemoryLedger, RedbLedger};
use tempfile::tempdir;

const RACERS: i64 = 16;

fn authority<L: Ledger>(env: &SimEnv, ledger: L) -> Authority<SimEnv, L> {
    let ca = Arc::new(sim_ca(42, env.now()));
    Authority::new(env.clone(), ledger, ca, AuthorityConfig::default())
}

/// Register alice, then race `RACERS` revocations split across `authorities`.
fn race<L: Ledger>(env: &SimEnv, authorities: &[Authority<SimEnv, L>]) {
    let alice = TestClient::new("alice", 1);
    let t0 = env.now();
    let issued = authorities[0]
        .register("alice", alice.pubkey(), &alice.sign(Operation::Register, t0))
        .unwrap();
    env.advance(Duration::from_millis(100));

    let results: Vec<Result<_, AuthorityError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..RACERS)
            .map(|i| {
                let authority = &authorities[i as usize % authorities.len()];
                let sig = alice.sign(Operation::Revoke, t0 + 1 + i);
                scope.spawn(move || authority.revoke("alice", &sig))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "{results:?}");
    for result in &results {
        match result {
            Ok(record) => assert_eq!(record.cert_digest, issued.fingerprint),
            Err(
                AuthorityError::PrincipalNotFound { .. }
                | AuthorityError::ReplayedTimestamp { .. },
            ) => {},
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    let ledger = authorities[0].ledger();
    assert!(ledger.find_principal("alice").unwrap().is_none());
    assert_eq!(ledger.list_revocations().unwrap().len(), 1);
}

/// Race `RACERS` registrations of alice, each with its own key.
fn race_registration<L: Ledger>(env: &SimEnv, authorities: &[Authority<SimEnv, L>]) {
    let now = env.now();
    let clients: Vec<TestClient> =
        (0..RACERS).map(|i| TestClient::new("alice", 100 + i as u64)).collect();

    let results: Vec<Result<_, AuthorityError>> = thread::scope(|scope| {
        let handles: Vec<_> = clients
            .iter()
            .enumerate()
            .map(|(i, client)| {
                let authority = &authorities[i % authorities.len()];
                let sig = client.sign(Operation::Register, now);
                scope.spawn(move || authority.register(client.uid(), client.pubkey(), &sig))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<usize> =
        results.iter().enumerate().filter(|(_, r)| r.is_ok()).map(|(i, _)| i).collect();
    assert_eq!(winners.len(), 1, "{results:?}");
    for result in &results {
        if let Err(error) = result {
            assert!(matches!(error, AuthorityError::DuplicatePrincipal { .. }), "{error:?}");
        }
    }

    let winner = winners[0];
    let issued = results[winner].as_ref().unwrap();
    let rows = authorities[0].ledger().list_principals().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].cert_digest, issued.fingerprint);
    assert_eq!(rows[0].pubkey, clients[winner].pubkey());
}

#[test]
fn test_one_registration_memory_two_authorities() {
    let env = SimEnv::with_seed(5);
    let ledger = MemoryLedger::new();
    race_registration(&env, &[authority(&env, ledger.clone()), authority(&env, ledger)]);
}

#[test]
fn test_one_registration_redb_two_authorities() {
    let dir = tempdir().unwrap();
    let ledger = RedbLedger::open(dir.path().join("ledger.redb")).unwrap();
    let env = SimEnv::with_seed(6);
    race_registration(&env, &[authority(&env, ledger.clone()), authority(&env, ledger)]);
}

#[test]
fn test_one_winner_memory() {
    let env = SimEnv::with_seed(1);
    race(&env, &[authority(&env, MemoryLedger::new())]);
}

#[test]
fn test_one_winner_memory_two_authorities() {
    let env = SimEnv::with_seed(2);
    let ledger = MemoryLedger::new();
    race(&env, &[authority(&env, ledger.clone()), authority(&env, ledger)]);
}

#[test]
fn test_one_winner_redb_two_authorities() {
    let dir = tempdir().unwrap();
    let ledger = RedbLedger::open(dir.path().join("ledger.redb")).unwrap();
    let env = SimEnv::with_seed(3);
    race(&env, &[authority(&env, ledger.clone()), authority(&env, ledger)]);
}

#[test]
fn test_independent_principals_all_register() {
    let env = SimEnv::with_seed(4);
    let authority = authority(&env, MemoryLedger::new());
    let now = env.now();

    thread::scope(|scope| {
        for i in 0..32 {
            let authority = &authority;
            scope.spawn(move || {
                let client = TestClient::new(format!("user-{i}"), i);
                let sig = client.sign(Operation::Register, now);
                authority.register(client.uid(), client.pubkey(), &sig).unwrap();
            });
        }
    });

    assert_eq!(authority.lookup(None).unwrap().len(), 32);
}
