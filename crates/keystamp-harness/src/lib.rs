//! Deterministic simulation harness for keystamp testing.
//!
//! Seeded implementations of the [`Environment`](keystamp_core::Environment)
//! trait and of client keys, so that every test run (serials, keys, clock
//! readings) is reproducible from a seed.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of the
//! authority. Operations are applied to both the model and a real
//! [`Authority`](keystamp_server::Authority), and their observable states
//! are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks ledger properties that must hold after
//! every step. Use [`InvariantRegistry::standard()`] for the full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod invariants;
pub mod model;
pub mod sim_authority;
pub mod sim_env;

pub use client::TestClient;
pub use invariants::{
    Invariant, InvariantRegistry, InvariantResult, LedgerSnapshot, NoLiveRevokedCertificate,
    PubkeyIndexConsistent, RevocationsNotInFuture, UniqueCertificates, Violation,
};
pub use model::{
    ClientId, ModelPrincipal, ModelWorld, ObservableState, Operation, OperationError,
    OperationResult,
};
pub use sim_authority::{sim_authority, sim_ca};
pub use sim_env::{SIM_EPOCH_MS, SimEnv};
