//! Ledger invariants checked between simulated operations.
//!
//! Invariants are properties of the ledger that must hold after every
//! operation, whatever the operation's outcome. They are checked against a
//! [`LedgerSnapshot`] rather than against particular scenarios.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = LedgerSnapshot::capture(authority.ledger(), env.now())?;
//! registry.check_all(&snapshot)?;
//! ```

use std::fmt;

mod checks;
mod snapshot;

pub use checks::{
    NoLiveRevokedCertificate, PubkeyIndexConsistent, RevocationsNotInFuture, UniqueCertificates,
};
pub use snapshot::LedgerSnapshot;

/// Outcome of a single check.
pub type InvariantResult = Result<(), Violation>;

/// A broken ledger property.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Which check failed.
    pub invariant: &'static str,
    /// The offending rows.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a ledger snapshot.
pub trait Invariant: Send + Sync {
    /// Short name used in reports.
    fn name(&self) -> &'static str;

    /// Inspect `state`, reporting the first offending row.
    fn check(&self, state: &LedgerSnapshot) -> InvariantResult;
}

/// An ordered set of ledger checks.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// No checks at all.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard ledger invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(NoLiveRevokedCertificate);
        registry.add(UniqueCertificates);
        registry.add(PubkeyIndexConsistent);
        registry.add(RevocationsNotInFuture);
        registry
    }

    /// Append a check.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, collecting every violation.
    pub fn check_all(&self, state: &LedgerSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.invariants.iter().filter_map(|check| check.check(state).err()).collect();

        for violation in &violations {
            tracing::error!(invariant = violation.invariant, "{}", violation.message);
        }

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &LedgerSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("ledger invariant broken {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of checks.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True when no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_covers_four_properties() {
        assert_eq!(InvariantRegistry::standard().len(), 4);
    }

    #[test]
    fn empty_ledger_is_consistent() {
        assert!(InvariantRegistry::standard().check_all(&LedgerSnapshot::empty()).is_ok());
    }
}
