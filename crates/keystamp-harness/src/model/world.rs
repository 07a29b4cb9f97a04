//! Model world.
//!
//! The reference implementation: a map of active principals with their
//! watermarks, a revocation counter and a clock. It is the oracle the real
//! authority is compared against.

use std::collections::BTreeMap;

use super::operation::{ClientId, Operation, OperationError, OperationResult};

/// Model view of an active principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPrincipal {
    /// Last accepted timestamp
    pub watermark: i64,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Active clients and their watermarks, ordered by client
    pub active: Vec<(ClientId, i64)>,
    /// Number of revocation records
    pub revocations: usize,
}

/// Model world: the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    num_clients: u8,
    window_ms: i64,
    now_ms: i64,
    active: BTreeMap<ClientId, ModelPrincipal>,
    revocations: usize,
}

impl ModelWorld {
    /// World with `num_clients` clients, a freshness window and a start time.
    pub fn new(num_clients: u8, window_ms: i64, now_ms: i64) -> Self {
        Self {
            num_clients: num_clients.max(1),
            window_ms,
            now_ms,
            active: BTreeMap::new(),
            revocations: 0,
        }
    }

    /// Map a generated id onto an existing client.
    pub fn client(&self, id: ClientId) -> ClientId {
        id % self.num_clients
    }

    /// Current model time.
    pub fn now(&self) -> i64 {
        self.now_ms
    }

    /// Active principal for a client.
    pub fn principal(&self, id: ClientId) -> Option<ModelPrincipal> {
        self.active.get(&self.client(id)).copied()
    }

    /// Timestamp the real client must sign `op` with.
    ///
    /// Must be called before [`ModelWorld::apply`].
    pub fn request_timestamp(&self, op: &Operation) -> i64 {
        match op {
            Operation::ReplayRevoke { client_id } => {
                self.principal(*client_id).map_or(self.now_ms, |p| p.watermark)
            },
            Operation::StaleRegister { late_secs, .. } => {
                self.now_ms - self.window_ms - 1 - i64::from(*late_secs) * 1_000
            },
            _ => self.now_ms,
        }
    }

    /// Apply an operation and return the expected result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let timestamp = self.request_timestamp(op);
        match op {
            Operation::Register { client_id, .. } | Operation::StaleRegister { client_id, .. } => {
                self.register(*client_id, timestamp)
            },
            Operation::Revoke { client_id } | Operation::ReplayRevoke { client_id } => {
                self.revoke(*client_id, timestamp, true)
            },
            Operation::ForgedRevoke { attacker_id, victim_id } => {
                let genuine = self.client(*attacker_id) == self.client(*victim_id);
                self.revoke(*victim_id, timestamp, genuine)
            },
            Operation::AdvanceTime { millis } => {
                self.now_ms += i64::from(*millis);
                Ok(())
            },
        }
    }

    /// Observable state.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            active: self.active.iter().map(|(&id, p)| (id, p.watermark)).collect(),
            revocations: self.revocations,
        }
    }

    fn is_fresh(&self, timestamp: i64) -> bool {
        (self.now_ms - timestamp).abs() <= self.window_ms
    }

    fn register(&mut self, id: ClientId, timestamp: i64) -> OperationResult {
        let id = self.client(id);
        if self.active.contains_key(&id) {
            return Err(OperationError::Duplicate);
        }
        if !self.is_fresh(timestamp) {
            return Err(OperationError::Stale);
        }
        self.active.insert(id, ModelPrincipal { watermark: timestamp });
        Ok(())
    }

    fn revoke(&mut self, id: ClientId, timestamp: i64, genuine: bool) -> OperationResult {
        let id = self.client(id);
        if !self.is_fresh(timestamp) {
            return Err(OperationError::Stale);
        }
        let principal = self.active.get(&id).ok_or(OperationError::NotFound)?;
        if timestamp <= principal.watermark {
            return Err(OperationError::Replayed);
        }
        if !genuine {
            return Err(OperationError::BadSignature);
        }
        self.active.remove(&id);
        self.revocations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_000_000;

    fn world() -> ModelWorld {
        ModelWorld::new(3, 30_000, T0)
    }

    #[test]
    fn revoke_in_same_millisecond_is_a_replay() {
        let mut world = world();
        assert_eq!(world.apply(&Operation::Register { client_id: 0, fixed_pair: false }), Ok(()));
        assert_eq!(
            world.apply(&Operation::Revoke { client_id: 0 }),
            Err(OperationError::Replayed)
        );
    }

    #[test]
    fn register_advance_revoke() {
        let mut world = world();
        world.apply(&Operation::Register { client_id: 1, fixed_pair: true }).unwrap();
        world.apply(&Operation::AdvanceTime { millis: 10 }).unwrap();
        assert_eq!(world.apply(&Operation::Revoke { client_id: 1 }), Ok(()));
        assert_eq!(world.observable_state().revocations, 1);
        assert!(world.observable_state().active.is_empty());
    }

    #[test]
    fn forged_revoke_reaches_signature_check() {
        let mut world = world();
        world.apply(&Operation::Register { client_id: 0, fixed_pair: false }).unwrap();
        world.apply(&Operation::AdvanceTime { millis: 1 }).unwrap();
        let forged = Operation::ForgedRevoke { attacker_id: 1, victim_id: 0 };
        assert_eq!(world.apply(&forged), Err(OperationError::BadSignature));
        assert_eq!(world.principal(0), Some(ModelPrincipal { watermark: T0 }));
    }

    #[test]
    fn stale_register_on_active_uid_is_duplicate() {
        let mut world = world();
        world.apply(&Operation::Register { client_id: 2, fixed_pair: false }).unwrap();
        let stale = Operation::StaleRegister { client_id: 2, late_secs: 0 };
        assert_eq!(world.apply(&stale), Err(OperationError::Duplicate));
    }

    #[test]
    fn replay_after_window_is_stale() {
        let mut world = world();
        world.apply(&Operation::Register { client_id: 0, fixed_pair: false }).unwrap();
        world.apply(&Operation::AdvanceTime { millis: 30_001 }).unwrap();
        assert_eq!(
            world.apply(&Operation::ReplayRevoke { client_id: 0 }),
            Err(OperationError::Stale)
        );
    }

    #[test]
    fn client_ids_wrap() {
        assert_eq!(world().client(4), 1);
    }
}
