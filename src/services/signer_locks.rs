//! Per-identity serialization of ledger submissions
//!
//! The ledger's per-account sequence numbers are linear: two in-flight
//! submissions from the same signer race and one fails with a past-sequence
//! error. This keyed mutex guarantees at most one submission per signer is
//! in flight within the process. Locks are process-local only; waiters on
//! one identity queue FIFO while distinct identities proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct SignerLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SignerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for one signer identity. The guard
    /// releases on drop; hold it across prepare/sign/submit only, the
    /// validation wait does not need it.
    pub async fn acquire(&self, signer_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock();
            locks.entry(signer_id.to_string()).or_default().clone()
        };
        entry.lock_owned().await
    }

    /// Whether the given identity's lock is currently held. Observational,
    /// for tests and metrics.
    pub fn is_locked(&self, signer_id: &str) -> bool {
        let locks = self.locks.lock();
        locks
            .get(signer_id)
            .map(|m| m.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of identities whose lock is currently held.
    pub fn locked_count(&self) -> usize {
        let locks = self.locks.lock();
        locks.values().filter(|m| m.try_lock().is_err()).count()
    }
}
