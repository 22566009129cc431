//! Per-record async mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use gungnir_core::RecordKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async lock: one `tokio::sync::Mutex` per (table, id).
///
/// Locks are created on first use and dropped again once no task holds or
/// waits for them, so the map only contains records currently in use.
#[derive(Debug, Default)]
pub struct RecordGate {
    locks: DashMap<RecordKey, Arc<Mutex<()>>>,
}

impl RecordGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Access ends when the guard drops.
    pub async fn acquire(&self, key: &RecordKey) -> GateGuard<'_> {
        let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        // Built before waiting, so a cancelled acquire still cleans up.
        let mut gate_guard = GateGuard {
            gate: self,
            key: key.clone(),
            guard: None,
        };
        gate_guard.guard = Some(lock.lock_owned().await);
        gate_guard
    }

    /// Number of records with a live lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one record, released on drop.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a RecordGate,
    key: RecordKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits.
        self.gate
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
