use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per phase number, shared by everything that writes a
/// phase's result row. Clones share the same map.
#[derive(Clone, Default)]
pub struct PhaseLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl PhaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, phase_number: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(phase_number).or_default())
    }

    /// Waits until no other writer holds `phase_number`.
    pub async fn acquire(&self, phase_number: i64) -> OwnedMutexGuard<()> {
        self.handle(phase_number).await.lock_owned().await
    }

    pub async fn is_held(&self, phase_number: i64) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(&phase_number)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}
