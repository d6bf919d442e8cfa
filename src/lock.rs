use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Serialises sync operations per user. Different users never wait on each other.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the user's lock. It is held until the guard is dropped.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // drop entries nobody holds or waits on
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(user_id.to_string()).or_default().clone()
        };
        debug!(user_id, "waiting for user lock");
        lock.lock_owned().await
    }
}
