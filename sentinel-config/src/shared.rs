use std::sync::Arc;
use std::sync::RwLock;

use tracing::info;

use crate::model::Config;
use crate::validation::{self, ConfigError};

/// A hot-reloadable configuration snapshot.
///
/// Readers take an `Arc<Config>` clone of the current snapshot; a
/// `reload()` call validates a new snapshot and swaps it in atomically
/// under the lock, so in-flight readers keep their own consistent view.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current snapshot. Cheap: one `Arc` clone under a read lock.
    pub fn current(&self) -> Arc<Config> {
        Arc::clone(&self.inner.read().expect("config lock poisoned"))
    }

    /// Validate `next` and, if it passes, swap it in as the current
    /// snapshot. Rejected snapshots leave the old one in place.
    pub fn reload(&self, next: Config) -> Result<(), ConfigError> {
        validation::validate(&next)?;
        let mut guard = self.inner.write().expect("config lock poisoned");
        *guard = Arc::new(next);
        info!("configuration reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_swaps_snapshot() {
        let shared = SharedConfig::new(Config::default());
        let before = shared.current();
        assert_eq!(before.core.worker_threads, 4);

        let mut next = Config::default();
        next.core.worker_threads = 16;
        shared.reload(next).expect("valid reload");

        let after = shared.current();
        assert_eq!(after.core.worker_threads, 16);
        assert_eq!(before.core.worker_threads, 4, "old Arc is untouched");
    }

    #[test]
    fn invalid_reload_is_rejected_and_keeps_old_snapshot() {
        let shared = SharedConfig::new(Config::default());
        let mut bad = Config::default();
        bad.core.worker_threads = 0;

        assert!(shared.reload(bad).is_err());
        assert_eq!(shared.current().core.worker_threads, 4);
    }
}
