use std::sync::{Arc, RwLock};

use crate::models::AppConfig;

/// Shared, swappable pointer to the current configuration snapshot.
///
/// `current()` is what the dispatcher calls when a task starts; the returned
/// `Arc` is the task's config for its whole run, so a reload mid-task never
/// changes behaviour under a running worker.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<AppConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<AppConfig> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a freshly loaded snapshot. Tasks already running keep the
    /// snapshot they captured at dispatch.
    pub fn replace(&self, config: AppConfig) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_swaps_snapshot() {
        let handle = ConfigHandle::new(AppConfig::default());
        let before = handle.current();
        assert_eq!(before.processing.max_concurrent, 2);

        let mut updated = AppConfig::default();
        updated.processing.max_concurrent = 8;
        handle.replace(updated);

        assert_eq!(handle.current().processing.max_concurrent, 8);
        // The old snapshot is unchanged for anyone still holding it.
        assert_eq!(before.processing.max_concurrent, 2);
    }
}
