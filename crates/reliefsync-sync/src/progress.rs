//! Progress publishing
//!
//! Syncers publish a [`ProgressStats`] snapshot after every page. Observers
//! hold a `watch::Receiver` and only ever see the latest snapshot.

use std::sync::Arc;

use tokio::sync::watch;

use reliefsync_core::domain::ProgressStats;

#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    tx: Arc<watch::Sender<ProgressStats>>,
}

impl ProgressPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressStats::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressStats> {
        self.tx.subscribe()
    }

    /// Replace the current snapshot; succeeds with or without receivers
    pub fn publish(&self, stats: ProgressStats) {
        tracing::trace!(
            name = %stats.name,
            pulled = stats.pulled_count,
            total = stats.total_count,
            "Progress"
        );
        self.tx.send_replace(stats);
    }

    pub fn current(&self) -> ProgressStats {
        self.tx.borrow().clone()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new()
    }
}
