//! Hashrate & Share Accountant (§4.5): a sliding-window difficulty-weighted
//! estimator per session plus the 300s reporter that drains period counters
//! and forwards them to the control plane.

mod reporter;
mod window;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

pub use reporter::run_reporter;
pub use window::{largest_unit, unix_now, HashrateWindow};

/// Registry of live per-worker hashrate windows, keyed by worker id.
#[derive(Clone, Default)]
pub struct HashrateRegistry {
    windows: Arc<DashMap<String, Arc<Mutex<HashrateWindow>>>>,
    ordered: Arc<DashMap<String, f64>>,
}

impl HashrateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, worker_id: &str, ordered_hashrate: f64) {
        self.windows
            .entry(worker_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HashrateWindow::new())));
        self.ordered.insert(worker_id.to_string(), ordered_hashrate);
    }

    pub fn unregister(&self, worker_id: &str) {
        self.windows.remove(worker_id);
        self.ordered.remove(worker_id);
    }

    pub async fn record_accepted(&self, worker_id: &str, difficulty: f64) {
        if let Some(window) = self.windows.get(worker_id) {
            window.lock().await.record_accepted(difficulty, unix_now());
        }
    }

    pub async fn record_rejected(&self, worker_id: &str) {
        if let Some(window) = self.windows.get(worker_id) {
            window.lock().await.record_rejected();
        }
    }

    pub async fn instantaneous_hashrate(&self, worker_id: &str) -> f64 {
        match self.windows.get(worker_id) {
            Some(window) => window.lock().await.hashrate().unwrap_or(0.0),
            None => 0.0,
        }
    }

    fn worker_ids(&self) -> Vec<String> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }

    fn ordered_hashrate(&self, worker_id: &str) -> f64 {
        self.ordered.get(worker_id).map(|v| *v).unwrap_or(0.0)
    }

    async fn window(&self, worker_id: &str) -> Option<Arc<Mutex<HashrateWindow>>> {
        self.windows.get(worker_id).map(|e| e.clone())
    }
}

/// `accuracy = min(100, 100 * avg_hashrate / ordered_hashrate)` (§4.5).
pub fn accuracy(avg_hashrate: f64, ordered_hashrate: f64) -> f64 {
    if ordered_hashrate <= 0.0 {
        return 0.0;
    }
    (100.0 * avg_hashrate / ordered_hashrate).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_is_capped_at_100() {
        assert_eq!(accuracy(2_000_000.0, 1_000_000.0), 100.0);
    }

    #[test]
    fn accuracy_reflects_shortfall() {
        assert_eq!(accuracy(400_000.0, 1_000_000.0), 40.0);
    }

    #[test]
    fn accuracy_zero_ordered_is_zero() {
        assert_eq!(accuracy(100.0, 0.0), 0.0);
    }
}
