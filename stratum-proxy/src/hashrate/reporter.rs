use std::time::Duration;

use crate::control_client::ControlClient;

use super::{accuracy, largest_unit, HashrateRegistry};

/// Runs forever, draining every live session's period counters every
/// `interval_secs` and forwarding hashrate + counters to the control plane
/// (§4.5 "A reporter runs every 300s across all live sessions").
pub async fn run_reporter(registry: HashrateRegistry, control: ControlClient, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        ticker.tick().await;

        for worker_id in registry.worker_ids() {
            let Some(window) = registry.window(&worker_id).await else {
                continue;
            };
            let (hashrate_hs, accepted, rejected) = {
                let mut window = window.lock().await;
                let rate = window.hashrate().unwrap_or(0.0);
                let (accepted, rejected) = window.take_period_counters();
                (rate, accepted, rejected)
            };

            let ordered = registry.ordered_hashrate(&worker_id);
            let acc = accuracy(hashrate_hs, ordered);
            let (_display_value, unit) = largest_unit(hashrate_hs);

            control
                .hashrate(&worker_id, hashrate_hs, unit, accepted as i64, rejected as i64)
                .await;

            tracing::debug!(worker_id, hashrate_hs, accuracy = acc, "hashrate report");
        }
    }
}
