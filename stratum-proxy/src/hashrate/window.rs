use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

const WINDOW_SECS: f64 = 300.0;
/// Scales accepted-share difficulty into hashes-per-share (§4.5).
const DIFFICULTY_SHARE_CONST: f64 = 4_294_967_296.0; // 2^32

pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs_f64()
}

/// A 5-minute deque of `(timestamp, difficulty)` for accepted shares plus
/// the period accepted/rejected counters, both per §4.5.
#[derive(Default)]
pub struct HashrateWindow {
    accepted: VecDeque<(f64, f64)>,
    period_accepted: u64,
    period_rejected: u64,
}

impl HashrateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&mut self, difficulty: f64, now: f64) {
        self.accepted.push_back((now, difficulty));
        self.period_accepted += 1;
        self.evict(now);
    }

    pub fn record_rejected(&mut self) {
        self.period_rejected += 1;
    }

    fn evict(&mut self, now: f64) {
        while let Some(&(ts, _)) = self.accepted.front() {
            if now - ts > WINDOW_SECS {
                self.accepted.pop_front();
            } else {
                break;
            }
        }
    }

    /// `None` until at least two accepted shares are in the window.
    pub fn hashrate(&self) -> Option<f64> {
        if self.accepted.len() < 2 {
            return None;
        }
        let t_first = self.accepted.front()?.0;
        let t_last = self.accepted.back()?.0;
        let elapsed = t_last - t_first;
        if elapsed <= 0.0 {
            return None;
        }
        let sum_difficulty: f64 = self.accepted.iter().map(|(_, d)| d).sum();
        Some(sum_difficulty * DIFFICULTY_SHARE_CONST / elapsed)
    }

    /// Reads and resets the period counters; called once per reporter tick.
    pub fn take_period_counters(&mut self) -> (u64, u64) {
        let counters = (self.period_accepted, self.period_rejected);
        self.period_accepted = 0;
        self.period_rejected = 0;
        counters
    }
}

/// Picks the largest unit among H/KH/MH/GH/TH/PH per second for display;
/// the wire value stays raw H/s (§4.5).
pub fn largest_unit(hashrate_hs: f64) -> (f64, &'static str) {
    const UNITS: [(&str, f64); 6] = [
        ("PH", 1e15),
        ("TH", 1e12),
        ("GH", 1e9),
        ("MH", 1e6),
        ("KH", 1e3),
        ("H", 1.0),
    ];
    for (name, scale) in UNITS {
        if hashrate_hs >= scale {
            return (hashrate_hs / scale, name);
        }
    }
    (hashrate_hs, "H")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_until_two_points() {
        let mut w = HashrateWindow::new();
        assert!(w.hashrate().is_none());
        w.record_accepted(1_000_000.0, 100.0);
        assert!(w.hashrate().is_none());
    }

    #[test]
    fn computes_rate_from_two_points() {
        let mut w = HashrateWindow::new();
        w.record_accepted(1.0, 0.0);
        w.record_accepted(1.0, 10.0);
        let rate = w.hashrate().unwrap();
        assert!((rate - (2.0 * DIFFICULTY_SHARE_CONST / 10.0)).abs() < 1.0);
    }

    #[test]
    fn evicts_points_outside_window() {
        let mut w = HashrateWindow::new();
        w.record_accepted(1.0, 0.0);
        w.record_accepted(1.0, 301.0);
        // the first point is now more than 300s behind the second
        assert_eq!(w.accepted.len(), 1);
    }

    #[test]
    fn period_counters_reset_on_read() {
        let mut w = HashrateWindow::new();
        w.record_accepted(1.0, 0.0);
        w.record_rejected();
        assert_eq!(w.take_period_counters(), (1, 1));
        assert_eq!(w.take_period_counters(), (0, 0));
    }

    #[test]
    fn largest_unit_picks_sensible_scale() {
        assert_eq!(largest_unit(500.0).1, "H");
        assert_eq!(largest_unit(1_500.0).1, "KH");
        assert_eq!(largest_unit(2.5e12).1, "TH");
    }
}
