//! Proxy Session Store (§4.3): a concurrent map from worker id to the
//! live connection state a miner is currently attached with.
//!
//! `DashMap` gives every connection task O(1) lookup/insert/remove without
//! a single global lock serializing every worker's handshake, the same
//! shape as a sharded subscription table fed by many concurrent readers
//! and writers.

mod types;

use std::sync::Arc;

use dashmap::DashMap;

pub use types::SessionHandle;

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<DashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.inner.insert(handle.worker_id.clone(), handle);
    }

    pub fn get(&self, worker_id: &str) -> Option<SessionHandle> {
        self.inner.get(worker_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, worker_id: &str) {
        self.inner.remove(worker_id);
    }

    pub fn record_share(&self, worker_id: &str, accepted: bool) {
        if let Some(mut entry) = self.inner.get_mut(worker_id) {
            if accepted {
                entry.shares_accepted += 1;
            } else {
                entry.shares_rejected += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn all_worker_ids(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_client::OrderForWorker;

    fn sample_order() -> OrderForWorker {
        OrderForWorker {
            order_id: "ord-1".into(),
            status: "active".into(),
            algorithm: "sha256".into(),
            hours: 4,
            ordered_hashrate: 100.0,
            pool_host: "pool.example.com".into(),
            pool_port: 3333,
            pool_wallet: "bc1qxyz".into(),
            pool_worker: "hb_ord_abc12345".into(),
            pool_password: "x".into(),
            backup_host: None,
            backup_port: None,
        }
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let handle = SessionHandle::from_order("hb_ord_abc12345".into(), sample_order(), "1.2.3.4".into());
        store.insert(handle);
        assert_eq!(store.len(), 1);

        let fetched = store.get("hb_ord_abc12345").expect("present");
        assert_eq!(fetched.order_id, "ord-1");

        store.remove("hb_ord_abc12345");
        assert!(store.is_empty());
    }

    #[test]
    fn record_share_updates_counters() {
        let store = SessionStore::new();
        store.insert(SessionHandle::from_order(
            "hb_ord_abc12345".into(),
            sample_order(),
            "1.2.3.4".into(),
        ));

        store.record_share("hb_ord_abc12345", true);
        store.record_share("hb_ord_abc12345", false);
        store.record_share("hb_ord_abc12345", true);

        let handle = store.get("hb_ord_abc12345").unwrap();
        assert_eq!(handle.shares_accepted, 2);
        assert_eq!(handle.shares_rejected, 1);
    }

    #[test]
    fn unknown_worker_lookup_is_none() {
        let store = SessionStore::new();
        assert!(store.get("no_such_worker").is_none());
    }
}
