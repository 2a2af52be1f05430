use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};

use super::db::Db;
use super::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<RwLock<AppStateInner>>,
}

pub struct AppStateInner {
    pub data_dir: PathBuf,
    pub db: Db,
    pub auth_secret: String,
    pub order_events: HashMap<String, OrderEventChannel>,
    pub rate_limiter: RateLimiter,
}

/// One broadcast channel per order, for `/api/orders/{code}/events` SSE.
pub struct OrderEventChannel {
    pub tx: broadcast::Sender<OrderEvent>,
    pub log: Arc<Mutex<Vec<OrderEvent>>>,
}

impl OrderEventChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Connected { miner_ip: String },
    Active { started_at: i64, expected_end_at: i64 },
    Share { outcome: String, difficulty: f64 },
    Hashrate { hashrate: f64, unit: String, accuracy: f64 },
    HashrateLow { accuracy: f64 },
    Delivering { review_at: i64 },
    DisputeOpened { reason: String },
    Resolved { status: String, payout: String, refund: String },
    Disconnected { reason: String },
}

impl AppState {
    pub fn new(data_dir: PathBuf, db: Db, auth_secret: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AppStateInner {
                data_dir,
                db,
                auth_secret,
                order_events: HashMap::new(),
                rate_limiter: RateLimiter::new(),
            })),
        }
    }
}

impl AppStateInner {
    /// Publishes an event to the order's SSE channel, creating it lazily.
    /// Never blocks callers on subscriber backpressure (§4.6 "advisory").
    pub async fn publish_order_event(&mut self, order_code: &str, event: OrderEvent) {
        let channel = self
            .order_events
            .entry(order_code.to_string())
            .or_insert_with(OrderEventChannel::new);

        channel.log.lock().await.push(event.clone());
        let _ = channel.tx.send(event);
    }
}
