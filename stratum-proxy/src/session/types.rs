use std::time::Instant;

use uuid::Uuid;

use crate::control_client::OrderForWorker;

/// State a proxy connection carries for the lifetime of a TCP session.
///
/// Modeled on the pool-side connection record of the reference Stratum
/// server: one entry per authorized worker, replaced wholesale whenever
/// the miner reconnects.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    /// The order code, i.e. the Stratum login worker id (§4.3).
    pub worker_id: String,
    pub order_id: String,
    pub algorithm: String,
    pub pool_host: String,
    pub pool_port: u16,
    pub pool_wallet: String,
    pub pool_worker: String,
    pub pool_password: String,
    pub miner_ip: String,
    pub connected_at: Instant,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
}

impl SessionHandle {
    pub fn from_order(worker_id: String, order: OrderForWorker, miner_ip: String) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            worker_id,
            order_id: order.order_id,
            algorithm: order.algorithm,
            pool_host: order.pool_host,
            pool_port: order.pool_port,
            pool_wallet: order.pool_wallet,
            pool_worker: order.pool_worker,
            pool_password: order.pool_password,
            miner_ip,
            connected_at: Instant::now(),
            shares_accepted: 0,
            shares_rejected: 0,
        }
    }
}
