//! Control-Plane Ingress (§4.6) — the five endpoints the Stratum proxy
//! consumes. Internal surface; reached only by `stratum-proxy::control_client`.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::{AppState, OrderEvent};
use crate::orders::{self, OrderStatus};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Serialize)]
pub struct OrderForWorker {
    pub order_id: String,
    pub status: String,
    pub algorithm: String,
    pub hours: u32,
    pub ordered_hashrate: f64,
    pub pool_host: String,
    pub pool_port: u16,
    pub pool_wallet: String,
    pub pool_worker: String,
    pub pool_password: String,
    pub backup_host: Option<String>,
    pub backup_port: Option<u16>,
}

pub async fn get_order_by_worker(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> Result<Json<OrderForWorker>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let order = orders::state_machine::find_by_code(&db, &worker_id)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND".into()))?;

    if !matches!(order.status, OrderStatus::Paid | OrderStatus::Active) {
        return Err(ApiError::NotFound("NOT_FOUND".into()));
    }

    Ok(Json(OrderForWorker {
        order_id: order.id,
        status: order.status.as_str().to_string(),
        algorithm: order.algorithm,
        hours: order.hours,
        ordered_hashrate: order.ordered_hashrate,
        pool_host: order.pool.host,
        pool_port: order.pool.port,
        pool_wallet: order.pool.wallet,
        pool_worker: order.pool.worker,
        pool_password: order.pool.password,
        backup_host: order.pool.backup_host,
        backup_port: order.pool.backup_port,
    }))
}

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub worker_id: String,
    pub miner_ip: String,
    pub user_agent: String,
}

/// Idempotent per session (§4.6): a repeated connect on an already-active
/// order is a no-op in the state machine, but we always record the session row.
pub async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut inner = state.inner.write().await;
    let db = inner.db.lock().await;

    let order = orders::state_machine::on_connect(&db, &req.worker_id, now())?;

    db.execute(
        "INSERT INTO proxy_sessions (id, order_id, miner_ip, user_agent, target_host, target_port, connected_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'connected')",
        rusqlite::params![
            uuid::Uuid::new_v4().to_string(),
            order.id,
            req.miner_ip,
            req.user_agent,
            order.pool.host,
            order.pool.port as i64,
            now(),
        ],
    )?;
    drop(db);

    inner
        .publish_order_event(&req.worker_id, OrderEvent::Connected { miner_ip: req.miner_ip })
        .await;
    if let (Some(started), Some(end)) = (order.started_at, order.expected_end_at) {
        inner
            .publish_order_event(
                &req.worker_id,
                OrderEvent::Active {
                    started_at: started,
                    expected_end_at: end,
                },
            )
            .await;
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ShareRequest {
    pub worker_id: String,
    pub outcome: String, // accepted | rejected | stale
    pub difficulty: f64,
    pub instantaneous_hashrate: f64,
}

pub async fn share(
    State(state): State<AppState>,
    Json(req): Json<ShareRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut inner = state.inner.write().await;
    let db = inner.db.lock().await;

    let order = orders::state_machine::find_by_code(&db, &req.worker_id)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND".into()))?;

    db.execute(
        "INSERT INTO share_log (id, order_id, session_id, outcome, difficulty, derived_hashrate)
         VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
        rusqlite::params![
            uuid::Uuid::new_v4().to_string(),
            order.id,
            req.outcome,
            req.difficulty,
            req.instantaneous_hashrate,
        ],
    )?;

    if req.outcome == "accepted" {
        db.execute(
            "UPDATE orders SET shares_accepted = shares_accepted + 1, current_hashrate = ?1, last_share_at = ?2 WHERE id = ?3",
            rusqlite::params![req.instantaneous_hashrate, now(), order.id],
        )?;
    } else if req.outcome == "rejected" {
        db.execute(
            "UPDATE orders SET shares_rejected = shares_rejected + 1 WHERE id = ?1",
            [&order.id],
        )?;
    }
    drop(db);

    inner
        .publish_order_event(
            &req.worker_id,
            OrderEvent::Share {
                outcome: req.outcome,
                difficulty: req.difficulty,
            },
        )
        .await;

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct HashrateRequest {
    pub worker_id: String,
    pub hashrate: f64,
    pub unit: String,
    pub accepted: i64,
    pub rejected: i64,
}

pub async fn hashrate(
    State(state): State<AppState>,
    Json(req): Json<HashrateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut inner = state.inner.write().await;
    let db = inner.db.lock().await;

    let order = orders::state_machine::find_by_code(&db, &req.worker_id)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND".into()))?;

    db.execute(
        "INSERT INTO hashrate_snapshots (id, order_id, hashrate, unit, accepted, rejected)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            uuid::Uuid::new_v4().to_string(),
            order.id,
            req.hashrate,
            req.unit,
            req.accepted,
            req.rejected,
        ],
    )?;

    // avg_hashrate is a simple exponential blend with the previous reading.
    let avg_hashrate = if order.avg_hashrate <= 0.0 {
        req.hashrate
    } else {
        0.5 * order.avg_hashrate + 0.5 * req.hashrate
    };
    let accuracy = if order.ordered_hashrate > 0.0 {
        (100.0 * avg_hashrate / order.ordered_hashrate).min(100.0)
    } else {
        0.0
    };

    // Below-threshold is an edge-triggered event (§8 S6): publish only on the
    // false->true transition, and clear the flag once accuracy recovers.
    let accuracy_low = accuracy < 50.0;

    db.execute(
        "UPDATE orders SET avg_hashrate = ?1, accuracy = ?2, accuracy_low = ?3 WHERE id = ?4",
        rusqlite::params![avg_hashrate, accuracy, accuracy_low, order.id],
    )?;
    drop(db);

    inner
        .publish_order_event(
            &req.worker_id,
            OrderEvent::Hashrate {
                hashrate: req.hashrate,
                unit: req.unit,
                accuracy,
            },
        )
        .await;

    if accuracy_low && !order.accuracy_low {
        inner
            .publish_order_event(&req.worker_id, OrderEvent::HashrateLow { accuracy })
            .await;
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct DisconnectRequest {
    pub worker_id: String,
    pub reason: String,
}

/// Terminal for a session; idempotent at the ingress (§5 "Cancellation").
pub async fn disconnect(
    State(state): State<AppState>,
    Json(req): Json<DisconnectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut inner = state.inner.write().await;
    let db = inner.db.lock().await;

    if let Some(order) = orders::state_machine::find_by_code(&db, &req.worker_id)? {
        db.execute(
            "UPDATE proxy_sessions SET status = 'disconnected', disconnected_at = ?1
             WHERE order_id = ?2 AND disconnected_at IS NULL",
            rusqlite::params![now(), order.id],
        )?;
    }
    drop(db);

    inner
        .publish_order_event(&req.worker_id, OrderEvent::Disconnected { reason: req.reason })
        .await;

    Ok(Json(serde_json::json!({ "ok": true })))
}
