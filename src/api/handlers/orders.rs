use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::orders::{self, NewOrder, Order, PoolTarget};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_code: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub listing_id: String,
    pub algorithm: String,
    pub hours: u32,
    pub subtotal: String,
    pub commission: String,
    pub total_paid: String,
    pub current_hashrate: f64,
    pub avg_hashrate: f64,
    pub accuracy: f64,
    pub shares_accepted: i64,
    pub shares_rejected: i64,
    pub status: String,
    pub started_at: Option<i64>,
    pub expected_end_at: Option<i64>,
    pub payout_amount: Option<String>,
    pub refund_amount: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        OrderResponse {
            id: o.id,
            order_code: o.order_code,
            buyer_id: o.buyer_id,
            seller_id: o.seller_id,
            listing_id: o.listing_id,
            algorithm: o.algorithm,
            hours: o.hours,
            subtotal: o.subtotal.to_string(),
            commission: o.commission.to_string(),
            total_paid: o.total_paid.to_string(),
            current_hashrate: o.current_hashrate,
            avg_hashrate: o.avg_hashrate,
            accuracy: o.accuracy,
            shares_accepted: o.shares_accepted,
            shares_rejected: o.shares_rejected,
            status: o.status.as_str().to_string(),
            started_at: o.started_at,
            expected_end_at: o.expected_end_at,
            payout_amount: o.payout_amount.map(|m| m.to_string()),
            refund_amount: o.refund_amount.map(|m| m.to_string()),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub listing_id: String,
    pub hours: u32,
    pub pool_host: String,
    pub pool_port: u16,
    pub pool_wallet: String,
    pub pool_worker: String,
    pub pool_password: String,
    pub backup_host: Option<String>,
    pub backup_port: Option<u16>,
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let inner = state.inner.read().await;
    inner
        .rate_limiter
        .check(&user.user_id)
        .await
        .map_err(|retry| ApiError::RateLimited(format!("retry after {retry}s")))?;
    let db = inner.db.lock().await;

    let order = orders::state_machine::create(
        &db,
        NewOrder {
            listing_id: &req.listing_id,
            buyer_id: &user.user_id,
            hours: req.hours,
            pool: PoolTarget {
                host: req.pool_host,
                port: req.pool_port,
                wallet: req.pool_wallet,
                worker: req.pool_worker,
                password: req.pool_password,
                backup_host: req.backup_host,
                backup_port: req.backup_port,
            },
        },
        now(),
    )?;

    Ok(Json(order.into()))
}

pub async fn get(
    State(state): State<AppState>,
    Path(order_code): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;
    let order = orders::state_machine::find_by_code(&db, &order_code)?
        .ok_or_else(|| ApiError::NotFound(format!("order '{order_code}' not found")))?;
    Ok(Json(order.into()))
}

pub async fn confirm(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_code): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let order = orders::state_machine::find_by_code(&db, &order_code)?
        .ok_or_else(|| ApiError::NotFound(format!("order '{order_code}' not found")))?;
    if order.buyer_id != user.user_id {
        return Err(ApiError::Unauthorized("not the order's buyer".into()));
    }

    let order = orders::state_machine::on_confirm_or_expire(&db, &order.id, now())?;
    Ok(Json(order.into()))
}
