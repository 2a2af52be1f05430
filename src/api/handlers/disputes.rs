use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use super::orders::OrderResponse;
use crate::api::error::ApiError;
use crate::api::middleware::{AdminUser, AuthUser};
use crate::api::state::AppState;
use crate::dispute::{self, DisputeReason};
use crate::orders::{self, AdminAction};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Deserialize)]
pub struct OpenDisputeRequest {
    pub reason: String,
}

pub async fn open(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_code): Path<String>,
    Json(req): Json<OpenDisputeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reason = DisputeReason::parse(&req.reason)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown dispute reason '{}'", req.reason)))?;

    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let order = orders::state_machine::find_by_code(&db, &order_code)?
        .ok_or_else(|| ApiError::NotFound(format!("order '{order_code}' not found")))?;
    if order.buyer_id != user.user_id && order.seller_id != user.user_id {
        return Err(ApiError::Unauthorized("not a party to this order".into()));
    }

    let d = dispute::open(&db, &order.id, &user.user_id, reason, now())?;
    Ok(Json(serde_json::json!({ "dispute_id": d.id, "order_status": "dispute" })))
}

/// Admin queue view (§4.7): orders pending review or dispute.
pub async fn queue(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;
    let orders = dispute::queue(&db, now())?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    /// "approve" | "reject" | "partial"
    pub action: String,
    /// required when action == "partial"
    pub percent: Option<u8>,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub dispute_id: String,
    pub order: OrderResponse,
}

/// Resolves a dispute through the same settlement primitive as every other
/// terminal path (§4.7, §8 P2). Fails with `DISPUTE_INVALID_STATE` unless
/// the order is currently in `dispute`.
pub async fn resolve(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(dispute_id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let action = match req.action.as_str() {
        "approve" => AdminAction::Approve,
        "reject" => AdminAction::Reject,
        "partial" => {
            let pct = req
                .percent
                .ok_or_else(|| ApiError::BadRequest("percent is required for partial".into()))?;
            if pct > 100 {
                return Err(ApiError::BadRequest("percent must be <= 100".into()));
            }
            AdminAction::Partial(pct)
        }
        other => return Err(ApiError::BadRequest(format!("unknown action '{other}'"))),
    };
    let label = match &action {
        AdminAction::Approve => "approve".to_string(),
        AdminAction::Reject => "reject".to_string(),
        AdminAction::Partial(p) => format!("partial({p})"),
    };

    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let (dispute, order) = dispute::resolve(&db, &dispute_id, &admin.user_id, action, &label, now())?;

    Ok(Json(ResolveResponse {
        dispute_id: dispute.id,
        order: order.into(),
    }))
}
