//! Minimal `Listing` CRUD — only what the Order State Machine needs to flip
//! `active<->rented` (§1 Non-goals: full catalog search/admin is out of scope).

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::ledger::money::Money;

#[derive(Deserialize)]
pub struct CreateListingRequest {
    pub algorithm: String,
    pub hashrate: f64,
    pub hashrate_unit: String,
    pub price_per_hour: String,
    pub min_hours: u32,
    pub max_hours: u32,
    pub region: String,
}

#[derive(Serialize, Clone)]
pub struct ListingResponse {
    pub id: String,
    pub seller_id: String,
    pub algorithm: String,
    pub hashrate: f64,
    pub hashrate_unit: String,
    pub price_per_hour: String,
    pub min_hours: u32,
    pub max_hours: u32,
    pub region: String,
    pub status: String,
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateListingRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    if req.min_hours == 0 || req.min_hours > req.max_hours {
        return Err(ApiError::BadRequest("invalid min_hours/max_hours window".into()));
    }
    let price: Money = req
        .price_per_hour
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid price_per_hour".into()))?;

    let id = Uuid::new_v4().to_string();
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    db.execute(
        "INSERT INTO listings (id, seller_id, algorithm, hashrate, hashrate_unit, price_per_hour, min_hours, max_hours, region, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active')",
        rusqlite::params![
            id,
            user.user_id,
            req.algorithm,
            req.hashrate,
            req.hashrate_unit,
            price.to_string(),
            req.min_hours,
            req.max_hours,
            req.region,
        ],
    )?;

    Ok(Json(ListingResponse {
        id,
        seller_id: user.user_id,
        algorithm: req.algorithm,
        hashrate: req.hashrate,
        hashrate_unit: req.hashrate_unit,
        price_per_hour: price.to_string(),
        min_hours: req.min_hours,
        max_hours: req.max_hours,
        region: req.region,
        status: "active".to_string(),
    }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub algorithm: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<ListingResponse>>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let mut stmt = db.prepare(
        "SELECT id, seller_id, algorithm, hashrate, hashrate_unit, price_per_hour, min_hours, max_hours, region, status
         FROM listings WHERE status = 'active' AND (?1 IS NULL OR algorithm = ?1)
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map([&q.algorithm], |row| {
        Ok(ListingResponse {
            id: row.get(0)?,
            seller_id: row.get(1)?,
            algorithm: row.get(2)?,
            hashrate: row.get(3)?,
            hashrate_unit: row.get(4)?,
            price_per_hour: row.get(5)?,
            min_hours: row.get::<_, i64>(6)? as u32,
            max_hours: row.get::<_, i64>(7)? as u32,
            region: row.get(8)?,
            status: row.get(9)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(Json(out))
}

pub async fn pause(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let seller_id: String = db
        .query_row("SELECT seller_id FROM listings WHERE id = ?1", [&id], |row| row.get(0))
        .map_err(|_| ApiError::NotFound(format!("listing '{id}' not found")))?;
    if seller_id != user.user_id {
        return Err(ApiError::Unauthorized("not the listing owner".into()));
    }

    db.execute(
        "UPDATE listings SET status = 'paused' WHERE id = ?1 AND status = 'active'",
        [&id],
    )?;

    Ok(Json(serde_json::json!({ "ok": true })))
}
