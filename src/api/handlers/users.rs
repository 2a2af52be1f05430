use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth;
use crate::api::error::ApiError;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub wallet_address: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub ok: bool,
    pub wallet_address: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let wallet_address = req.wallet_address.to_lowercase();
    if wallet_address.len() < 8 {
        return Err(ApiError::BadRequest("wallet_address is too short".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }

    let password_hash = auth::hash_password(&req.password)
        .map_err(|e| ApiError::Internal(format!("{e:#}")))?;
    let user_id = Uuid::new_v4().to_string();

    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let existing: Option<String> = db
        .query_row(
            "SELECT id FROM users WHERE wallet_address = ?1",
            [&wallet_address],
            |row| row.get(0),
        )
        .ok();
    if existing.is_some() {
        return Err(ApiError::Conflict("wallet_address already registered".into()));
    }

    db.execute(
        "INSERT INTO users (id, wallet_address, password_hash) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, wallet_address, password_hash],
    )?;

    Ok(Json(RegisterResponse {
        ok: true,
        wallet_address,
    }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub wallet_address: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginUser {
    pub id: String,
    pub wallet_address: String,
    pub is_admin: bool,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let wallet_address = req.wallet_address.to_lowercase();
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let row: Option<(String, String, Option<String>, bool)> = db
        .query_row(
            "SELECT id, wallet_address, password_hash, is_admin FROM users WHERE wallet_address = ?1",
            [&wallet_address],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .ok();

    let (user_id, wallet_address, password_hash, is_admin) =
        row.ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;
    let password_hash =
        password_hash.ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;

    if !auth::verify_password(&req.password, &password_hash) {
        return Err(ApiError::Unauthorized("invalid credentials".into()));
    }

    let token = auth::create_jwt(&user_id, is_admin, &inner.auth_secret)
        .map_err(|e| ApiError::Internal(format!("jwt: {e:#}")))?;

    Ok(Json(LoginResponse {
        token,
        user: LoginUser {
            id: user_id,
            wallet_address,
            is_admin,
        },
    }))
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub available: String,
    pub escrow: String,
    pub pending: String,
}

pub async fn balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let inner = state.inner.read().await;
    let db = inner.db.lock().await;

    let (available, escrow, pending): (String, String, String) = db
        .query_row(
            "SELECT available, escrow, pending FROM users WHERE id = ?1",
            [&user.user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(|_| ApiError::NotFound("user not found".into()))?;

    Ok(Json(BalanceResponse {
        available,
        escrow,
        pending,
    }))
}
