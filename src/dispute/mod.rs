//! Review & Dispute Controller (§4.7).

use rusqlite::{Connection, OptionalExtension, params};

use crate::orders::error::OrderError;
use crate::orders::state_machine::{self, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeReason {
    LowHashrate,
    Offline,
    WrongPool,
    WrongWallet,
    Other,
}

impl DisputeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisputeReason::LowHashrate => "low_hashrate",
            DisputeReason::Offline => "offline",
            DisputeReason::WrongPool => "wrong_pool",
            DisputeReason::WrongWallet => "wrong_wallet",
            DisputeReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "low_hashrate" => DisputeReason::LowHashrate,
            "offline" => DisputeReason::Offline,
            "wrong_pool" => DisputeReason::WrongPool,
            "wrong_wallet" => DisputeReason::WrongWallet,
            "other" => DisputeReason::Other,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Dispute {
    pub id: String,
    pub order_id: String,
    pub opener: String,
    pub reason: String,
    pub telemetry: String,
    pub resolution: Option<String>,
    pub resolver_id: Option<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

/// Opens a dispute: transitions the order to `dispute` and captures a
/// telemetry snapshot (§3 "Dispute", §4.2 "active|delivering -> dispute").
pub fn open(
    conn: &Connection,
    order_id: &str,
    opener: &str,
    reason: DisputeReason,
    now: i64,
) -> Result<Dispute, OrderError> {
    let tx = conn.unchecked_transaction()?;

    let order = state_machine::open_dispute(&tx, order_id)?;

    let telemetry = serde_json::json!({
        "current_hashrate": order.current_hashrate,
        "avg_hashrate": order.avg_hashrate,
        "accuracy": order.accuracy,
        "shares_accepted": order.shares_accepted,
        "shares_rejected": order.shares_rejected,
        "last_share_at": order.last_share_at,
    })
    .to_string();

    let id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO disputes (id, order_id, opener, reason, telemetry, resolution, resolver_id, created_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, NULL)",
        params![id, order_id, opener, reason.as_str(), telemetry, now],
    )?;

    tx.commit()?;
    find_by_id(conn, &id)?.ok_or_else(|| OrderError::Internal("dispute vanished after insert".into()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Dispute>, OrderError> {
    conn.query_row(
        "SELECT id, order_id, opener, reason, telemetry, resolution, resolver_id, created_at, resolved_at
         FROM disputes WHERE id = ?1",
        [id],
        |row| {
            Ok(Dispute {
                id: row.get(0)?,
                order_id: row.get(1)?,
                opener: row.get(2)?,
                reason: row.get(3)?,
                telemetry: row.get(4)?,
                resolution: row.get(5)?,
                resolver_id: row.get(6)?,
                created_at: row.get(7)?,
                resolved_at: row.get(8)?,
            })
        },
    )
    .optional()
    .map_err(OrderError::from)
}

/// Resolves a dispute through the order state machine's `resolve`
/// primitive, which is the sole caller of `release_escrow` (§4.7, §8 P2).
/// Fails with `DISPUTE_INVALID_STATE` unless the order is currently in
/// `dispute`.
pub fn resolve(
    conn: &Connection,
    dispute_id: &str,
    resolver_id: &str,
    action: state_machine::AdminAction,
    resolution_label: &str,
    now: i64,
) -> Result<(Dispute, state_machine::Order), OrderError> {
    let dispute = find_by_id(conn, dispute_id)?
        .ok_or_else(|| OrderError::NotFound(dispute_id.to_string()))?;

    let tx = conn.unchecked_transaction()?;

    let order = state_machine::find_by_id(&tx, &dispute.order_id)?
        .ok_or_else(|| OrderError::NotFound(dispute.order_id.clone()))?;
    if order.status != OrderStatus::Dispute {
        return Err(OrderError::DisputeInvalidState);
    }

    let resolved_order = state_machine::resolve(&tx, &dispute.order_id, action, now)?;

    tx.execute(
        "UPDATE disputes SET resolution = ?1, resolver_id = ?2, resolved_at = ?3 WHERE id = ?4",
        params![resolution_label, resolver_id, now, dispute_id],
    )?;

    tx.commit()?;

    let dispute = find_by_id(conn, dispute_id)?.ok_or_else(|| OrderError::NotFound(dispute_id.to_string()))?;
    Ok((dispute, resolved_order))
}

/// §4.7 queue: delegates to the order state machine's combined view.
pub fn queue(conn: &Connection, now: i64) -> Result<Vec<state_machine::Order>, OrderError> {
    state_machine::review_queue(conn, now)
}
