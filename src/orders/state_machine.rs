//! Order lifecycle (§4.2): `(none) -> paid -> active -> delivering -> {dispute} -> {completed|cancelled}`.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::ledger::money::{COMMISSION_RATE, Money};
use crate::ledger::{self, PLATFORM_USER_ID};
use crate::orders::code::generate_order_code;
use crate::orders::error::OrderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Paid,
    Active,
    Delivering,
    Dispute,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
            OrderStatus::Active => "active",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Dispute => "dispute",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    fn parse(s: &str) -> Result<Self, OrderError> {
        match s {
            "paid" => Ok(OrderStatus::Paid),
            "active" => Ok(OrderStatus::Active),
            "delivering" => Ok(OrderStatus::Delivering),
            "dispute" => Ok(OrderStatus::Dispute),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::Internal(format!("unknown order status {other}"))),
        }
    }
}

/// Destination pool tuple carried on an order (§3 "Order").
#[derive(Debug, Clone)]
pub struct PoolTarget {
    pub host: String,
    pub port: u16,
    pub wallet: String,
    pub worker: String,
    pub password: String,
    pub backup_host: Option<String>,
    pub backup_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub order_code: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub listing_id: String,
    pub algorithm: String,
    pub ordered_hashrate: f64,
    pub hours: u32,
    pub subtotal: Money,
    pub commission: Money,
    pub total_paid: Money,
    pub pool: PoolTarget,
    pub current_hashrate: f64,
    pub avg_hashrate: f64,
    pub accuracy: f64,
    pub accuracy_low: bool,
    pub shares_accepted: i64,
    pub shares_rejected: i64,
    pub last_share_at: Option<i64>,
    pub paid_at: i64,
    pub started_at: Option<i64>,
    pub expected_end_at: Option<i64>,
    pub review_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub status: OrderStatus,
    pub payout_amount: Option<Money>,
    pub refund_amount: Option<Money>,
    pub admin_action: Option<String>,
}

fn row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let status: String = row.get("status")?;
    let subtotal: String = row.get("subtotal")?;
    let commission: String = row.get("commission")?;
    let total_paid: String = row.get("total_paid")?;
    let payout_amount: Option<String> = row.get("payout_amount")?;
    let refund_amount: Option<String> = row.get("refund_amount")?;

    Ok(Order {
        id: row.get("id")?,
        order_code: row.get("order_code")?,
        buyer_id: row.get("buyer_id")?,
        seller_id: row.get("seller_id")?,
        listing_id: row.get("listing_id")?,
        algorithm: row.get("algorithm")?,
        ordered_hashrate: row.get("ordered_hashrate")?,
        hours: row.get::<_, i64>("hours")? as u32,
        subtotal: subtotal.parse().unwrap_or(Money::ZERO),
        commission: commission.parse().unwrap_or(Money::ZERO),
        total_paid: total_paid.parse().unwrap_or(Money::ZERO),
        pool: PoolTarget {
            host: row.get("pool_host")?,
            port: row.get::<_, i64>("pool_port")? as u16,
            wallet: row.get("pool_wallet")?,
            worker: row.get("pool_worker")?,
            password: row.get("pool_password")?,
            backup_host: row.get("backup_host")?,
            backup_port: row
                .get::<_, Option<i64>>("backup_port")?
                .map(|p| p as u16),
        },
        current_hashrate: row.get("current_hashrate")?,
        avg_hashrate: row.get("avg_hashrate")?,
        accuracy: row.get("accuracy")?,
        accuracy_low: row.get("accuracy_low")?,
        shares_accepted: row.get("shares_accepted")?,
        shares_rejected: row.get("shares_rejected")?,
        last_share_at: row.get("last_share_at")?,
        paid_at: row.get("paid_at")?,
        started_at: row.get("started_at")?,
        expected_end_at: row.get("expected_end_at")?,
        review_at: row.get("review_at")?,
        completed_at: row.get("completed_at")?,
        cancelled_at: row.get("cancelled_at")?,
        status: OrderStatus::parse(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        payout_amount: payout_amount.and_then(|s| s.parse().ok()),
        refund_amount: refund_amount.and_then(|s| s.parse().ok()),
        admin_action: row.get("admin_action")?,
    })
}

pub fn find_by_code(conn: &Connection, order_code: &str) -> Result<Option<Order>, OrderError> {
    conn.query_row(
        "SELECT * FROM orders WHERE order_code = ?1",
        [order_code],
        row_to_order,
    )
    .optional()
    .map_err(OrderError::from)
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Order>, OrderError> {
    conn.query_row("SELECT * FROM orders WHERE id = ?1", [id], row_to_order)
        .optional()
        .map_err(OrderError::from)
}

/// Input to `create` (§4.2 "create").
pub struct NewOrder<'a> {
    pub listing_id: &'a str,
    pub buyer_id: &'a str,
    pub hours: u32,
    pub pool: PoolTarget,
}

/// `(none) -> paid`. Validates the listing, locks escrow, inserts the
/// order, and flips the listing to `rented`, all in one transaction.
pub fn create(conn: &Connection, input: NewOrder, now: i64) -> Result<Order, OrderError> {
    let tx = conn.unchecked_transaction()?;

    let (seller_id, algorithm, hashrate, price_per_hour, min_hours, max_hours, listing_status): (
        String,
        String,
        f64,
        String,
        i64,
        i64,
        String,
    ) = tx
        .query_row(
            "SELECT seller_id, algorithm, hashrate, price_per_hour, min_hours, max_hours, status
             FROM listings WHERE id = ?1",
            [input.listing_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| OrderError::NotFound(input.listing_id.to_string()))?;

    if listing_status != "active" {
        return Err(OrderError::ListingNotActive);
    }
    if seller_id == input.buyer_id {
        return Err(OrderError::SelfRental);
    }
    if input.hours < min_hours as u32 || input.hours > max_hours as u32 {
        return Err(OrderError::HoursOutOfRange {
            hours: input.hours,
            min: min_hours as u32,
            max: max_hours as u32,
        });
    }

    let banned: bool = tx.query_row(
        "SELECT banned FROM users WHERE id = ?1",
        [input.buyer_id],
        |row| row.get(0),
    )?;
    if banned {
        return Err(OrderError::BuyerBanned);
    }

    let price_per_hour: Money = price_per_hour.parse().unwrap_or(Money::ZERO);
    let subtotal = price_per_hour.mul_rate(rust_decimal::Decimal::from(input.hours));
    let commission = subtotal.mul_rate(COMMISSION_RATE);
    let total_paid = subtotal + commission;

    ledger::lock_escrow(&tx, input.buyer_id, total_paid)?;

    let order_code = generate_order_code(&tx)?;
    let id = uuid::Uuid::new_v4().to_string();

    tx.execute(
        "INSERT INTO orders (
            id, order_code, buyer_id, seller_id, listing_id, algorithm, ordered_hashrate, hours,
            subtotal, commission, total_paid,
            pool_host, pool_port, pool_wallet, pool_worker, pool_password, backup_host, backup_port,
            current_hashrate, avg_hashrate, accuracy, accuracy_low, shares_accepted, shares_rejected, last_share_at,
            paid_at, started_at, expected_end_at, review_at, completed_at, cancelled_at,
            status, payout_amount, refund_amount, admin_action
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            0.0, 0.0, 0.0, 0, 0, 0, NULL,
            ?19, NULL, NULL, NULL, NULL, NULL,
            'paid', NULL, NULL, NULL
        )",
        params![
            id,
            order_code,
            input.buyer_id,
            seller_id,
            input.listing_id,
            algorithm,
            hashrate,
            input.hours as i64,
            subtotal.to_string(),
            commission.to_string(),
            total_paid.to_string(),
            input.pool.host,
            input.pool.port as i64,
            input.pool.wallet,
            input.pool.worker,
            input.pool.password,
            input.pool.backup_host,
            input.pool.backup_port.map(|p| p as i64),
            now,
        ],
    )?;

    tx.execute(
        "UPDATE listings SET status = 'rented' WHERE id = ?1",
        [input.listing_id],
    )?;

    tx.commit()?;

    find_by_id(conn, &id)?.ok_or_else(|| OrderError::Internal("order vanished after insert".into()))
}

/// `paid -> active` on the first matching `connect` event. Idempotent:
/// a repeated connect on an already-active order is a no-op (§8 R1).
pub fn on_connect(conn: &Connection, order_code: &str, now: i64) -> Result<Order, OrderError> {
    let order = find_by_code(conn, order_code)?
        .ok_or_else(|| OrderError::NotFound(order_code.to_string()))?;

    if order.status != OrderStatus::Paid {
        return Ok(order);
    }

    let expected_end_at = now + (order.hours as i64) * 3600;
    conn.execute(
        "UPDATE orders SET status = 'active', started_at = ?1, expected_end_at = ?2 WHERE id = ?3",
        params![now, expected_end_at, order.id],
    )?;

    find_by_id(conn, &order.id)?.ok_or_else(|| OrderError::NotFound(order.id))
}

/// `active -> delivering`, triggered by buyer confirm or `now >= expected_end_at`.
pub fn on_confirm_or_expire(conn: &Connection, order_id: &str, now: i64) -> Result<Order, OrderError> {
    let order = find_by_id(conn, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

    if order.status != OrderStatus::Active {
        return Err(OrderError::InvalidState {
            order: order_id.to_string(),
            actual: order.status.as_str().to_string(),
            expected: OrderStatus::Active.as_str().to_string(),
        });
    }

    conn.execute(
        "UPDATE orders SET status = 'delivering', review_at = ?1 WHERE id = ?2",
        params![now, order_id],
    )?;

    find_by_id(conn, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))
}

/// `active|delivering -> dispute`. A dispute opened against a terminal
/// order is rejected with `ORDER_TERMINAL` (§4.2 tie-break).
pub fn open_dispute(conn: &Connection, order_id: &str) -> Result<Order, OrderError> {
    let order = find_by_id(conn, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

    if order.status.is_terminal() {
        return Err(OrderError::OrderTerminal(order_id.to_string()));
    }
    if !matches!(order.status, OrderStatus::Active | OrderStatus::Delivering) {
        return Err(OrderError::InvalidState {
            order: order_id.to_string(),
            actual: order.status.as_str().to_string(),
            expected: "active|delivering".to_string(),
        });
    }

    conn.execute("UPDATE orders SET status = 'dispute' WHERE id = ?1", [order_id])?;
    find_by_id(conn, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))
}

/// Admin adjudication (§4.2 "dispute|delivering -> completed|cancelled").
#[derive(Debug, Clone, Copy)]
pub enum AdminAction {
    Approve,
    Reject,
    Partial(u8),
}

impl AdminAction {
    fn label(self) -> String {
        match self {
            AdminAction::Approve => "approve".to_string(),
            AdminAction::Reject => "reject".to_string(),
            AdminAction::Partial(p) => format!("partial({p})"),
        }
    }
}

/// `payout = round₂(subtotal × pct/100)`, `refund = total_paid − payout`,
/// `commission = round₂(payout × 0.03)` — satisfies `payout + refund ==
/// total_paid` by construction, which is what `release_escrow` requires.
fn settlement_split(order: &Order, pct: u8) -> (Money, Money, Money) {
    let payout = order.subtotal.mul_rate(rust_decimal::Decimal::new(pct as i64, 2));
    let refund = order.total_paid - payout;
    let commission = payout.mul_rate(COMMISSION_RATE);
    (payout, refund, commission)
}

/// `dispute|delivering -> completed|cancelled`. Invokes `release_escrow`
/// exactly once (§8 P2); a repeated call on an already-terminal order
/// returns the cached outcome instead of re-settling.
pub fn resolve(conn: &Connection, order_id: &str, action: AdminAction, now: i64) -> Result<Order, OrderError> {
    let order = find_by_id(conn, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

    if order.status.is_terminal() {
        // Idempotent terminal action: return the cached outcome rather than erroring.
        return Ok(order);
    }
    if !matches!(order.status, OrderStatus::Dispute | OrderStatus::Delivering) {
        return Err(OrderError::InvalidState {
            order: order_id.to_string(),
            actual: order.status.as_str().to_string(),
            expected: "dispute|delivering".to_string(),
        });
    }

    // Approve is the pct=100 case of partial; deriving both through the same
    // formula is what keeps `payout + refund == total_paid` (§8 B2:
    // partial(100%) must equal approve).
    let (payout, refund, commission, final_status) = match action {
        AdminAction::Approve => {
            let (payout, refund, commission) = settlement_split(&order, 100);
            (payout, refund, commission, OrderStatus::Completed)
        }
        AdminAction::Reject => (Money::ZERO, order.total_paid, Money::ZERO, OrderStatus::Cancelled),
        AdminAction::Partial(pct) => {
            let (payout, refund, commission) = settlement_split(&order, pct);
            (payout, refund, commission, OrderStatus::Completed)
        }
    };

    let tx = conn.unchecked_transaction()?;

    ledger::release_escrow(
        &tx,
        &order.id,
        &order.buyer_id,
        &order.seller_id,
        order.total_paid,
        payout,
        refund,
        commission,
    )?;

    let (completed_at, cancelled_at) = match final_status {
        OrderStatus::Completed => (Some(now), None::<i64>),
        OrderStatus::Cancelled => (None::<i64>, Some(now)),
        _ => (None, None),
    };

    tx.execute(
        "UPDATE orders SET
            status = ?1, payout_amount = ?2, refund_amount = ?3, admin_action = ?4,
            completed_at = ?5, cancelled_at = ?6
         WHERE id = ?7",
        params![
            final_status.as_str(),
            payout.to_string(),
            refund.to_string(),
            action.label(),
            completed_at,
            cancelled_at,
            order.id,
        ],
    )?;

    tx.execute(
        "UPDATE listings SET status = 'active' WHERE id = ?1",
        [&order.listing_id],
    )?;

    tx.commit()?;

    find_by_id(conn, &order.id)?.ok_or_else(|| OrderError::NotFound(order.id))
}

/// §4.7 review queue: `delivering ∧ review_at≠null` or `active ∧ expected_end_at<now`.
pub fn review_queue(conn: &Connection, now: i64) -> Result<Vec<Order>, OrderError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM orders WHERE
            (status = 'delivering' AND review_at IS NOT NULL)
            OR (status = 'active' AND expected_end_at IS NOT NULL AND expected_end_at < ?1)
            OR status = 'dispute'
         ORDER BY (status = 'dispute') DESC, review_at ASC",
    )?;
    let rows = stmt.query_map([now], row_to_order)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[allow(dead_code)]
pub const PLATFORM_ACCOUNT: &str = PLATFORM_USER_ID;
