//! Ledger & Escrow Engine (§4.1). Four atomic primitives over a per-user
//! `(available, escrow, pending)` balance triple and an append-only
//! transaction log (I1/I2).

pub mod error;
pub mod money;

use rusqlite::{Connection, OptionalExtension, params};

use self::error::LedgerError;
use self::money::Money;

/// Reserved user id for the platform's commission revenue account.
pub const PLATFORM_USER_ID: &str = "platform";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    EscrowLock,
    EscrowRelease,
    Deposit,
    Withdraw,
}

impl TxKind {
    fn as_str(self) -> &'static str {
        match self {
            TxKind::EscrowLock => "escrow_lock",
            TxKind::EscrowRelease => "escrow_release",
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
        }
    }
}

struct Balances {
    available: Money,
    escrow: Money,
    pending: Money,
}

fn read_balances(conn: &Connection, user_id: &str) -> Result<Balances, LedgerError> {
    conn.query_row(
        "SELECT available, escrow, pending FROM users WHERE id = ?1",
        [user_id],
        |row| {
            let available: String = row.get(0)?;
            let escrow: String = row.get(1)?;
            let pending: String = row.get(2)?;
            Ok((available, escrow, pending))
        },
    )
    .optional()?
    .map(|(a, e, p)| Balances {
        available: a.parse().unwrap_or(Money::ZERO),
        escrow: e.parse().unwrap_or(Money::ZERO),
        pending: p.parse().unwrap_or(Money::ZERO),
    })
    .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))
}

fn write_balances(conn: &Connection, user_id: &str, b: &Balances) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE users SET available = ?1, escrow = ?2, pending = ?3 WHERE id = ?4",
        params![
            b.available.to_string(),
            b.escrow.to_string(),
            b.pending.to_string(),
            user_id
        ],
    )?;
    Ok(())
}

fn append_tx(
    conn: &Connection,
    user_id: &str,
    order_id: Option<&str>,
    kind: TxKind,
    amount: Money,
    before: Money,
    after: Money,
    external_tx_hash: Option<&str>,
) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO ledger_tx
            (id, user_id, order_id, kind, amount, balance_before, balance_after, external_tx_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, unixepoch())",
        params![
            uuid::Uuid::new_v4().to_string(),
            user_id,
            order_id,
            kind.as_str(),
            amount.to_string(),
            before.to_string(),
            after.to_string(),
            external_tx_hash,
        ],
    )?;
    Ok(())
}

/// Decrement `available`, increment `escrow`. Fails if `available < amount`.
pub fn lock_escrow(conn: &Connection, user_id: &str, amount: Money) -> Result<(), LedgerError> {
    let tx = conn.unchecked_transaction()?;
    let mut b = read_balances(&tx, user_id)?;

    if b.available < amount {
        return Err(LedgerError::InsufficientFunds {
            requested: amount.to_string(),
            available: b.available.to_string(),
        });
    }

    let before = b.available;
    b.available = b
        .available
        .checked_sub(amount)
        .ok_or(LedgerError::Overflow)?;
    b.escrow = b.escrow.checked_add(amount).ok_or(LedgerError::Overflow)?;

    write_balances(&tx, user_id, &b)?;
    append_tx(
        &tx,
        user_id,
        None,
        TxKind::EscrowLock,
        amount,
        before,
        b.available,
        None,
    )?;
    tx.commit()?;
    Ok(())
}

/// Release a locked order's escrow into payout/refund/commission (§4.1).
///
/// Requires `payout + refund == total_paid` and `commission <= payout`.
/// Debits the buyer's escrow by `total_paid`, credits the seller's
/// available by `payout - commission`, credits the buyer's available by
/// `refund`, and credits the platform's available by `commission`.
pub fn release_escrow(
    conn: &Connection,
    order_id: &str,
    buyer_id: &str,
    seller_id: &str,
    total_paid: Money,
    payout: Money,
    refund: Money,
    commission: Money,
) -> Result<(), LedgerError> {
    let sum = payout.checked_add(refund).ok_or(LedgerError::Overflow)?;
    if sum != total_paid {
        return Err(LedgerError::PayoutRefundMismatch {
            sum: sum.to_string(),
            total: total_paid.to_string(),
        });
    }
    if commission > payout {
        return Err(LedgerError::CommissionExceedsPayout {
            commission: commission.to_string(),
            payout: payout.to_string(),
        });
    }

    let tx = conn.unchecked_transaction()?;

    // Buyer: escrow -= total_paid
    let mut buyer = read_balances(&tx, buyer_id)?;
    let buyer_escrow_before = buyer.escrow;
    buyer.escrow = buyer
        .escrow
        .checked_sub(total_paid)
        .ok_or(LedgerError::Overflow)?;
    write_balances(&tx, buyer_id, &buyer)?;
    append_tx(
        &tx,
        buyer_id,
        Some(order_id),
        TxKind::EscrowRelease,
        Money::ZERO - total_paid,
        buyer_escrow_before,
        buyer.escrow,
        None,
    )?;

    // Seller: available += payout - commission
    let seller_net = payout.checked_sub(commission).ok_or(LedgerError::Overflow)?;
    if !seller_net.is_negative() && seller_net != Money::ZERO {
        let mut seller = read_balances(&tx, seller_id)?;
        let before = seller.available;
        seller.available = seller
            .available
            .checked_add(seller_net)
            .ok_or(LedgerError::Overflow)?;
        write_balances(&tx, seller_id, &seller)?;
        append_tx(
            &tx,
            seller_id,
            Some(order_id),
            TxKind::EscrowRelease,
            seller_net,
            before,
            seller.available,
            None,
        )?;
    }

    // Buyer: available += refund
    if refund != Money::ZERO {
        let mut buyer2 = read_balances(&tx, buyer_id)?;
        let before = buyer2.available;
        buyer2.available = buyer2
            .available
            .checked_add(refund)
            .ok_or(LedgerError::Overflow)?;
        write_balances(&tx, buyer_id, &buyer2)?;
        append_tx(
            &tx,
            buyer_id,
            Some(order_id),
            TxKind::EscrowRelease,
            refund,
            before,
            buyer2.available,
            None,
        )?;
    }

    // Platform: available += commission
    if commission != Money::ZERO {
        let mut platform = read_balances(&tx, PLATFORM_USER_ID)?;
        let before = platform.available;
        platform.available = platform
            .available
            .checked_add(commission)
            .ok_or(LedgerError::Overflow)?;
        write_balances(&tx, PLATFORM_USER_ID, &platform)?;
        append_tx(
            &tx,
            PLATFORM_USER_ID,
            Some(order_id),
            TxKind::EscrowRelease,
            commission,
            before,
            platform.available,
            None,
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Idempotent on `external_tx_hash`: a second call with the same hash is a
/// no-op that returns successfully without mutating state again.
pub fn credit_deposit(
    conn: &Connection,
    user_id: &str,
    amount: Money,
    external_tx_hash: &str,
) -> Result<(), LedgerError> {
    let tx = conn.unchecked_transaction()?;

    let already: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM ledger_tx WHERE external_tx_hash = ?1",
            [external_tx_hash],
            |row| row.get(0),
        )
        .optional()?;
    if already.is_some() {
        return Ok(());
    }

    let mut b = read_balances(&tx, user_id)?;
    let before = b.available;
    b.available = b
        .available
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    write_balances(&tx, user_id, &b)?;
    append_tx(
        &tx,
        user_id,
        None,
        TxKind::Deposit,
        amount,
        before,
        b.available,
        Some(external_tx_hash),
    )?;
    tx.commit()?;
    Ok(())
}

/// Outcome of a withdrawal request: `processing` immediately, or `pending`
/// admin approval when `amount > 500` (§6).
#[derive(Debug)]
pub enum WithdrawState {
    Processing,
    PendingApproval,
}

pub fn debit_withdraw(
    conn: &Connection,
    user_id: &str,
    amount: Money,
    fee: Money,
) -> Result<WithdrawState, LedgerError> {
    let total = amount.checked_add(fee).ok_or(LedgerError::Overflow)?;
    let tx = conn.unchecked_transaction()?;
    let mut b = read_balances(&tx, user_id)?;

    if b.available < total {
        return Err(LedgerError::InsufficientFunds {
            requested: total.to_string(),
            available: b.available.to_string(),
        });
    }

    let before = b.available;
    b.available = b.available.checked_sub(total).ok_or(LedgerError::Overflow)?;
    write_balances(&tx, user_id, &b)?;
    append_tx(
        &tx,
        user_id,
        None,
        TxKind::Withdraw,
        Money::ZERO - total,
        before,
        b.available,
        None,
    )?;
    tx.commit()?;

    Ok(if amount.as_decimal() > money::WITHDRAW_APPROVAL_THRESHOLD {
        WithdrawState::PendingApproval
    } else {
        WithdrawState::Processing
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id TEXT PRIMARY KEY, available TEXT NOT NULL, escrow TEXT NOT NULL, pending TEXT NOT NULL
            );
             CREATE TABLE ledger_tx (
                id TEXT PRIMARY KEY, user_id TEXT NOT NULL, order_id TEXT, kind TEXT NOT NULL,
                amount TEXT NOT NULL, balance_before TEXT NOT NULL, balance_after TEXT NOT NULL,
                external_tx_hash TEXT, created_at INTEGER
             );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO users (id, available, escrow, pending) VALUES (?1, '0.00', '0.00', '0.00')",
            [PLATFORM_USER_ID],
        )
        .unwrap();
        conn
    }

    fn seed_user(conn: &Connection, id: &str, available: &str) {
        conn.execute(
            "INSERT INTO users (id, available, escrow, pending) VALUES (?1, ?2, '0.00', '0.00')",
            params![id, available],
        )
        .unwrap();
    }

    #[test]
    fn s1_happy_path() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "100.00");
        seed_user(&conn, "seller", "0.00");

        let total_paid = Money::from_cents(1030);
        lock_escrow(&conn, "buyer", total_paid).unwrap();
        let b = read_balances(&conn, "buyer").unwrap();
        assert_eq!(b.available, Money::from_cents(8970));
        assert_eq!(b.escrow, Money::from_cents(1030));

        // payout + refund must equal total_paid (1030): approve's refund is
        // the commission the buyer originally prepaid, not zero.
        release_escrow(
            &conn,
            "order-1",
            "buyer",
            "seller",
            total_paid,
            Money::from_cents(1000),
            Money::from_cents(30),
            Money::from_cents(30),
        )
        .unwrap();

        let buyer = read_balances(&conn, "buyer").unwrap();
        let seller = read_balances(&conn, "seller").unwrap();
        let platform = read_balances(&conn, PLATFORM_USER_ID).unwrap();
        assert_eq!(buyer.available, Money::from_cents(9000));
        assert_eq!(buyer.escrow, Money::ZERO);
        assert_eq!(seller.available, Money::from_cents(970));
        assert_eq!(platform.available, Money::from_cents(30));
    }

    #[test]
    fn s2_full_refund() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "100.00");
        seed_user(&conn, "seller", "0.00");

        let total_paid = Money::from_cents(1030);
        lock_escrow(&conn, "buyer", total_paid).unwrap();
        release_escrow(
            &conn,
            "order-2",
            "buyer",
            "seller",
            total_paid,
            Money::ZERO,
            total_paid,
            Money::ZERO,
        )
        .unwrap();

        let buyer = read_balances(&conn, "buyer").unwrap();
        let seller = read_balances(&conn, "seller").unwrap();
        assert_eq!(buyer.available, Money::from_cents(10000));
        assert_eq!(buyer.escrow, Money::ZERO);
        assert_eq!(seller.available, Money::ZERO);
    }

    #[test]
    fn s3_partial_60_percent() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "100.00");
        seed_user(&conn, "seller", "0.00");

        let total_paid = Money::from_cents(1030);
        lock_escrow(&conn, "buyer", total_paid).unwrap();
        // payout=6.00, so refund must be total_paid-payout=4.30, not 4.00.
        release_escrow(
            &conn,
            "order-3",
            "buyer",
            "seller",
            total_paid,
            Money::from_cents(600),
            Money::from_cents(430),
            Money::from_cents(18),
        )
        .unwrap();

        let buyer = read_balances(&conn, "buyer").unwrap();
        let seller = read_balances(&conn, "seller").unwrap();
        let platform = read_balances(&conn, PLATFORM_USER_ID).unwrap();
        assert_eq!(buyer.available, Money::from_cents(9400));
        assert_eq!(seller.available, Money::from_cents(582));
        assert_eq!(platform.available, Money::from_cents(18));
    }

    #[test]
    fn s4_idempotent_deposit() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "0.00");

        credit_deposit(&conn, "buyer", Money::from_cents(5000), "0xA").unwrap();
        credit_deposit(&conn, "buyer", Money::from_cents(5000), "0xA").unwrap();

        let b = read_balances(&conn, "buyer").unwrap();
        assert_eq!(b.available, Money::from_cents(5000));
    }

    #[test]
    fn lock_escrow_rejects_insufficient_funds() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "5.00");
        let err = lock_escrow(&conn, "buyer", Money::from_cents(1000)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        // No partial writes on failure.
        let b = read_balances(&conn, "buyer").unwrap();
        assert_eq!(b.available, Money::from_cents(500));
    }

    #[test]
    fn release_escrow_rejects_payout_refund_mismatch() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "100.00");
        seed_user(&conn, "seller", "0.00");
        let total_paid = Money::from_cents(1030);
        lock_escrow(&conn, "buyer", total_paid).unwrap();

        let err = release_escrow(
            &conn,
            "order-bad",
            "buyer",
            "seller",
            total_paid,
            Money::from_cents(1000),
            Money::from_cents(100), // doesn't sum to total_paid
            Money::from_cents(30),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::PayoutRefundMismatch { .. }));
    }

    #[test]
    fn withdraw_above_threshold_requires_approval() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "1000.00");
        let state = debit_withdraw(&conn, "buyer", Money::from_cents(60000), Money::from_decimal(money::WITHDRAW_FEE)).unwrap();
        assert!(matches!(state, WithdrawState::PendingApproval));
    }

    #[test]
    fn withdraw_below_threshold_processes_immediately() {
        let conn = test_conn();
        seed_user(&conn, "buyer", "1000.00");
        let state = debit_withdraw(&conn, "buyer", Money::from_cents(100_00), Money::from_decimal(money::WITHDRAW_FEE)).unwrap();
        assert!(matches!(state, WithdrawState::Processing));
    }
}
