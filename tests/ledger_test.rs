use hashlease::api::db;
use hashlease::ledger::error::LedgerError;
use hashlease::ledger::money::Money;
use hashlease::ledger::{self, PLATFORM_USER_ID, WithdrawState};
use rusqlite::Connection;

fn seed_user(conn: &Connection, id: &str, available: &str) {
    conn.execute(
        "INSERT INTO users (id, wallet_address, available, escrow, pending)
         VALUES (?1, ?1, ?2, '0.00', '0.00')",
        rusqlite::params![id, available],
    )
    .unwrap();
}

fn available_of(conn: &Connection, user_id: &str) -> Money {
    let raw: String = conn
        .query_row("SELECT available FROM users WHERE id = ?1", [user_id], |r| r.get(0))
        .unwrap();
    raw.parse().unwrap()
}

fn escrow_of(conn: &Connection, user_id: &str) -> Money {
    let raw: String = conn
        .query_row("SELECT escrow FROM users WHERE id = ?1", [user_id], |r| r.get(0))
        .unwrap();
    raw.parse().unwrap()
}

#[test]
fn lock_escrow_moves_funds_and_logs_against_real_schema() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();
    seed_user(&conn, "buyer", "100.00");

    ledger::lock_escrow(&conn, "buyer", "40.00".parse().unwrap()).unwrap();

    assert_eq!(available_of(&conn, "buyer"), "60.00".parse::<Money>().unwrap());
    assert_eq!(escrow_of(&conn, "buyer"), "40.00".parse::<Money>().unwrap());

    let tx_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM ledger_tx WHERE user_id = 'buyer'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(tx_count, 1);
}

#[test]
fn lock_escrow_insufficient_funds_is_rejected() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();
    seed_user(&conn, "buyer", "10.00");

    let err = ledger::lock_escrow(&conn, "buyer", "40.00".parse().unwrap()).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(available_of(&conn, "buyer"), "10.00".parse::<Money>().unwrap());
}

#[test]
fn release_escrow_distributes_payout_commission_and_refund() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();
    seed_user(&conn, "buyer", "1000.00");
    seed_user(&conn, "seller", "0.00");

    ledger::lock_escrow(&conn, "buyer", "103.00".parse().unwrap()).unwrap();
    ledger::release_escrow(
        &conn,
        "order1",
        "buyer",
        "seller",
        "103.00".parse().unwrap(),
        "100.00".parse().unwrap(),
        "3.00".parse().unwrap(),
        "3.00".parse().unwrap(),
    )
    .unwrap();

    assert_eq!(escrow_of(&conn, "buyer"), Money::ZERO);
    assert_eq!(available_of(&conn, "buyer"), "900.00".parse::<Money>().unwrap());
    assert_eq!(available_of(&conn, "seller"), "97.00".parse::<Money>().unwrap());
    assert_eq!(available_of(&conn, PLATFORM_USER_ID), "3.00".parse::<Money>().unwrap());
}

#[test]
fn release_escrow_rejects_payout_refund_mismatch() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();
    seed_user(&conn, "buyer", "1000.00");
    seed_user(&conn, "seller", "0.00");

    let err = ledger::release_escrow(
        &conn,
        "order1",
        "buyer",
        "seller",
        "100.00".parse().unwrap(),
        "60.00".parse().unwrap(),
        "30.00".parse().unwrap(),
        "0.00".parse().unwrap(),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::PayoutRefundMismatch { .. }));
}

#[test]
fn credit_deposit_is_idempotent_on_external_tx_hash() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();
    seed_user(&conn, "buyer", "0.00");

    ledger::credit_deposit(&conn, "buyer", "50.00".parse().unwrap(), "0xabc").unwrap();
    ledger::credit_deposit(&conn, "buyer", "50.00".parse().unwrap(), "0xabc").unwrap();

    assert_eq!(available_of(&conn, "buyer"), "50.00".parse::<Money>().unwrap());
    let tx_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM ledger_tx WHERE external_tx_hash = '0xabc'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(tx_count, 1);
}

#[test]
fn withdraw_below_and_above_threshold_produce_different_states() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();
    seed_user(&conn, "buyer", "10000.00");

    let state = ledger::debit_withdraw(&conn, "buyer", "100.00".parse().unwrap(), "0.50".parse().unwrap()).unwrap();
    assert!(matches!(state, WithdrawState::Processing));

    let state = ledger::debit_withdraw(&conn, "buyer", "600.00".parse().unwrap(), "0.50".parse().unwrap()).unwrap();
    assert!(matches!(state, WithdrawState::PendingApproval));

    assert_eq!(
        available_of(&conn, "buyer"),
        "10000.00".parse::<Money>().unwrap()
            - "100.50".parse::<Money>().unwrap()
            - "600.50".parse::<Money>().unwrap()
    );
}

#[test]
fn withdraw_rejects_when_balance_cannot_cover_fee() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();
    seed_user(&conn, "buyer", "10.00");

    let err = ledger::debit_withdraw(&conn, "buyer", "10.00".parse().unwrap(), "0.50".parse().unwrap()).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
}
