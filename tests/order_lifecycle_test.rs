use hashlease::api::db;
use hashlease::ledger::money::Money;
use hashlease::orders::state_machine::{self, AdminAction, NewOrder, OrderStatus, PoolTarget};
use rusqlite::Connection;

fn seed_user(conn: &Connection, id: &str, available: &str) {
    conn.execute(
        "INSERT INTO users (id, wallet_address, available, escrow, pending)
         VALUES (?1, ?1, ?2, '0.00', '0.00')",
        rusqlite::params![id, available],
    )
    .unwrap();
}

fn seed_listing(conn: &Connection, id: &str, seller_id: &str, price_per_hour: &str) {
    conn.execute(
        "INSERT INTO listings (id, seller_id, algorithm, hashrate, hashrate_unit, price_per_hour, min_hours, max_hours, region, status)
         VALUES (?1, ?2, 'sha256', 100.0, 'TH/s', ?3, 1, 720, 'us-east', 'active')",
        rusqlite::params![id, seller_id, price_per_hour],
    )
    .unwrap();
}

fn pool_target() -> PoolTarget {
    PoolTarget {
        host: "pool.example.com".to_string(),
        port: 3333,
        wallet: "bc1qwallet".to_string(),
        worker: "worker1".to_string(),
        password: "x".to_string(),
        backup_host: None,
        backup_port: None,
    }
}

#[test]
fn full_happy_path_lifecycle() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    seed_user(&conn, "buyer", "1000.00");
    seed_user(&conn, "seller", "0.00");
    seed_listing(&conn, "listing1", "seller", "1.00");

    let order = state_machine::create(
        &conn,
        NewOrder {
            listing_id: "listing1",
            buyer_id: "buyer",
            hours: 10,
            pool: pool_target(),
        },
        1_000,
    )
    .unwrap();

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.subtotal, "10.00".parse::<Money>().unwrap());
    assert_eq!(order.commission, "0.30".parse::<Money>().unwrap());
    assert_eq!(order.total_paid, "10.30".parse::<Money>().unwrap());

    let buyer_available: String = conn
        .query_row("SELECT available FROM users WHERE id = 'buyer'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(buyer_available, "989.70");

    let order = state_machine::on_connect(&conn, &order.order_code, 1_100).unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    assert_eq!(order.expected_end_at, Some(1_100 + 10 * 3600));

    // Repeated connect is a no-op (R1).
    let order = state_machine::on_connect(&conn, &order.order_code, 1_200).unwrap();
    assert_eq!(order.started_at, Some(1_100));

    let order = state_machine::on_confirm_or_expire(&conn, &order.id, 2_000).unwrap();
    assert_eq!(order.status, OrderStatus::Delivering);

    let order = state_machine::resolve(&conn, &order.id, AdminAction::Approve, 3_000).unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payout_amount, Some("10.00".parse::<Money>().unwrap()));
    // approve is the pct=100 case of partial: refund = total_paid - payout,
    // which equals the commission the buyer prepaid, not zero.
    assert_eq!(order.refund_amount, Some("0.30".parse::<Money>().unwrap()));

    let seller_available: String = conn
        .query_row("SELECT available FROM users WHERE id = 'seller'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(seller_available, "9.70");

    let platform_available: String = conn
        .query_row("SELECT available FROM users WHERE id = 'platform'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(platform_available, "0.30");

    let listing_status: String = conn
        .query_row("SELECT status FROM listings WHERE id = 'listing1'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(listing_status, "active");

    // Resolving an already-terminal order returns the cached outcome (P2),
    // it does not release escrow a second time.
    let order_again = state_machine::resolve(&conn, &order.id, AdminAction::Reject, 4_000).unwrap();
    assert_eq!(order_again.status, OrderStatus::Completed);
    let seller_available_again: String = conn
        .query_row("SELECT available FROM users WHERE id = 'seller'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(seller_available_again, "9.70");
}

#[test]
fn dispute_blocks_hours_out_of_range_and_self_rental() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    seed_user(&conn, "buyer", "1000.00");
    seed_user(&conn, "seller", "0.00");
    seed_listing(&conn, "listing1", "seller", "1.00");

    let err = state_machine::create(
        &conn,
        NewOrder {
            listing_id: "listing1",
            buyer_id: "buyer",
            hours: 0,
            pool: pool_target(),
        },
        1_000,
    )
    .unwrap_err();
    assert!(matches!(err, hashlease::orders::error::OrderError::HoursOutOfRange { .. }));

    let err = state_machine::create(
        &conn,
        NewOrder {
            listing_id: "listing1",
            buyer_id: "seller",
            hours: 5,
            pool: pool_target(),
        },
        1_000,
    )
    .unwrap_err();
    assert!(matches!(err, hashlease::orders::error::OrderError::SelfRental));
}

#[test]
fn dispute_wins_over_expiry_tie_break_on_terminal_order() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    seed_user(&conn, "buyer", "1000.00");
    seed_user(&conn, "seller", "0.00");
    seed_listing(&conn, "listing1", "seller", "1.00");

    let order = state_machine::create(
        &conn,
        NewOrder {
            listing_id: "listing1",
            buyer_id: "buyer",
            hours: 1,
            pool: pool_target(),
        },
        0,
    )
    .unwrap();
    let order = state_machine::on_connect(&conn, &order.order_code, 0).unwrap();
    let order = state_machine::resolve(&conn, &order.id, AdminAction::Approve, 10_000).unwrap();
    assert!(order.status.is_terminal());

    let err = state_machine::open_dispute(&conn, &order.id).unwrap_err();
    assert!(matches!(err, hashlease::orders::error::OrderError::OrderTerminal(_)));
}

#[test]
fn partial_settlement_splits_payout_and_refund() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    seed_user(&conn, "buyer", "1000.00");
    seed_user(&conn, "seller", "0.00");
    seed_listing(&conn, "listing1", "seller", "10.00");

    let order = state_machine::create(
        &conn,
        NewOrder {
            listing_id: "listing1",
            buyer_id: "buyer",
            hours: 10,
            pool: pool_target(),
        },
        0,
    )
    .unwrap();
    let order = state_machine::on_connect(&conn, &order.order_code, 0).unwrap();
    let order = state_machine::open_dispute(&conn, &order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Dispute);

    let order = state_machine::resolve(&conn, &order.id, AdminAction::Partial(60), 500).unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payout_amount, Some("60.00".parse::<Money>().unwrap()));
    // total_paid=103.00 (subtotal 100.00 + commission 3.00); refund = total_paid - payout.
    assert_eq!(order.refund_amount, Some("43.00".parse::<Money>().unwrap()));
}

#[test]
fn review_queue_surfaces_expired_active_orders_first() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    seed_user(&conn, "buyer", "1000.00");
    seed_user(&conn, "seller", "0.00");
    seed_listing(&conn, "listing1", "seller", "1.00");

    let order = state_machine::create(
        &conn,
        NewOrder {
            listing_id: "listing1",
            buyer_id: "buyer",
            hours: 1,
            pool: pool_target(),
        },
        0,
    )
    .unwrap();
    let order = state_machine::on_connect(&conn, &order.order_code, 0).unwrap();

    let queue = state_machine::review_queue(&conn, 10_000).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, order.id);

    let queue_before_expiry = state_machine::review_queue(&conn, 10).unwrap();
    assert!(queue_before_expiry.is_empty());
}
