use hashlease::api::db;
use hashlease::dispute::{self, DisputeReason};
use hashlease::orders::error::OrderError;
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

fn seed_listing(conn: &Connection, id: &str, seller_id: &str) {
    conn.execute(
        "INSERT INTO listings (id, seller_id, algorithm, hashrate, hashrate_unit, price_per_hour, min_hours, max_hours, region, status)
         VALUES (?1, ?2, 'kawpow', 50.0, 'MH/s', '2.00', 1, 720, 'eu-west', 'active')",
        rusqlite::params![id, seller_id],
    )
    .unwrap();
}

fn open_active_order(conn: &Connection) -> state_machine::Order {
    seed_user(conn, "buyer", "1000.00");
    seed_user(conn, "seller", "0.00");
    seed_listing(conn, "listing1", "seller");

    let order = state_machine::create(
        conn,
        NewOrder {
            listing_id: "listing1",
            buyer_id: "buyer",
            hours: 5,
            pool: PoolTarget {
                host: "pool.example.com".to_string(),
                port: 4444,
                wallet: "wallet".to_string(),
                worker: "w1".to_string(),
                password: "x".to_string(),
                backup_host: None,
                backup_port: None,
            },
        },
        0,
    )
    .unwrap();
    state_machine::on_connect(conn, &order.order_code, 0).unwrap()
}

#[test]
fn open_captures_telemetry_and_moves_order_to_dispute() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    let order = open_active_order(&conn);

    let d = dispute::open(&conn, &order.id, "buyer", DisputeReason::LowHashrate, 100).unwrap();
    assert_eq!(d.order_id, order.id);
    assert_eq!(d.reason, "low_hashrate");
    assert!(d.resolution.is_none());
    assert!(d.telemetry.contains("current_hashrate"));

    let order = state_machine::find_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Dispute);
}

#[test]
fn resolve_rejects_when_order_left_dispute_state() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    let order = open_active_order(&conn);
    let d = dispute::open(&conn, &order.id, "buyer", DisputeReason::Offline, 100).unwrap();

    // Admin directly resolves the order through another path, leaving
    // the dispute row stale relative to the (now terminal) order.
    state_machine::resolve(&conn, &order.id, AdminAction::Approve, 200).unwrap();

    let err = dispute::resolve(
        &conn,
        &d.id,
        "admin",
        AdminAction::Reject,
        "reject",
        300,
    )
    .unwrap_err();
    assert!(matches!(err, OrderError::DisputeInvalidState));
}

#[test]
fn resolve_settles_escrow_exactly_once_and_records_resolver() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    let order = open_active_order(&conn);
    let d = dispute::open(&conn, &order.id, "buyer", DisputeReason::WrongPool, 100).unwrap();

    let (resolved_dispute, resolved_order) =
        dispute::resolve(&conn, &d.id, "admin1", AdminAction::Reject, "reject", 200).unwrap();

    assert_eq!(resolved_dispute.resolver_id, Some("admin1".to_string()));
    assert_eq!(resolved_dispute.resolution, Some("reject".to_string()));
    assert_eq!(resolved_order.status, OrderStatus::Cancelled);

    let buyer_available: String = conn
        .query_row("SELECT available FROM users WHERE id = 'buyer'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(buyer_available, "1000.00");

    let found = dispute::find_by_id(&conn, &d.id).unwrap().unwrap();
    assert_eq!(found.resolved_at, Some(200));
}

#[test]
fn queue_delegates_to_order_state_machine_review_queue() {
    let db = db::open_in_memory().unwrap();
    let conn = db.blocking_lock();

    let order = open_active_order(&conn);
    dispute::open(&conn, &order.id, "buyer", DisputeReason::Other, 100).unwrap();

    let queue = dispute::queue(&conn, 150).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, order.id);
    assert_eq!(queue[0].status, OrderStatus::Dispute);
}

#[test]
fn unknown_reason_string_fails_to_parse() {
    assert!(DisputeReason::parse("not_a_reason").is_none());
    assert_eq!(DisputeReason::parse("wrong_wallet"), Some(DisputeReason::WrongWallet));
}
