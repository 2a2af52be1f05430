use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::ledger::PLATFORM_USER_ID;

pub type Db = Arc<Mutex<Connection>>;

pub fn open(path: &std::path::Path) -> Result<(Db, String)> {
    std::fs::create_dir_all(path.parent().unwrap_or(path))
        .context("creating db directory")?;

    let conn = Connection::open(path)
        .with_context(|| format!("opening sqlite at {}", path.display()))?;

    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    let secret = ensure_auth_secret(&conn)?;
    ensure_platform_account(&conn)?;

    Ok((Arc::new(Mutex::new(conn)), secret))
}

pub fn open_in_memory() -> Result<Db> {
    let conn = Connection::open_in_memory().context("opening in-memory sqlite")?;
    migrate(&conn)?;
    ensure_platform_account(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id             TEXT PRIMARY KEY,
            wallet_address TEXT UNIQUE NOT NULL,
            password_hash  TEXT,
            is_admin       INTEGER NOT NULL DEFAULT 0,
            available      TEXT NOT NULL DEFAULT '0.00',
            escrow         TEXT NOT NULL DEFAULT '0.00',
            pending        TEXT NOT NULL DEFAULT '0.00',
            banned         INTEGER NOT NULL DEFAULT 0,
            created_at     INTEGER DEFAULT (unixepoch())
        );

        CREATE TABLE IF NOT EXISTS listings (
            id             TEXT PRIMARY KEY,
            seller_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            algorithm      TEXT NOT NULL,
            hashrate       REAL NOT NULL,
            hashrate_unit  TEXT NOT NULL,
            price_per_hour TEXT NOT NULL,
            min_hours      INTEGER NOT NULL,
            max_hours      INTEGER NOT NULL,
            region         TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'active',
            created_at     INTEGER DEFAULT (unixepoch())
        );

        CREATE TABLE IF NOT EXISTS orders (
            id                 TEXT PRIMARY KEY,
            order_code         TEXT UNIQUE NOT NULL,
            buyer_id           TEXT NOT NULL REFERENCES users(id),
            seller_id          TEXT NOT NULL REFERENCES users(id),
            listing_id         TEXT NOT NULL REFERENCES listings(id),
            algorithm          TEXT NOT NULL,
            ordered_hashrate   REAL NOT NULL,
            hours              INTEGER NOT NULL,
            subtotal           TEXT NOT NULL,
            commission         TEXT NOT NULL,
            total_paid         TEXT NOT NULL,
            pool_host          TEXT NOT NULL,
            pool_port          INTEGER NOT NULL,
            pool_wallet        TEXT NOT NULL,
            pool_worker        TEXT NOT NULL,
            pool_password      TEXT NOT NULL,
            backup_host        TEXT,
            backup_port        INTEGER,
            current_hashrate   REAL NOT NULL DEFAULT 0.0,
            avg_hashrate       REAL NOT NULL DEFAULT 0.0,
            accuracy           REAL NOT NULL DEFAULT 0.0,
            accuracy_low       INTEGER NOT NULL DEFAULT 0,
            shares_accepted    INTEGER NOT NULL DEFAULT 0,
            shares_rejected    INTEGER NOT NULL DEFAULT 0,
            last_share_at      INTEGER,
            paid_at            INTEGER NOT NULL,
            started_at         INTEGER,
            expected_end_at    INTEGER,
            review_at          INTEGER,
            completed_at       INTEGER,
            cancelled_at       INTEGER,
            status             TEXT NOT NULL DEFAULT 'paid',
            payout_amount      TEXT,
            refund_amount      TEXT,
            admin_action       TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer_id);
        CREATE INDEX IF NOT EXISTS idx_orders_seller ON orders(seller_id);

        CREATE TABLE IF NOT EXISTS proxy_sessions (
            id              TEXT PRIMARY KEY,
            order_id        TEXT NOT NULL REFERENCES orders(id),
            miner_ip        TEXT,
            user_agent      TEXT,
            target_host     TEXT NOT NULL,
            target_port     INTEGER NOT NULL,
            connected_at    INTEGER NOT NULL,
            disconnected_at INTEGER,
            status          TEXT NOT NULL DEFAULT 'waiting'
        );
        CREATE INDEX IF NOT EXISTS idx_proxy_sessions_order ON proxy_sessions(order_id);

        CREATE TABLE IF NOT EXISTS share_log (
            id               TEXT PRIMARY KEY,
            order_id         TEXT NOT NULL REFERENCES orders(id),
            session_id       TEXT,
            outcome          TEXT NOT NULL,
            difficulty       REAL NOT NULL,
            derived_hashrate REAL NOT NULL,
            created_at       INTEGER DEFAULT (unixepoch())
        );
        CREATE INDEX IF NOT EXISTS idx_share_log_order ON share_log(order_id);

        CREATE TABLE IF NOT EXISTS hashrate_snapshots (
            id          TEXT PRIMARY KEY,
            order_id    TEXT NOT NULL REFERENCES orders(id),
            created_at  INTEGER DEFAULT (unixepoch()),
            hashrate    REAL NOT NULL,
            unit        TEXT NOT NULL,
            accepted    INTEGER NOT NULL,
            rejected    INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_hashrate_snapshots_order ON hashrate_snapshots(order_id);

        CREATE TABLE IF NOT EXISTS disputes (
            id           TEXT PRIMARY KEY,
            order_id     TEXT NOT NULL REFERENCES orders(id),
            opener       TEXT NOT NULL,
            reason       TEXT NOT NULL,
            telemetry    TEXT NOT NULL,
            resolution   TEXT,
            resolver_id  TEXT,
            created_at   INTEGER DEFAULT (unixepoch()),
            resolved_at  INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_disputes_order ON disputes(order_id);

        CREATE TABLE IF NOT EXISTS ledger_tx (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL REFERENCES users(id),
            order_id          TEXT REFERENCES orders(id),
            kind              TEXT NOT NULL,
            amount            TEXT NOT NULL,
            balance_before    TEXT NOT NULL,
            balance_after     TEXT NOT NULL,
            external_tx_hash  TEXT,
            created_at        INTEGER DEFAULT (unixepoch())
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_tx_user ON ledger_tx(user_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_tx_ext_hash
            ON ledger_tx(external_tx_hash) WHERE external_tx_hash IS NOT NULL;

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn ensure_auth_secret(conn: &Connection) -> Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'auth_secret'",
            [],
            |row| row.get(0),
        )
        .ok();

    if let Some(secret) = existing {
        return Ok(secret);
    }

    use rand::Rng;
    let bytes: [u8; 64] = rand::rng().random();
    let secret = super::auth::base64_encode(&bytes);

    conn.execute(
        "INSERT INTO config (key, value) VALUES ('auth_secret', ?1)",
        [&secret],
    )?;

    Ok(secret)
}

fn ensure_platform_account(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (id, wallet_address, available, escrow, pending, is_admin)
         VALUES (?1, 'platform', '0.00', '0.00', '0.00', 1)",
        [PLATFORM_USER_ID],
    )?;
    Ok(())
}
