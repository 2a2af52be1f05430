//! `generate_order_code()` (§9 open question, resolved in SPEC_FULL.md).

use rand::Rng;
use rusqlite::Connection;

use crate::orders::error::OrderError;

const ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";
const CODE_LEN: usize = 8;
const MAX_ATTEMPTS: u32 = 10;

pub const ORDER_CODE_PREFIX: &str = "hb_ord_";

fn random_code() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect();
    format!("{ORDER_CODE_PREFIX}{suffix}")
}

/// Generates an order code, retrying on collision against the `orders` table.
pub fn generate_order_code(conn: &Connection) -> Result<String, OrderError> {
    for _ in 0..MAX_ATTEMPTS {
        let code = random_code();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM orders WHERE order_code = ?1",
                [&code],
                |row| row.get(0),
            )
            .ok();
        if exists.is_none() {
            return Ok(code);
        }
    }
    Err(OrderError::Internal(
        "failed to generate a unique order code after 10 attempts".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_has_expected_shape() {
        let code = random_code();
        assert!(code.starts_with(ORDER_CODE_PREFIX));
        assert_eq!(code.len(), ORDER_CODE_PREFIX.len() + CODE_LEN);
        for c in code[ORDER_CODE_PREFIX.len()..].chars() {
            assert!(ALPHABET.contains(&(c as u8)), "unexpected char {c}");
        }
    }

    #[test]
    fn generate_order_code_avoids_collision() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (order_code TEXT PRIMARY KEY);",
        )
        .unwrap();
        let code = generate_order_code(&conn).unwrap();
        conn.execute("INSERT INTO orders (order_code) VALUES (?1)", [&code])
            .unwrap();
        let second = generate_order_code(&conn).unwrap();
        assert_ne!(code, second);
    }
}
