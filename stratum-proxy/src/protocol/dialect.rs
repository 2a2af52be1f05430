use serde_json::Value;

use crate::errors::DialectError;

use super::message::RpcMessage;

/// The two Stratum flavors the proxy bridges (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `mining.subscribe` / `mining.authorize` / `mining.submit`, ASIC-style.
    A,
    /// single `login` with object params, CryptoNight/RandomX-style.
    B,
}

/// Detects the dialect from a message's method name; `None` for methods
/// that don't disambiguate (e.g. a bare reply with no method).
pub fn detect(msg: &RpcMessage) -> Option<Dialect> {
    match msg.method.as_deref() {
        Some(m) if m.starts_with("mining.") => Some(Dialect::A),
        Some("login") => Some(Dialect::B),
        Some("submit") => Some(Dialect::B),
        _ => None,
    }
}

/// Extracted login credentials: `worker_id` is the substring before the
/// first `.`, used as the session lookup key (§4.4 step 3).
pub struct LoginFields {
    pub worker_id: String,
    pub worker_name: String,
    pub password: String,
}

pub fn parse_login(dialect: Dialect, params: &Option<Value>) -> Result<LoginFields, DialectError> {
    match dialect {
        Dialect::A => parse_login_a(params),
        Dialect::B => parse_login_b(params),
    }
}

fn split_login(login: &str) -> (String, String) {
    match login.split_once('.') {
        Some((worker_id, worker_name)) => (worker_id.to_string(), worker_name.to_string()),
        None => (login.to_string(), String::new()),
    }
}

/// `mining.authorize` params: `["<login>", "<password>"]`.
fn parse_login_a(params: &Option<Value>) -> Result<LoginFields, DialectError> {
    let arr = params
        .as_ref()
        .and_then(Value::as_array)
        .ok_or_else(|| DialectError::MalformedLogin("<missing params array>".to_string()))?;

    let login = arr
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| DialectError::MalformedLogin("<missing login>".to_string()))?;
    let password = arr.get(1).and_then(Value::as_str).unwrap_or("").to_string();

    let (worker_id, worker_name) = split_login(login);
    Ok(LoginFields {
        worker_id,
        worker_name,
        password,
    })
}

/// `login` params: `{"login": "<login>", "pass": "<password>", ...}`.
fn parse_login_b(params: &Option<Value>) -> Result<LoginFields, DialectError> {
    let obj = params
        .as_ref()
        .and_then(Value::as_object)
        .ok_or_else(|| DialectError::MalformedLogin("<missing params object>".to_string()))?;

    let login = obj
        .get("login")
        .and_then(Value::as_str)
        .ok_or_else(|| DialectError::MalformedLogin("<missing login field>".to_string()))?;
    let password = obj.get("pass").and_then(Value::as_str).unwrap_or("").to_string();

    let (worker_id, worker_name) = split_login(login);
    Ok(LoginFields {
        worker_id,
        worker_name,
        password,
    })
}

/// Rewrites an outbound authorize/login message in place so the destination
/// pool only ever sees the order's stored pool credentials (§4.4 step 5, P4).
pub fn rewrite_credentials(
    dialect: Dialect,
    msg: &mut RpcMessage,
    pool_wallet: &str,
    pool_worker: &str,
    pool_password: &str,
) {
    match dialect {
        Dialect::A => {
            let login = format!("{pool_wallet}.{pool_worker}");
            msg.params = Some(Value::Array(vec![
                Value::String(login),
                Value::String(pool_password.to_string()),
            ]));
        }
        Dialect::B => {
            if let Some(Value::Object(obj)) = msg.params.as_mut() {
                obj.insert(
                    "login".to_string(),
                    Value::String(format!("{pool_wallet}.{pool_worker}")),
                );
                obj.insert("pass".to_string(), Value::String(pool_password.to_string()));
            }
        }
    }
}

/// Best-effort recovery of difficulty from a dialect-B job target
/// (§4.4, §9): `difficulty = (2^256 - 1) / target / 2^32`. Returns `None`
/// on any parse failure so the caller retains the previous difficulty.
pub fn difficulty_from_target_hex(target_hex: &str) -> Option<f64> {
    let bytes = hex::decode(target_hex.trim_start_matches("0x")).ok()?;
    if bytes.iter().all(|b| *b == 0) {
        return None;
    }
    // RandomX targets are a few significant bytes; a u128 built from the
    // leading 16 bytes (big-endian) is ample precision for display.
    let mut padded = [0u8; 16];
    let take = bytes.len().min(16);
    padded[16 - take..].copy_from_slice(&bytes[bytes.len() - take..]);
    let target = u128::from_be_bytes(padded);
    if target == 0 {
        return None;
    }
    let max = u128::MAX as f64;
    Some(max / target as f64 / 4_294_967_296.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_dialect_a_from_mining_prefix() {
        let msg = RpcMessage::parse(r#"{"id":1,"method":"mining.authorize","params":["w.1","x"]}"#).unwrap();
        assert_eq!(detect(&msg), Some(Dialect::A));
    }

    #[test]
    fn detects_dialect_b_from_login() {
        let msg = RpcMessage::parse(r#"{"id":1,"method":"login","params":{"login":"w.1","pass":"x"}}"#).unwrap();
        assert_eq!(detect(&msg), Some(Dialect::B));
    }

    #[test]
    fn parses_worker_id_before_first_dot() {
        let params = Some(json!(["hb_ord_abc12345.rig1", "x"]));
        let fields = parse_login_a(&params).unwrap();
        assert_eq!(fields.worker_id, "hb_ord_abc12345");
        assert_eq!(fields.worker_name, "rig1");
    }

    #[test]
    fn login_without_dot_is_whole_string() {
        let params = Some(json!(["hb_ord_abc12345", "x"]));
        let fields = parse_login_a(&params).unwrap();
        assert_eq!(fields.worker_id, "hb_ord_abc12345");
        assert_eq!(fields.worker_name, "");
    }

    #[test]
    fn malformed_login_b_params_errors() {
        let params = Some(json!(["not", "an", "object"]));
        assert!(parse_login_b(&params).is_err());
    }

    #[test]
    fn rewrites_credentials_dialect_a() {
        let mut msg = RpcMessage::parse(r#"{"id":1,"method":"mining.authorize","params":["w.1","x"]}"#).unwrap();
        rewrite_credentials(Dialect::A, &mut msg, "pool-wallet", "pool-worker", "pool-pass");
        let params = msg.params.unwrap();
        assert_eq!(params[0], "pool-wallet.pool-worker");
        assert_eq!(params[1], "pool-pass");
    }

    #[test]
    fn difficulty_parse_failure_returns_none() {
        assert!(difficulty_from_target_hex("not-hex").is_none());
        assert!(difficulty_from_target_hex("0").is_none());
    }
}
