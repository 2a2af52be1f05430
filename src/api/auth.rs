use anyhow::{Context, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

const JWT_EXPIRY_DAYS: i64 = 7;

// ── Password hashing (bcrypt) ──────────────────────────

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, 12).context("hashing password")
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ── JWT ─────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub admin: bool,
    pub exp: usize,
}

pub fn create_jwt(user_id: &str, is_admin: bool, secret: &str) -> Result<String> {
    let exp = (chrono::Utc::now() + chrono::Duration::days(JWT_EXPIRY_DAYS)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        admin: is_admin,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("creating jwt")
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("invalid token")?;
    Ok(data.claims)
}

// ── Base64 helpers (used to mint the at-rest auth secret) ──

pub fn base64_encode(data: &[u8]) -> String {
    use std::fmt::Write;
    let alphabet = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut s = String::new();
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let n = (b0 << 16) | (b1 << 8) | b2;
        let _ = write!(s, "{}", alphabet[((n >> 18) & 63) as usize] as char);
        let _ = write!(s, "{}", alphabet[((n >> 12) & 63) as usize] as char);
        if chunk.len() > 1 {
            let _ = write!(s, "{}", alphabet[((n >> 6) & 63) as usize] as char);
        } else {
            s.push('=');
        }
        if chunk.len() > 2 {
            let _ = write!(s, "{}", alphabet[(n & 63) as usize] as char);
        } else {
            s.push('=');
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_round_trips() {
        let token = create_jwt("user-1", false, "secret").unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(!claims.admin);
    }

    #[test]
    fn jwt_rejects_wrong_secret() {
        let token = create_jwt("user-1", false, "secret").unwrap();
        assert!(verify_jwt(&token, "other").is_err());
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
    }
}
