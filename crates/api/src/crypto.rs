//! Cryptographic helpers for authentication.
//!
//! - PBKDF2-SHA256 password hashing (600k iterations)
//! - HMAC-SHA256 JWT signing/verification
//! - Opaque random tokens (refresh, email verification, password reset),
//!   stored only as SHA-256 digests

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

// ── Password hashing ────────────────────────────────────────────────────────

/// Hash a password with PBKDF2-SHA256. Returns `(hash_hex, salt_hex)`.
pub fn hash_password(password: &str) -> Result<(String, String), ServiceError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok((hex::encode(derive(password, &salt)), hex::encode(salt)))
}

/// Verify a password against a stored hash and salt (both hex-encoded).
pub fn verify_password(password: &str, hash_hex: &str, salt_hex: &str) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };
    constant_time_eq(&derive(password, &salt), &expected)
}

fn derive(password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut hash);
    hash
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── JWT (HMAC-SHA256) ───────────────────────────────────────────────────────

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Access token lifetime: 1 hour.
pub const JWT_EXPIRY_SECS: u64 = 3600;

/// Refresh token lifetime: 7 days.
pub const REFRESH_EXPIRY_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// Sign an access token whose subject is the dentist id.
pub fn sign_jwt(dentist_id: &str, secret: &str, now_unix: u64) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: dentist_id.to_string(),
        iat: now_unix,
        exp: now_unix + JWT_EXPIRY_SECS,
    };
    let payload = serde_json::to_vec(&claims)
        .map_err(|e| ServiceError::Internal(format!("encode claims: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(JWT_HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = mac(secret)?
        .chain_update(signing_input.as_bytes())
        .finalize()
        .into_bytes();

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify an access token and return its subject (dentist id).
pub fn verify_jwt(token: &str, secret: &str, now_unix: u64) -> Result<String, ServiceError> {
    let unauthorized = |msg: &str| ServiceError::Unauthorized(msg.to_string());

    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(unauthorized("invalid token format"));
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| unauthorized("invalid token signature encoding"))?;
    mac(secret)?
        .chain_update(format!("{header}.{payload}").as_bytes())
        .verify_slice(&signature)
        .map_err(|_| unauthorized("invalid token signature"))?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| unauthorized("invalid token payload encoding"))?;
    let claims: Claims =
        serde_json::from_slice(&payload).map_err(|_| unauthorized("invalid token payload"))?;

    if now_unix >= claims.exp {
        return Err(unauthorized("token expired"));
    }
    Ok(claims.sub)
}

fn mac(secret: &str) -> Result<HmacSha256, ServiceError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Internal(format!("HMAC key: {e}")))
}

// ── Opaque tokens ───────────────────────────────────────────────────────────

/// Generate a random 32-byte token, hex-encoded.
pub fn generate_token() -> Result<String, ServiceError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok(hex::encode(bytes))
}

/// SHA-256 of a token for storage and lookup, hex-encoded.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn password_roundtrip() {
        let (hash, salt) = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash, &salt));
        assert!(!verify_password("wrong horse", &hash, &salt));
        assert!(!verify_password("correct horse", "zz", &salt));
    }

    #[test]
    fn jwt_accepts_valid_and_rejects_expired() {
        let token = sign_jwt("dentist-1", SECRET, 1_000).unwrap();
        assert_eq!(verify_jwt(&token, SECRET, 1_000).unwrap(), "dentist-1");
        assert_eq!(
            verify_jwt(&token, SECRET, 1_000 + JWT_EXPIRY_SECS - 1).unwrap(),
            "dentist-1"
        );
        let err = verify_jwt(&token, SECRET, 1_000 + JWT_EXPIRY_SECS).unwrap_err();
        assert_eq!(err.message(), "token expired");
    }

    #[test]
    fn jwt_rejects_tampering() {
        let token = sign_jwt("dentist-1", SECRET, 1_000).unwrap();
        assert!(verify_jwt(&token, "other-secret", 1_000).is_err());

        let forged_payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"dentist-2","iat":1000,"exp":9999}"#);
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_payload;
        assert!(verify_jwt(&parts.join("."), SECRET, 1_000).is_err());

        assert!(verify_jwt("a.b", SECRET, 1_000).is_err());
        assert!(verify_jwt(&format!("{token}.extra"), SECRET, 1_000).is_err());
    }

    #[test]
    fn tokens_are_random_and_hash_stably() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), a);
    }
}
