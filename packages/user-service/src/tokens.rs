//! Bearer token issuing. The gateway verifies with the same shared secret.

use chrono::Utc;
use eyre::{Result, WrapErr};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use tradeline_contracts::TokenClaims;

/// Issue an HS256 token for `subject` with `role`, valid for `ttl_secs`.
pub fn issue(subject: &str, role: &str, secret: &str, ttl_secs: u64) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = TokenClaims {
        sub: subject.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + ttl_secs as i64,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .wrap_err("Failed to sign bearer token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    #[test]
    fn test_issued_token_round_trips() {
        let token = issue("alice", "customer", "test-secret-key-1234567890", 3600).unwrap();
        let data = decode::<TokenClaims>(
            &token,
            &DecodingKey::from_secret(b"test-secret-key-1234567890"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "alice");
        assert_eq!(data.claims.role, "customer");
        assert!(data.claims.exp > data.claims.iat);
    }

    #[test]
    fn test_each_token_gets_fresh_jti() {
        let a = issue("alice", "customer", "test-secret-key-1234567890", 3600).unwrap();
        let b = issue("alice", "customer", "test-secret-key-1234567890", 3600).unwrap();
        assert_ne!(a, b);
    }
}
