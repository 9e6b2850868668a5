//! Token verification (bearer JWTs) and the logout denylist.
//!
//! Verification is purely local except for the denylist lookup, which is a
//! single coordination-store read keyed by the token fingerprint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};

use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};
use tracing::warn;

use tradeline_contracts::{Role, TokenClaims};
use tradeline_coordination::{keys, CoordStore, StoreError};

/// Tolerated clock skew between token issuer and gateway.
const CLOCK_SKEW_SECS: u64 = 30;

/// Verified identity attached to a request
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token_fingerprint: String,
}

impl Identity {
    /// Remaining token lifetime; zero once expired.
    pub fn remaining_lifetime(&self) -> Duration {
        let secs = (self.expires_at - Utc::now()).num_seconds().max(0) as u64;
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header missing")]
    Missing,
    #[error("bearer token malformed")]
    Malformed,
    #[error("bearer token signature invalid")]
    BadSignature,
    #[error("bearer token expired")]
    Expired,
    #[error("bearer token revoked")]
    Revoked,
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Malformed => "malformed",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::Revoked => "revoked",
        }
    }
}

/// Keccak256 fingerprint of the raw bearer string (hex encoded).
pub fn fingerprint(bearer: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bearer.as_bytes());
    hasher.finalize(&mut output);
    hex::encode(output)
}

/// Extract the bearer token from an `Authorization` header value.
pub fn bearer_from_header(value: Option<&str>) -> Result<&str, AuthError> {
    let value = value.ok_or(AuthError::Missing)?;
    let token = value.strip_prefix("Bearer ").ok_or(AuthError::Malformed)?;
    if token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

/// Verifies bearer tokens and manages the revocation denylist.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    store: Arc<dyn CoordStore>,
}

impl TokenVerifier {
    pub fn new(jwt_secret: &str, store: Arc<dyn CoordStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
            store,
        }
    }

    /// Verify a bearer token: signature, expiry, then the denylist.
    ///
    /// The denylist read fails open: a store outage must not lock every
    /// authenticated user out of the platform.
    pub async fn verify(&self, bearer: &str) -> Result<Identity, AuthError> {
        let data = decode::<TokenClaims>(bearer, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::Malformed,
            }
        })?;

        let claims = data.claims;
        let role: Role = claims.role.parse().map_err(|_| AuthError::Malformed)?;
        let issued_at = Utc
            .timestamp_opt(claims.iat, 0)
            .single()
            .ok_or(AuthError::Malformed)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AuthError::Malformed)?;

        let token_fingerprint = fingerprint(bearer);
        match self.store.exists(&keys::denylist(&token_fingerprint)).await {
            Ok(true) => return Err(AuthError::Revoked),
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Denylist lookup failed, allowing token");
            }
        }

        Ok(Identity {
            subject: claims.sub,
            role,
            issued_at,
            expires_at,
            token_fingerprint,
        })
    }

    /// Record a token fingerprint in the denylist. `ttl` must cover the
    /// remaining token lifetime.
    pub async fn denylist(&self, token_fingerprint: &str, ttl: Duration) -> Result<(), StoreError> {
        // Floor of one window so a token expiring right now is still barred
        let ttl = ttl.max(Duration::from_secs(CLOCK_SKEW_SECS));
        self.store
            .set(&keys::denylist(token_fingerprint), "revoked", Some(ttl))
            .await
    }
}
