//! Operator JWTs
//!
//! HS256 tokens carrying the ERP user (`username`, `codusu`). The token is
//! also the session key in the registry, so each one carries a `jti`.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub username: String,
    pub codusu: i64,
    pub jti: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, username: &str, codusu: i64) -> Result<String, AuthError> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            username: username.to_string(),
            codusu,
            jti: uuid::Uuid::new_v4().to_string(),
            exp: now + self.ttl.as_secs() as usize,
            iat: now,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("token encode: {}", e)))
    }

    /// Verify signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}
