//! Shared JWT authentication utilities for the REST surface.
//!
//! Token issuance belongs to the external auth service; Parley only needs to
//! validate bearer tokens and read the caller identity out of them.
//! [`issue_token`] exists for tests and local tooling.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims embedded in access tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as string)
    pub sub: String,
    /// Username
    pub username: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Validate and decode a JWT token.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Mint an access token for `user_id`.
pub fn issue_token(
    user_id: Uuid,
    username: &str,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        iat: now,
        exp: now + ttl_secs as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates() {
        let uid = Uuid::new_v4();
        let token = issue_token(uid, "rosa", "secret", 60).unwrap();
        let claims = validate_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, uid.to_string());
        assert_eq!(claims.username, "rosa");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(Uuid::new_v4(), "rosa", "secret", 60).unwrap();
        assert!(validate_token(&token, "other").is_err());
    }
}
