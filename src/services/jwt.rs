//! Signed tokens
//!
//! The public API authenticates with an HS256 access token carried in the
//! `access_token_cookie` cookie. The same key signs the short-lived state
//! cookie of the Google OAuth flow.

use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Lifetime of the OAuth state cookie
pub const OAUTH_STATE_MINUTES: i64 = 10;

/// Access token claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl Claims {
    /// User id in `sub`, `None` when it is not a number
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Claims of the OAuth state cookie
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub state: String,
    /// Portal path to return to after login
    pub next: String,
    pub exp: i64,
}

/// Issues and verifies access tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: Duration,
    refresh_window: Duration,
}

impl TokenService {
    pub fn new(secret: &str, expiration_minutes: i64, refresh_window_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration: Duration::minutes(expiration_minutes),
            refresh_window: Duration::minutes(refresh_window_minutes),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.jwt_expiration_minutes,
            config.jwt_refresh_window_minutes,
        )
    }

    /// Token lifetime in seconds, used as cookie `Max-Age`
    pub fn max_age_seconds(&self) -> i64 {
        self.expiration.num_seconds()
    }

    pub fn create_token(&self, user_id: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + self.expiration).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify signature and expiry
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }

    /// Whether a valid token should be reissued
    pub fn needs_refresh(&self, claims: &Claims) -> bool {
        claims.exp - Utc::now().timestamp() < self.refresh_window.num_seconds()
    }

    pub fn create_oauth_state(&self, next: &str) -> Result<(String, String)> {
        let state = Uuid::new_v4().simple().to_string();
        let claims = OAuthState {
            state: state.clone(),
            next: next.to_string(),
            exp: (Utc::now() + Duration::minutes(OAUTH_STATE_MINUTES)).timestamp(),
        };
        let cookie = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((state, cookie))
    }

    pub fn verify_oauth_state(&self, cookie: &str) -> Result<OAuthState> {
        decode::<OAuthState>(cookie, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_verify_token() {
        let service = TokenService::new("secret", 60, 30);
        let token = service.create_token(42).unwrap();

        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        let expires_in = claims.exp - Utc::now().timestamp();
        assert!(expires_in > 59 * 60 && expires_in <= 60 * 60);
        assert!(!service.needs_refresh(&claims));
    }

    #[test]
    fn test_wrong_secret_and_garbage() {
        let token = TokenService::new("secret1", 60, 30).create_token(1).unwrap();
        assert!(TokenService::new("secret2", 60, 30).verify_token(&token).is_err());
        assert!(TokenService::new("secret1", 60, 30).verify_token("not-a-token").is_err());
    }

    #[test]
    fn test_refresh_window() {
        // a 20 minute token is already inside a 30 minute window
        let service = TokenService::new("secret", 20, 30);
        let claims = service.verify_token(&service.create_token(7).unwrap()).unwrap();
        assert!(service.needs_refresh(&claims));
    }

    #[test]
    fn test_oauth_state_round_trip() {
        let service = TokenService::new("secret", 60, 30);
        let (state, cookie) = service.create_oauth_state("/sitios/3").unwrap();

        let decoded = service.verify_oauth_state(&cookie).unwrap();
        assert_eq!(decoded.state, state);
        assert_eq!(decoded.next, "/sitios/3");
        // an access token is not a state cookie
        assert!(service
            .verify_oauth_state(&service.create_token(1).unwrap())
            .is_err());
    }
}
