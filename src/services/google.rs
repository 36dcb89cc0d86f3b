//! Google sign-in
//!
//! Authorization code flow: the visitor is sent to Google's consent page,
//! the returned code is exchanged for an id token, and the id token is
//! checked against Google's tokeninfo endpoint.

use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GoogleConfig;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const TOKENINFO_ENDPOINT: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    /// Client id or secret missing from the configuration
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Invalid Google token: {0}")]
    InvalidToken(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Profile taken from a verified id token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleProfile {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Fields of the tokeninfo response; booleans arrive as strings
#[derive(Debug, Deserialize)]
pub(crate) struct TokenInfo {
    aud: Option<String>,
    email: Option<String>,
    email_verified: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleAuthService {
    config: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleAuthService {
    pub fn new(config: GoogleConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    fn credentials(&self) -> Result<(&str, &str), GoogleAuthError> {
        match (self.config.client_id.as_deref(), self.config.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok((id, secret)),
            _ => Err(GoogleAuthError::NotConfigured),
        }
    }

    /// Consent page URL carrying `state`
    pub fn authorization_url(&self, state: &str) -> Result<String, GoogleAuthError> {
        let (client_id, _) = self.credentials()?;
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&access_type=online&state={}",
            AUTH_ENDPOINT,
            urlencoding::encode(client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(state)
        ))
    }

    /// Exchange an authorization code and verify the resulting id token
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, GoogleAuthError> {
        let (client_id, client_secret) = self.credentials()?;

        let response: TokenResponse = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("Failed to reach Google token endpoint")?
            .json()
            .await
            .map_err(|_| GoogleAuthError::TokenExchange("invalid token response".to_string()))?;

        if let Some(error) = response.error {
            return Err(GoogleAuthError::TokenExchange(
                response.error_description.unwrap_or(error),
            ));
        }
        let id_token = response
            .id_token
            .ok_or_else(|| GoogleAuthError::TokenExchange("no id_token returned".to_string()))?;

        let info: TokenInfo = self
            .client
            .get(TOKENINFO_ENDPOINT)
            .query(&[("id_token", id_token.as_str())])
            .send()
            .await
            .context("Failed to reach Google tokeninfo endpoint")?
            .error_for_status()
            .map_err(|e| GoogleAuthError::InvalidToken(e.to_string()))?
            .json()
            .await
            .map_err(|e| GoogleAuthError::InvalidToken(e.to_string()))?;

        let profile = profile_from_token_info(info, client_id)?;
        tracing::debug!("Verified Google account {}", profile.email);
        Ok(profile)
    }
}

/// Check audience and email verification of a tokeninfo response
pub(crate) fn profile_from_token_info(
    info: TokenInfo,
    client_id: &str,
) -> Result<GoogleProfile, GoogleAuthError> {
    if info.aud.as_deref() != Some(client_id) {
        return Err(GoogleAuthError::InvalidToken("audience mismatch".to_string()));
    }
    if info.email_verified.as_deref() != Some("true") {
        return Err(GoogleAuthError::InvalidToken("email not verified".to_string()));
    }
    let email = info
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| GoogleAuthError::InvalidToken("Google profile did not return email".to_string()))?;

    Ok(GoogleProfile {
        email,
        name: info.name.unwrap_or_default(),
        picture: info.picture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> GoogleAuthService {
        GoogleAuthService::new(GoogleConfig {
            client_id: Some("client-123".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_uri: "http://localhost:8080/api/auth/google/callback".to_string(),
        })
        .unwrap()
    }

    fn info(aud: &str, verified: &str) -> TokenInfo {
        serde_json::from_value(serde_json::json!({
            "aud": aud,
            "email": "ana@example.com",
            "email_verified": verified,
            "name": "Ana",
            "sub": "1234"
        }))
        .unwrap()
    }

    #[test]
    fn test_authorization_url() {
        let url = configured().authorization_url("abc").unwrap();
        assert!(url.starts_with(AUTH_ENDPOINT));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("state=abc"));

        let disabled = GoogleAuthService::new(GoogleConfig::default()).unwrap();
        assert!(!disabled.is_enabled());
        assert!(matches!(
            disabled.authorization_url("abc"),
            Err(GoogleAuthError::NotConfigured)
        ));
    }

    #[test]
    fn test_token_info_checks() {
        let profile = profile_from_token_info(info("client-123", "true"), "client-123").unwrap();
        assert_eq!(profile.email, "ana@example.com");
        assert_eq!(profile.name, "Ana");
        assert_eq!(profile.picture, None);

        assert!(profile_from_token_info(info("other", "true"), "client-123").is_err());
        assert!(profile_from_token_info(info("client-123", "false"), "client-123").is_err());
    }
}
