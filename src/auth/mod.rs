//! OAuth access tokens for the Google Sheets API.
//!
//! Three providers produce bearer tokens:
//! - [`ServiceAccountProvider`]: signs an RS256 JWT and exchanges it at the
//!   token endpoint (inline credentials, keyfiles and ADC service account files)
//! - [`AuthorizedUserProvider`]: refresh-token flow for gcloud user credentials
//! - [`MetadataServerProvider`]: the GCE / Cloud Run metadata server
//!
//! Every provider caches its token and refreshes it 5 minutes before expiry,
//! or halfway through its lifetime for tokens shorter than 10 minutes.

mod authorized_user;
mod metadata;
mod service_account;

pub use authorized_user::AuthorizedUserProvider;
pub use metadata::{probe_metadata_server, MetadataServerProvider, DEFAULT_METADATA_HOST};
pub use service_account::ServiceAccountProvider;

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::metrics;

/// Default Google OAuth2 token URL.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh tokens this many seconds before they expire.
pub const TOKEN_EXPIRY_BUFFER_SECONDS: i64 = 300;

/// JWT lifetime for service account assertions (1 hour).
pub const JWT_LIFETIME_SECONDS: i64 = 3600;

/// OAuth 2.0 scopes for Google Sheets.
pub mod scopes {
    /// Read/write access to spreadsheets.
    pub const SPREADSHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";
}

/// Source of bearer tokens for API requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Get an access token, reusing the cached one while it is fresh.
    async fn access_token(&self) -> Result<AccessToken, AuthError>;

    /// Human readable identity, never containing secrets.
    fn describe(&self) -> String;
}

/// Access token with metadata.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The token string.
    pub token: SecretString,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// When the token was obtained.
    pub issued_at: DateTime<Utc>,

    /// Expiration time.
    pub expires_at: DateTime<Utc>,

    /// Scopes granted.
    pub scopes: Vec<String>,
}

impl AccessToken {
    /// Creates a new access token.
    pub fn new(
        token: impl Into<String>,
        token_type: impl Into<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            token: SecretString::new(token.into()),
            token_type: token_type.into(),
            issued_at: Utc::now(),
            expires_at,
            scopes,
        }
    }

    /// Checks if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Checks if the token is within the refresh buffer.
    ///
    /// The buffer is capped at half the token's lifetime, so short-lived
    /// tokens are still reused.
    pub fn needs_refresh(&self) -> bool {
        let buffer = Duration::seconds(TOKEN_EXPIRY_BUFFER_SECONDS)
            .min((self.expires_at - self.issued_at) / 2);
        Utc::now() >= self.expires_at - buffer
    }

    /// Returns the authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.token.expose_secret())
    }
}

/// Single-slot token cache shared by the providers.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    slot: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    /// Returns the cached token or runs `refresh` to obtain a new one.
    ///
    /// Refreshes are serialized: concurrent callers wait on the write lock
    /// and pick up the token stored by whoever got there first.
    pub(crate) async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<AccessToken, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, AuthError>>,
    {
        {
            let cached = self.slot.read().await;
            if let Some(token) = cached.as_ref().filter(|t| !t.needs_refresh()) {
                return Ok(token.clone());
            }
        }

        let mut slot = self.slot.write().await;
        if let Some(token) = slot.as_ref().filter(|t| !t.needs_refresh()) {
            return Ok(token.clone());
        }

        let token = refresh().await?;
        *slot = Some(token.clone());
        Ok(token)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Turns a token endpoint response into an [`AccessToken`].
///
/// Shared by every provider; records the outcome in metrics.
pub(crate) async fn read_token_response(
    response: reqwest::Response,
    scopes: &[String],
) -> Result<AccessToken, AuthError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<TokenErrorResponse>(&body)
            .map(|e| match e.error_description {
                Some(description) => format!("{}: {}", e.error, description),
                None => e.error,
            })
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));

        metrics::inc_token_refresh("rejected");
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let token: TokenResponse = response.json().await.map_err(|e| {
        metrics::inc_token_refresh("invalid");
        AuthError::InvalidResponse(e.to_string())
    })?;

    metrics::inc_token_refresh("ok");
    let expires_at = Utc::now() + Duration::seconds(token.expires_in);

    Ok(AccessToken::new(
        token.access_token,
        token.token_type,
        expires_at,
        scopes.to_vec(),
    ))
}

/// Maps a transport failure talking to a token endpoint.
pub(crate) fn request_failed(err: reqwest::Error) -> AuthError {
    metrics::inc_token_refresh("unreachable");
    AuthError::RequestFailed(err.without_url().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn access_token_expiry() {
        let expires_at = Utc::now() + Duration::hours(1);
        let token = AccessToken::new("test_token", "Bearer", expires_at, vec![]);
        assert!(!token.is_expired());

        let expired = Utc::now() - Duration::hours(1);
        let token = AccessToken::new("test_token", "Bearer", expired, vec![]);
        assert!(token.is_expired());
    }

    #[test]
    fn access_token_needs_refresh_inside_buffer() {
        let expires_at = Utc::now() + Duration::hours(1);
        let mut token = AccessToken::new("test_token", "Bearer", expires_at, vec![]);
        assert!(!token.needs_refresh());

        token.issued_at = Utc::now() - Duration::minutes(56);
        token.expires_at = Utc::now() + Duration::minutes(4);
        assert!(token.needs_refresh());
    }

    #[test]
    fn short_lived_token_is_fresh_when_issued() {
        let expires_at = Utc::now() + Duration::seconds(250);
        let mut token = AccessToken::new("test_token", "Bearer", expires_at, vec![]);
        assert!(!token.needs_refresh());

        token.issued_at = Utc::now() - Duration::seconds(200);
        token.expires_at = Utc::now() + Duration::seconds(50);
        assert!(token.needs_refresh());
    }

    #[test]
    fn authorization_header_format() {
        let expires_at = Utc::now() + Duration::hours(1);
        let token = AccessToken::new("test_token", "Bearer", expires_at, vec![]);
        assert_eq!(token.authorization_header(), "Bearer test_token");
    }

    #[test]
    fn token_debug_is_redacted() {
        let expires_at = Utc::now() + Duration::hours(1);
        let token = AccessToken::new("ya29.very-secret", "Bearer", expires_at, vec![]);
        assert!(!format!("{:?}", token).contains("ya29.very-secret"));
    }

    #[tokio::test]
    async fn cache_reuses_fresh_token() {
        let cache = TokenCache::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..3 {
            let token = cache
                .get_or_refresh(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(AccessToken::new(
                        "fresh",
                        "Bearer",
                        Utc::now() + Duration::hours(1),
                        vec![],
                    ))
                })
                .await
                .unwrap();
            assert_eq!(token.authorization_header(), "Bearer fresh");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_refreshes_stale_token() {
        let cache = TokenCache::default();
        cache
            .get_or_refresh(|| async {
                Ok(AccessToken::new(
                    "stale",
                    "Bearer",
                    Utc::now() - Duration::seconds(1),
                    vec![],
                ))
            })
            .await
            .unwrap();

        let token = cache
            .get_or_refresh(|| async {
                Ok(AccessToken::new(
                    "renewed",
                    "Bearer",
                    Utc::now() + Duration::hours(1),
                    vec![],
                ))
            })
            .await
            .unwrap();

        assert_eq!(token.authorization_header(), "Bearer renewed");
    }

    #[tokio::test]
    async fn cache_reuses_short_lived_token() {
        let cache = TokenCache::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..3 {
            cache
                .get_or_refresh(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(AccessToken::new(
                        "short",
                        "Bearer",
                        Utc::now() + Duration::seconds(250),
                        vec![],
                    ))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_keeps_nothing_on_failure() {
        let cache = TokenCache::default();

        let result = cache
            .get_or_refresh(|| async {
                Err(AuthError::RequestFailed("connection refused".to_string()))
            })
            .await;
        assert!(result.is_err());

        let token = cache
            .get_or_refresh(|| async {
                Ok(AccessToken::new(
                    "second",
                    "Bearer",
                    Utc::now() + Duration::hours(1),
                    vec![],
                ))
            })
            .await
            .unwrap();
        assert_eq!(token.authorization_header(), "Bearer second");
    }
}
