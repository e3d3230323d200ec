//! Refresh-token authentication for gcloud user credentials.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use super::{read_token_response, request_failed, AccessToken, AuthProvider, TokenCache, TOKEN_URL};
use crate::error::AuthError;

/// Provider for `authorized_user` Application Default Credentials, as
/// written by `gcloud auth application-default login`.
pub struct AuthorizedUserProvider {
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
    scopes: Vec<String>,
    token_url: String,
    cache: TokenCache,
    http: Client,
}

impl AuthorizedUserProvider {
    /// Creates a new provider.
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: SecretString,
        refresh_token: SecretString,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            refresh_token,
            scopes,
            token_url: TOKEN_URL.to_string(),
            cache: TokenCache::default(),
            http,
        }
    }

    /// Sets a custom token URL.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn exchange_refresh_token(&self) -> Result<AccessToken, AuthError> {
        debug!("Refreshing user access token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("refresh_token", self.refresh_token.expose_secret().as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(request_failed)?;

        read_token_response(response, &self.scopes).await
    }
}

#[async_trait]
impl AuthProvider for AuthorizedUserProvider {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.cache
            .get_or_refresh(|| self.exchange_refresh_token())
            .await
    }

    fn describe(&self) -> String {
        format!("authorized user (client {})", self.client_id)
    }
}

impl fmt::Debug for AuthorizedUserProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUserProvider")
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}
