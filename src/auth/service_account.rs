//! Service account authentication using signed JWT assertions.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{
    read_token_response, request_failed, AccessToken, AuthProvider, TokenCache,
    JWT_LIFETIME_SECONDS, TOKEN_URL,
};
use crate::error::{AuthError, ConfigError};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Service account authentication provider.
///
/// The PEM key is parsed once at construction, so a malformed key fails at
/// startup. Only the parsed signing key is retained.
pub struct ServiceAccountProvider {
    client_email: String,
    signing_key: EncodingKey,
    private_key_id: Option<String>,
    scopes: Vec<String>,
    token_url: String,
    cache: TokenCache,
    http: Client,
}

impl ServiceAccountProvider {
    /// Creates a provider from an email and PEM private key.
    pub fn new(
        http: Client,
        client_email: impl Into<String>,
        private_key: &SecretString,
        scopes: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let signing_key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes())
            .map_err(|e| ConfigError::MalformedPrivateKey(e.to_string()))?;

        Ok(Self {
            client_email: client_email.into(),
            signing_key,
            private_key_id: None,
            scopes,
            token_url: TOKEN_URL.to_string(),
            cache: TokenCache::default(),
            http,
        })
    }

    /// Sets the private key ID, sent as the JWT `kid`.
    pub fn with_private_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.private_key_id = Some(key_id.into());
        self
    }

    /// Sets a custom token URL.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Token endpoint in use.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn create_jwt(&self) -> Result<String, AuthError> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: String,
            aud: &'a str,
            exp: i64,
            iat: i64,
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: self.scopes.join(" "),
            aud: &self.token_url,
            exp: now + JWT_LIFETIME_SECONDS,
            iat: now,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        encode(&header, &claims, &self.signing_key)
            .map_err(|e| AuthError::JwtEncoding(e.to_string()))
    }

    #[instrument(skip(self), fields(client_email = %self.client_email))]
    async fn exchange_jwt_for_token(&self) -> Result<AccessToken, AuthError> {
        let assertion = self.create_jwt()?;
        debug!("Exchanging service account assertion for access token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(request_failed)?;

        read_token_response(response, &self.scopes).await
    }
}

#[async_trait]
impl AuthProvider for ServiceAccountProvider {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.cache
            .get_or_refresh(|| self.exchange_jwt_for_token())
            .await
    }

    fn describe(&self) -> String {
        format!("service account {}", self.client_email)
    }
}

impl fmt::Debug for ServiceAccountProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountProvider")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("scopes", &self.scopes)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}
