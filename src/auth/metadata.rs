//! Tokens from the Compute Engine / Cloud Run metadata server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{read_token_response, request_failed, AccessToken, AuthProvider, TokenCache};
use crate::error::AuthError;

/// Default metadata server host.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const SERVICE_ACCOUNT_PATH: &str = "computeMetadata/v1/instance/service-accounts/default";

/// Checks for a reachable metadata server and returns the default service
/// account email when one answers.
///
/// A response only counts when it carries `Metadata-Flavor: Google`; proxies
/// and captive portals answering for the metadata host are ignored.
pub async fn probe_metadata_server(http: &Client, host: &str) -> Option<String> {
    let url = format!("http://{}/{}/email", host, SERVICE_ACCOUNT_PATH);

    let response = http
        .get(&url)
        .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        debug!(status = %response.status(), "Metadata server probe failed");
        return None;
    }

    let flavor = response
        .headers()
        .get(METADATA_FLAVOR.0)
        .and_then(|v| v.to_str().ok());
    if flavor != Some(METADATA_FLAVOR.1) {
        debug!("Metadata probe answered without Metadata-Flavor: Google");
        return None;
    }

    response.text().await.ok().map(|email| email.trim().to_string())
}

/// Provider backed by the metadata server's default service account.
#[derive(Debug)]
pub struct MetadataServerProvider {
    host: String,
    account: Option<String>,
    scopes: Vec<String>,
    cache: TokenCache,
    http: Client,
}

impl MetadataServerProvider {
    /// Creates a provider for the given metadata host.
    pub fn new(http: Client, host: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            host: host.into(),
            account: None,
            scopes,
            cache: TokenCache::default(),
            http,
        }
    }

    /// Records the service account email reported by the probe.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let url = format!("http://{}/{}/token", self.host, SERVICE_ACCOUNT_PATH);
        debug!("Requesting access token from metadata server");

        let response = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .query(&[("scopes", self.scopes.join(","))])
            .send()
            .await
            .map_err(request_failed)?;

        read_token_response(response, &self.scopes).await
    }
}

#[async_trait]
impl AuthProvider for MetadataServerProvider {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.cache.get_or_refresh(|| self.fetch_token()).await
    }

    fn describe(&self) -> String {
        match &self.account {
            Some(account) => format!("metadata server {} ({})", self.host, account),
            None => format!("metadata server {}", self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::scopes;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host_of(server: &MockServer) -> String {
        server.address().to_string()
    }

    #[tokio::test]
    async fn probe_returns_account_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/email", SERVICE_ACCOUNT_PATH)))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Metadata-Flavor", "Google")
                    .set_body_string("runner@project.iam.gserviceaccount.com\n"),
            )
            .mount(&server)
            .await;

        let email = probe_metadata_server(&Client::new(), &host_of(&server)).await;
        assert_eq!(
            email.as_deref(),
            Some("runner@project.iam.gserviceaccount.com")
        );
    }

    #[tokio::test]
    async fn probe_fails_without_metadata_server() {
        let server = MockServer::start().await;
        let email = probe_metadata_server(&Client::new(), &host_of(&server)).await;
        assert!(email.is_none());
    }

    #[tokio::test]
    async fn probe_ignores_server_without_flavor_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/email", SERVICE_ACCOUNT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>portal</html>"))
            .mount(&server)
            .await;

        let email = probe_metadata_server(&Client::new(), &host_of(&server)).await;
        assert!(email.is_none());
    }

    #[tokio::test]
    async fn reuses_short_lived_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/token", SERVICE_ACCOUNT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.short",
                "expires_in": 250,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MetadataServerProvider::new(
            Client::new(),
            host_of(&server),
            vec![scopes::SPREADSHEETS.to_string()],
        );

        for _ in 0..3 {
            provider.access_token().await.unwrap();
        }
    }

    #[tokio::test]
    async fn fetches_scoped_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/token", SERVICE_ACCOUNT_PATH)))
            .and(header("Metadata-Flavor", "Google"))
            .and(query_param("scopes", scopes::SPREADSHEETS))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.metadata",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MetadataServerProvider::new(
            Client::new(),
            host_of(&server),
            vec![scopes::SPREADSHEETS.to_string()],
        );

        let token = provider.access_token().await.unwrap();
        assert_eq!(token.authorization_header(), "Bearer ya29.metadata");
        provider.access_token().await.unwrap();
    }
}
