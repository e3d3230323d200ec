//! Google Sheets API client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::types::{CellMatrix, ValueRange};
use crate::auth::AuthProvider;
use crate::config::Config;
use crate::credentials::{CredentialLoader, CredentialSource};
use crate::error::{ConfigError, SheetsError};
use crate::metrics;

/// Something that can read a range of cells.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Reads `range` (A1 notation) and returns its cells.
    async fn fetch_range(&self, range: &str) -> Result<CellMatrix, SheetsError>;
}

/// Builds the shared outbound HTTP client.
pub fn build_http_client(timeout: Duration) -> Result<Client, ConfigError> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?)
}

/// Reads values from one spreadsheet.
#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    auth: Arc<dyn AuthProvider>,
    base_url: Url,
    spreadsheet_id: String,
}

impl SheetsClient {
    /// Creates a client for `spreadsheet_id`.
    pub fn new(
        http: Client,
        auth: Arc<dyn AuthProvider>,
        base_url: Url,
        spreadsheet_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth,
            base_url,
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    /// Validates configuration, loads credentials and builds the client.
    ///
    /// Any configuration problem surfaces here rather than on first request.
    pub async fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let source = CredentialSource::from_config(config)?;
        Self::from_source(config, &source).await
    }

    /// Like [`SheetsClient::from_config`], with an already selected source.
    pub async fn from_source(
        config: &Config,
        source: &CredentialSource,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let spreadsheet_id = config
            .spreadsheet_id()
            .ok_or(ConfigError::MissingSpreadsheetId)?
            .to_string();
        let base_url = Url::parse(&config.sheets_api_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("SHEETS_API_URL: {}", e)))?;

        let http = build_http_client(config.http_timeout())?;
        let auth = CredentialLoader::new(http.clone(), config)
            .load(source)
            .await?;

        Ok(Self::new(http, auth, base_url, spreadsheet_id))
    }

    /// Spreadsheet identifier in use.
    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// Token provider in use.
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    fn values_url(&self, range: &str) -> Result<Url, SheetsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::Network("SHEETS_API_URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "FORMATTED_VALUE");
        Ok(url)
    }

    async fn read_values(&self, range: &str) -> Result<CellMatrix, SheetsError> {
        let url = self.values_url(range)?;
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| SheetsError::Parse(e.without_url().to_string()))?;
        debug!(
            range = body.range.as_deref().unwrap_or(range),
            "Received value range"
        );

        Ok(body.into_matrix())
    }
}

#[async_trait]
impl RangeReader for SheetsClient {
    #[instrument(skip(self), fields(spreadsheet_id = %self.spreadsheet_id))]
    async fn fetch_range(&self, range: &str) -> Result<CellMatrix, SheetsError> {
        info!("Using spreadsheet ID: {}", self.spreadsheet_id);
        let start = Instant::now();

        let result = self.read_values(range).await;
        match &result {
            Ok(matrix) => {
                debug!(rows = matrix.len(), "Fetched range");
                metrics::record_sheet_fetch(start, "ok");
            }
            Err(e) => metrics::record_sheet_fetch(start, e.kind()),
        }
        result
    }
}

impl std::fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsClient")
            .field("base_url", &self.base_url.as_str())
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("auth", &self.auth.describe())
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Option<Vec<ErrorItem>>,
    #[serde(default)]
    details: Option<Vec<ErrorInfo>>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorInfo {
    #[serde(default)]
    reason: Option<String>,
}

/// Maps a non-success API response to a [`SheetsError`].
async fn error_from_response(response: reqwest::Response) -> SheetsError {
    let status = response.status();
    let retry_after_seconds = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let body = response.bytes().await.unwrap_or_default();
    let detail = serde_json::from_slice::<ErrorResponse>(&body).ok().map(|e| e.error);

    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    let reasons: Vec<String> = detail
        .map(|d| {
            let mut reasons: Vec<String> = d
                .errors
                .unwrap_or_default()
                .into_iter()
                .filter_map(|e| e.reason)
                .chain(d.details.unwrap_or_default().into_iter().filter_map(|i| i.reason))
                .collect();
            reasons.extend(d.status);
            reasons
        })
        .unwrap_or_default();

    let rate_limited = reasons.iter().any(|r| {
        matches!(
            r.as_str(),
            "rateLimitExceeded"
                | "userRateLimitExceeded"
                | "RATE_LIMIT_EXCEEDED"
                | "RESOURCE_EXHAUSTED"
                | "quotaExceeded"
        )
    });

    match status {
        StatusCode::UNAUTHORIZED => SheetsError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => SheetsError::RateLimited {
            message,
            retry_after_seconds,
        },
        StatusCode::FORBIDDEN if rate_limited => SheetsError::RateLimited {
            message,
            retry_after_seconds,
        },
        StatusCode::FORBIDDEN => SheetsError::PermissionDenied(message),
        StatusCode::NOT_FOUND => SheetsError::NotFound(message),
        StatusCode::BAD_REQUEST => SheetsError::InvalidRange(message),
        _ => SheetsError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
