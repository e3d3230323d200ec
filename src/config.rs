//! Application configuration loaded from environment variables.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Spreadsheet ===
    /// Spreadsheet identifier (required).
    #[serde(default)]
    pub sheet_id: Option<String>,

    /// Range served by `/api/data`.
    #[serde(default = "default_sheet_range")]
    pub sheet_range: String,

    // === Credential Selection ===
    /// Explicit credential source: inline, keyfile or ambient.
    #[serde(default)]
    pub credential_source: Option<String>,

    // === Inline Credentials ===
    /// Service account email.
    #[serde(default)]
    pub google_client_email: Option<String>,

    /// Service account private key (PEM, escaped newlines allowed).
    #[serde(default)]
    pub google_private_key: Option<SecretString>,

    /// Private key id, sent as the JWT `kid`.
    #[serde(default)]
    pub google_private_key_id: Option<String>,

    // === Keyfile Credentials ===
    /// Path to a service account JSON key.
    #[serde(default)]
    pub google_keyfile_path: Option<String>,

    // === Ambient Discovery ===
    /// Application Default Credentials file.
    #[serde(default)]
    pub google_application_credentials: Option<String>,

    /// Metadata server host.
    #[serde(default)]
    pub gce_metadata_host: Option<String>,

    /// Home directory, used to locate the gcloud well-known file.
    #[serde(default)]
    pub home: Option<String>,

    /// Windows application data directory.
    #[serde(default)]
    pub appdata: Option<String>,

    // === Endpoints ===
    /// OAuth token endpoint override.
    #[serde(default)]
    pub google_token_url: Option<String>,

    /// Sheets API base URL.
    #[serde(default = "default_sheets_api_url")]
    pub sheets_api_url: String,

    /// Outbound request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Server Configuration ===
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_sheet_range() -> String {
    "Books!A:C".to_string()
}

fn default_sheets_api_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Treats empty strings as unset.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts only absolute `http`/`https` URLs that can carry a path.
fn check_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", name, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(format!(
            "{}: expected an http(s) URL, got {}",
            name, value
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Load configuration from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into()));
        Ok(envy::from_iter(vars)?)
    }

    /// Check that required values are present and well formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spreadsheet_id().is_none() {
            return Err(ConfigError::MissingSpreadsheetId);
        }

        if self.sheet_range.trim().is_empty() {
            return Err(ConfigError::Invalid("SHEET_RANGE must not be empty".to_string()));
        }

        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "HTTP_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        check_http_url("SHEETS_API_URL", &self.sheets_api_url)?;
        if let Some(token_url) = self.token_url_override() {
            check_http_url("GOOGLE_TOKEN_URL", token_url)?;
        }

        Ok(())
    }

    /// Spreadsheet identifier, if set.
    pub fn spreadsheet_id(&self) -> Option<&str> {
        non_empty(&self.sheet_id)
    }

    /// Service account email, if set.
    pub fn client_email(&self) -> Option<&str> {
        non_empty(&self.google_client_email)
    }

    /// Keyfile path, if set.
    pub fn keyfile_path(&self) -> Option<&str> {
        non_empty(&self.google_keyfile_path)
    }

    /// Explicit credential source selector, if set.
    pub fn credential_source_name(&self) -> Option<&str> {
        non_empty(&self.credential_source)
    }

    /// Token endpoint override, if set.
    pub fn token_url_override(&self) -> Option<&str> {
        non_empty(&self.google_token_url)
    }

    /// Outbound request timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}
