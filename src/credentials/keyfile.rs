//! Google credential JSON files.

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Replaces literal `\n` escape sequences with real newlines.
///
/// Keys passed through environment variables usually arrive with their
/// newlines escaped.
pub fn normalize_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}

/// A credentials file as written by the Cloud console or gcloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsFile {
    /// `"type": "service_account"`
    ServiceAccount(ServiceAccountKey),
    /// `"type": "authorized_user"`
    AuthorizedUser(AuthorizedUserKey),
}

/// Service account key fields used for token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountKey {
    /// Service account email.
    pub client_email: String,
    /// PEM private key, already normalized.
    pub private_key: String,
    /// Key id for the JWT header.
    pub private_key_id: Option<String>,
    /// Token endpoint from the file.
    pub token_uri: Option<String>,
    /// Owning project.
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Private key wrapped as a secret.
    pub fn secret_key(&self) -> SecretString {
        SecretString::new(self.private_key.clone())
    }
}

/// gcloud user credential fields.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizedUserKey {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

impl std::fmt::Debug for AuthorizedUserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserKey")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RawCredentials {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    client_email: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl CredentialsFile {
    /// Reads and parses a credentials file.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialsFileRead {
                path: display.clone(),
                source,
            })?;

        Self::parse(&display, &contents)
    }

    /// Parses credentials JSON. `origin` names the source in errors.
    ///
    /// A missing `type` is read as a service account, which is what keys
    /// downloaded from the console look like once trimmed.
    pub fn parse(origin: &str, contents: &str) -> Result<Self, ConfigError> {
        let raw: RawCredentials =
            serde_json::from_str(contents).map_err(|source| ConfigError::CredentialsFileParse {
                path: origin.to_string(),
                source,
            })?;

        let required = |value: Option<String>, field: &'static str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingCredentialField {
                    path: origin.to_string(),
                    field,
                })
        };

        match raw.kind.as_deref().unwrap_or("service_account") {
            "service_account" => Ok(CredentialsFile::ServiceAccount(ServiceAccountKey {
                client_email: required(raw.client_email, "client_email")?,
                private_key: normalize_private_key(&required(raw.private_key, "private_key")?),
                private_key_id: raw.private_key_id,
                token_uri: raw.token_uri,
                project_id: raw.project_id,
            })),
            "authorized_user" => Ok(CredentialsFile::AuthorizedUser(AuthorizedUserKey {
                client_id: required(raw.client_id, "client_id")?,
                client_secret: required(raw.client_secret, "client_secret")?,
                refresh_token: required(raw.refresh_token, "refresh_token")?,
            })),
            other => Err(ConfigError::UnsupportedCredentialType(other.to_string())),
        }
    }
}
