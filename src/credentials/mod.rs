//! Credential source selection and loading.
//!
//! A deployment uses exactly one [`CredentialSource`]:
//!
//! - **Inline**: `GOOGLE_CLIENT_EMAIL` + `GOOGLE_PRIVATE_KEY`
//! - **Keyfile**: `GOOGLE_KEYFILE_PATH`
//! - **Ambient**: Application Default Credentials discovered from the host
//!
//! `CREDENTIAL_SOURCE` picks one explicitly. Otherwise the source is inferred
//! from which variables are set, and setting both inline and keyfile
//! variables is rejected.

mod ambient;
mod keyfile;

pub use ambient::{well_known_file, AmbientDiscovery};
pub use keyfile::{normalize_private_key, AuthorizedUserKey, CredentialsFile, ServiceAccountKey};

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use strum::{Display, EnumString};
use tracing::{info, warn};

use crate::auth::{scopes, AuthProvider, ServiceAccountProvider, TOKEN_URL};
use crate::config::Config;
use crate::error::ConfigError;

/// Credential source names accepted by `CREDENTIAL_SOURCE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CredentialKind {
    /// Email and private key from the environment.
    Inline,
    /// Service account JSON key file.
    Keyfile,
    /// Application Default Credentials.
    Ambient,
}

/// Where the service account credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Email and private key supplied directly.
    Inline {
        /// Service account email.
        client_email: String,
        /// PEM private key with newlines normalized.
        private_key: SecretString,
        /// Optional key id.
        private_key_id: Option<String>,
    },
    /// JSON key file on disk.
    Keyfile {
        /// Path to the key file.
        path: PathBuf,
    },
    /// Discovered from the hosting environment.
    Ambient,
}

impl CredentialSource {
    /// Selects the credential source from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let email = config.client_email();
        let key = config
            .google_private_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty());
        let keyfile = config.keyfile_path();
        let inline_present = email.is_some() || key.is_some();

        let kind = match config.credential_source_name() {
            Some(name) => {
                let kind = name
                    .parse::<CredentialKind>()
                    .map_err(|_| ConfigError::UnknownCredentialSource(name.to_string()))?;
                if kind != CredentialKind::Inline && inline_present {
                    warn!(source = %kind, "Ignoring GOOGLE_CLIENT_EMAIL/GOOGLE_PRIVATE_KEY");
                }
                if kind != CredentialKind::Keyfile && keyfile.is_some() {
                    warn!(source = %kind, "Ignoring GOOGLE_KEYFILE_PATH");
                }
                kind
            }
            None => match (inline_present, keyfile.is_some()) {
                (true, true) => return Err(ConfigError::ConflictingCredentialSources),
                (true, false) => CredentialKind::Inline,
                (false, true) => CredentialKind::Keyfile,
                (false, false) => CredentialKind::Ambient,
            },
        };

        match kind {
            CredentialKind::Inline => {
                let client_email = email.ok_or(ConfigError::IncompleteInlineCredentials {
                    missing: "GOOGLE_CLIENT_EMAIL",
                })?;
                let private_key = key.ok_or(ConfigError::IncompleteInlineCredentials {
                    missing: "GOOGLE_PRIVATE_KEY",
                })?;

                Ok(CredentialSource::Inline {
                    client_email: client_email.to_string(),
                    private_key: SecretString::new(normalize_private_key(
                        private_key.expose_secret(),
                    )),
                    private_key_id: config
                        .google_private_key_id
                        .clone()
                        .filter(|id| !id.trim().is_empty()),
                })
            }
            CredentialKind::Keyfile => {
                let path = keyfile.ok_or(ConfigError::MissingKeyfilePath)?;
                Ok(CredentialSource::Keyfile {
                    path: PathBuf::from(path),
                })
            }
            CredentialKind::Ambient => Ok(CredentialSource::Ambient),
        }
    }

    /// Which kind of source this is.
    pub fn kind(&self) -> CredentialKind {
        match self {
            CredentialSource::Inline { .. } => CredentialKind::Inline,
            CredentialSource::Keyfile { .. } => CredentialKind::Keyfile,
            CredentialSource::Ambient => CredentialKind::Ambient,
        }
    }
}

/// Builds token providers from a [`CredentialSource`].
#[derive(Debug, Clone)]
pub struct CredentialLoader {
    http: Client,
    scopes: Vec<String>,
    token_url: Option<String>,
    ambient: AmbientDiscovery,
}

impl CredentialLoader {
    /// Creates a loader using the given client, scoped to spreadsheets.
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            scopes: vec![scopes::SPREADSHEETS.to_string()],
            token_url: config.token_url_override().map(str::to_string),
            ambient: AmbientDiscovery::from_config(config),
        }
    }

    /// Resolves the source into a ready token provider.
    ///
    /// Everything that can be checked locally is checked here, so a bad
    /// deployment fails before serving traffic.
    pub async fn load(&self, source: &CredentialSource) -> Result<Arc<dyn AuthProvider>, ConfigError> {
        let provider: Arc<dyn AuthProvider> = match source {
            CredentialSource::Inline {
                client_email,
                private_key,
                private_key_id,
            } => {
                let mut provider = ServiceAccountProvider::new(
                    self.http.clone(),
                    client_email.clone(),
                    private_key,
                    self.scopes.clone(),
                )?
                .with_token_url(self.token_url.as_deref().unwrap_or(TOKEN_URL));
                if let Some(key_id) = private_key_id {
                    provider = provider.with_private_key_id(key_id.clone());
                }
                Arc::new(provider)
            }
            CredentialSource::Keyfile { path } => match CredentialsFile::read(path)? {
                CredentialsFile::ServiceAccount(key) => Arc::new(self.service_account(&key)?),
                CredentialsFile::AuthorizedUser(_) => {
                    return Err(ConfigError::UnsupportedCredentialType(
                        "authorized_user (use the ambient source for gcloud user credentials)"
                            .to_string(),
                    ))
                }
            },
            CredentialSource::Ambient => self.ambient.discover(self).await?,
        };

        info!(
            source = %source.kind(),
            identity = %provider.describe(),
            "Credentials loaded"
        );
        Ok(provider)
    }

    /// Builds a service account provider from key file contents.
    pub(crate) fn service_account(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<ServiceAccountProvider, ConfigError> {
        let token_url = self
            .token_url
            .as_deref()
            .or(key.token_uri.as_deref())
            .unwrap_or(TOKEN_URL);

        let mut provider = ServiceAccountProvider::new(
            self.http.clone(),
            key.client_email.clone(),
            &key.secret_key(),
            self.scopes.clone(),
        )?
        .with_token_url(token_url);
        if let Some(key_id) = &key.private_key_id {
            provider = provider.with_private_key_id(key_id.clone());
        }
        Ok(provider)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub(crate) fn token_url(&self) -> Option<&str> {
        self.token_url.as_deref()
    }
}
