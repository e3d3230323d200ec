//! Application Default Credentials discovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info};

use super::keyfile::CredentialsFile;
use super::CredentialLoader;
use crate::auth::{
    probe_metadata_server, AuthProvider, AuthorizedUserProvider, MetadataServerProvider,
    DEFAULT_METADATA_HOST, TOKEN_URL,
};
use crate::config::Config;
use crate::error::ConfigError;

const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// Location of the gcloud well-known credentials file.
pub fn well_known_file(home: Option<&str>, appdata: Option<&str>) -> Option<PathBuf> {
    if cfg!(windows) {
        appdata.map(|dir| Path::new(dir).join("gcloud").join(WELL_KNOWN_FILE))
    } else {
        home.map(|dir| {
            Path::new(dir)
                .join(".config")
                .join("gcloud")
                .join(WELL_KNOWN_FILE)
        })
    }
}

/// The ADC search chain:
/// `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud well-known file, then
/// the metadata server.
#[derive(Debug, Clone)]
pub struct AmbientDiscovery {
    application_credentials: Option<PathBuf>,
    well_known_file: Option<PathBuf>,
    metadata_host: String,
}

impl AmbientDiscovery {
    /// Builds the chain from configuration.
    pub fn from_config(config: &Config) -> Self {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            application_credentials: non_empty(&config.google_application_credentials)
                .map(PathBuf::from),
            well_known_file: well_known_file(
                non_empty(&config.home).as_deref(),
                non_empty(&config.appdata).as_deref(),
            ),
            metadata_host: non_empty(&config.gce_metadata_host)
                .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
        }
    }

    /// Walks the chain and returns the first usable provider.
    ///
    /// A file named by `GOOGLE_APPLICATION_CREDENTIALS` must be valid; it is
    /// never skipped in favour of later entries.
    pub(crate) async fn discover(
        &self,
        loader: &CredentialLoader,
    ) -> Result<Arc<dyn AuthProvider>, ConfigError> {
        if let Some(path) = &self.application_credentials {
            info!(path = %path.display(), "Using GOOGLE_APPLICATION_CREDENTIALS");
            return self.provider_from_file(loader, path);
        }

        if let Some(path) = self.well_known_file.as_ref().filter(|p| p.is_file()) {
            info!(path = %path.display(), "Using gcloud application default credentials");
            return self.provider_from_file(loader, path);
        }

        debug!(host = %self.metadata_host, "Probing metadata server");
        if let Some(account) = probe_metadata_server(loader.http(), &self.metadata_host).await {
            info!(host = %self.metadata_host, account = %account, "Using metadata server credentials");
            let provider = MetadataServerProvider::new(
                loader.http().clone(),
                self.metadata_host.clone(),
                loader.scopes().to_vec(),
            )
            .with_account(account);
            return Ok(Arc::new(provider));
        }

        Err(ConfigError::NoAmbientCredentials)
    }

    fn provider_from_file(
        &self,
        loader: &CredentialLoader,
        path: &Path,
    ) -> Result<Arc<dyn AuthProvider>, ConfigError> {
        match CredentialsFile::read(path)? {
            CredentialsFile::ServiceAccount(key) => Ok(Arc::new(loader.service_account(&key)?)),
            CredentialsFile::AuthorizedUser(key) => {
                let provider = AuthorizedUserProvider::new(
                    loader.http().clone(),
                    key.client_id,
                    SecretString::new(key.client_secret),
                    SecretString::new(key.refresh_token),
                    loader.scopes().to_vec(),
                )
                .with_token_url(loader.token_url().unwrap_or(TOKEN_URL));
                Ok(Arc::new(provider))
            }
        }
    }
}
