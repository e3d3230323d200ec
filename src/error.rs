//! Error types for the sheets data service.

use thiserror::Error;

/// Startup configuration errors. All of these abort initialization.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment deserialization failed.
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    /// `SHEET_ID` is missing or empty.
    #[error("SHEET_ID is required")]
    MissingSpreadsheetId,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A configured URL does not parse.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// `CREDENTIAL_SOURCE` names no known source.
    #[error("unknown credential source '{0}' (expected inline, keyfile or ambient)")]
    UnknownCredentialSource(String),

    /// Inline credentials and a keyfile were both configured.
    #[error("both inline credentials and GOOGLE_KEYFILE_PATH are set; set CREDENTIAL_SOURCE to choose one")]
    ConflictingCredentialSources,

    /// Only part of the inline credential pair was configured.
    #[error("inline credentials are incomplete: {missing} is not set")]
    IncompleteInlineCredentials {
        /// Name of the missing variable.
        missing: &'static str,
    },

    /// Keyfile source selected without a path.
    #[error("GOOGLE_KEYFILE_PATH is required for the keyfile credential source")]
    MissingKeyfilePath,

    /// A credentials file could not be read.
    #[error("failed to read credentials file {path}: {source}")]
    CredentialsFileRead {
        /// File path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A credentials file is not valid JSON or lacks fields.
    #[error("failed to parse credentials file {path}: {source}")]
    CredentialsFileParse {
        /// File path.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A credentials file has a field missing.
    #[error("credentials file {path} is missing '{field}'")]
    MissingCredentialField {
        /// File path.
        path: String,
        /// Missing field name.
        field: &'static str,
    },

    /// A credentials file has an unsupported `type`.
    #[error("unsupported credential type '{0}'")]
    UnsupportedCredentialType(String),

    /// The private key could not be parsed as RSA PEM.
    #[error("private key is not a valid RSA PEM: {0}")]
    MalformedPrivateKey(String),

    /// Ambient discovery found nothing usable.
    #[error("no ambient credentials found (checked GOOGLE_APPLICATION_CREDENTIALS, gcloud default file and metadata server)")]
    NoAmbientCredentials,

    /// The outbound HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Token acquisition errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Signing the JWT assertion failed.
    #[error("jwt encoding failed: {0}")]
    JwtEncoding(String),

    /// The token endpoint could not be reached.
    #[error("token request failed: {0}")]
    RequestFailed(String),

    /// The token endpoint rejected the request.
    #[error("token request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Error description returned by the endpoint.
        message: String,
    },

    /// The token endpoint response could not be parsed.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Spreadsheet read errors, surfaced per request.
#[derive(Error, Debug)]
pub enum SheetsError {
    /// An access token could not be obtained.
    #[error("could not obtain access token: {0}")]
    Authentication(#[from] AuthError),

    /// The API rejected the bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The service account lacks access to the spreadsheet.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Error message from the API.
        message: String,
        /// Seconds to wait, when the API says so.
        retry_after_seconds: Option<u64>,
    },

    /// Spreadsheet or sheet not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Range rejected by the API.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Any other non-success response.
    #[error("api error (HTTP {status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl SheetsError {
    /// Whether the error came from credentials rather than the request.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            SheetsError::Authentication(_) | SheetsError::Unauthorized(_)
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SheetsError::Authentication(_) => "authentication",
            SheetsError::Unauthorized(_) => "unauthorized",
            SheetsError::PermissionDenied(_) => "permission_denied",
            SheetsError::RateLimited { .. } => "rate_limited",
            SheetsError::NotFound(_) => "not_found",
            SheetsError::InvalidRange(_) => "invalid_range",
            SheetsError::Api { .. } => "api",
            SheetsError::Timeout => "timeout",
            SheetsError::Network(_) => "network",
            SheetsError::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for SheetsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SheetsError::Timeout
        } else if err.is_decode() {
            SheetsError::Parse(err.to_string())
        } else {
            SheetsError::Network(err.without_url().to_string())
        }
    }
}
