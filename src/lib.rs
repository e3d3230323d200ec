//! Google Sheets range served as JSON.
//!
//! This library reads a single range from a spreadsheet with Google
//! credentials and exposes it over HTTP:
//!
//! ```text
//! GET /api/data
//! {"students": [["Title", "Author", "Year"], ["Dune", "Herbert", "1965"]]}
//! ```
//!
//! # Credentials
//!
//! Exactly one source is used per process: inline service-account fields,
//! a JSON keyfile on disk, or the ambient application-default chain.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`credentials`]: Credential source selection and loading
//! - [`auth`]: OAuth2 access token providers
//! - [`sheets`]: Sheets API client and cell types
//! - [`api`]: HTTP API for data, health and metrics
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod sheets;
pub mod utils;

pub use config::Config;
pub use error::{AuthError, ConfigError, SheetsError};
