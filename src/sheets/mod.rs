//! Spreadsheet reads through the Google Sheets v4 API.

pub mod client;
pub mod types;

pub use client::{build_http_client, RangeReader, SheetsClient};
pub use types::{CellMatrix, ValueRange};
