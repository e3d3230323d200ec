//! Sheets API value types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Row-major, string-valued cells read from a range.
///
/// Serializes as a plain array of arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Vec<Vec<String>>)]
pub struct CellMatrix(Vec<Vec<String>>);

impl CellMatrix {
    /// An empty matrix.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rows as slices.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.0
    }

    /// Unwraps the rows.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.0
    }
}

impl From<Vec<Vec<String>>> for CellMatrix {
    fn from(rows: Vec<Vec<String>>) -> Self {
        Self(rows)
    }
}

/// `values.get` response body.
///
/// `values` is omitted entirely by the API when the range holds no data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    /// Range actually read, in A1 notation.
    #[serde(default)]
    pub range: Option<String>,
    /// ROWS or COLUMNS.
    #[serde(default)]
    pub major_dimension: Option<String>,
    /// Cell values.
    #[serde(default)]
    pub values: Option<Vec<Vec<serde_json::Value>>>,
}

impl ValueRange {
    /// Converts to a [`CellMatrix`], rendering non-string scalars as text.
    pub fn into_matrix(self) -> CellMatrix {
        self.values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect::<Vec<Vec<String>>>()
            .into()
    }
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
