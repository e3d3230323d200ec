//! OpenAPI document for the HTTP API.

use utoipa::OpenApi;

use super::handlers::{DataResponse, ErrorBody, HealthResponse, ReadyResponse};

/// OpenAPI document. Title and version come from `Cargo.toml`.
#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::data,
        super::handlers::health,
        super::handlers::ready
    ),
    components(schemas(DataResponse, ErrorBody, HealthResponse, ReadyResponse)),
    tags(
        (name = "Data", description = "Spreadsheet data"),
        (name = "Operations", description = "Health and readiness probes")
    )
)]
pub struct ApiDoc;
