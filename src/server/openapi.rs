//! OpenAPI documentation and Swagger UI integration.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::AppContext;

/// OpenAPI documentation for tempoforge.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "tempoforge API",
        version = "0.1.0",
        description = "Audio speed/pitch/volume transformation service backed by ffmpeg",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "/", description = "Default server")
    ),
    paths(
        super::routes_transform::submit_transform,
        super::routes_jobs::job_status,
        super::routes_jobs::download_result,
    ),
    components(
        schemas(
            super::routes_transform::JobReceipt,
            super::routes_jobs::JobStatusResponse,
        )
    ),
    tags(
        (name = "transform", description = "Audio transform submission"),
        (name = "jobs", description = "Job status polling and result download"),
    )
)]
pub struct ApiDoc;

/// Routes serving interactive API documentation:
/// - `/docs` - Swagger UI
/// - `/openapi.json` - Raw OpenAPI JSON spec (served by SwaggerUi)
pub fn openapi_routes() -> Router<AppContext> {
    Router::new().merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}
