//! Axum router construction.
//!
//! Builds the full application router with all route groups, middleware
//! layers, and the OpenAPI documentation endpoint.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::context::AppContext;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::jobs::upload,
        routes::jobs::start_job,
        routes::jobs::get_job,
        routes::jobs::list_jobs,
        routes::jobs::get_video,
        routes::jobs::get_slide_image,
        routes::jobs::delete_job,
        routes::jobs::retry_job,
        routes::jobs::cancel_job,
        routes::tools::tool_status,
    ),
    components(schemas(
        routes::jobs::JobResponse,
        lectern_core::JobStatus,
        lectern_core::StylePreset,
        lectern_core::AvatarOption,
        lectern_core::FileType,
        lectern_core::SlideRecord,
        lectern_pipeline::tools::ToolInfo,
    ))
)]
struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave headroom above the configured file limit for multipart framing.
    let body_limit = (ctx.config.storage.max_upload_bytes as usize).saturating_add(64 * 1024);

    let api_routes = Router::new()
        .route("/upload", post(routes::jobs::upload))
        .route("/jobs", get(routes::jobs::list_jobs))
        .route("/jobs/{id}", get(routes::jobs::get_job))
        .route("/jobs/{id}", delete(routes::jobs::delete_job))
        .route("/jobs/{id}/start", post(routes::jobs::start_job))
        .route("/jobs/{id}/retry", post(routes::jobs::retry_job))
        .route("/jobs/{id}/cancel", post(routes::jobs::cancel_job))
        .route("/jobs/{id}/video", get(routes::jobs::get_video))
        .route(
            "/jobs/{id}/slides/{n}",
            get(routes::jobs::get_slide_image),
        )
        .route("/tools", get(routes::tools::tool_status));

    Router::new()
        .nest("/api", api_routes)
        .merge(SwaggerUi::new("/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
