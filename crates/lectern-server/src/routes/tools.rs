//! External tool status route.

use axum::extract::State;
use axum::Json;

use lectern_pipeline::tools::ToolInfo;

use crate::context::AppContext;

/// GET /api/tools
#[utoipa::path(
    get,
    path = "/api/tools",
    responses(
        (status = 200, description = "External tool availability", body = Vec<ToolInfo>)
    )
)]
pub async fn tool_status(State(ctx): State<AppContext>) -> Json<Vec<ToolInfo>> {
    Json(ctx.tools.check_all())
}
