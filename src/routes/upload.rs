use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/upload", post(commands::upload::upload_workbook))
        .route(
            "/api/progress/:task_id",
            get(commands::upload::get_progress),
        )
        .route("/api/uploads", get(commands::upload::list_uploads))
}
