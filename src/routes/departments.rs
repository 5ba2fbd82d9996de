use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/departments/hierarchy",
            get(commands::departments::hierarchy),
        )
        .route("/api/departments/list", get(commands::departments::list))
        .route(
            "/api/departments/details",
            get(commands::departments::details),
        )
        .route(
            "/api/departments/level1/statistics",
            get(commands::departments::level1_statistics),
        )
        .route(
            "/api/departments/level2/statistics",
            get(commands::departments::level2_statistics),
        )
}
