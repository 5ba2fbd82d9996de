use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(commands::projects::list_projects))
        .route(
            "/api/projects/:code/orders",
            get(commands::projects::project_orders),
        )
}
