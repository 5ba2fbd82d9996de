use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{delete, get},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/months", get(commands::months::list))
        .route("/api/months/:month", delete(commands::months::delete))
}
