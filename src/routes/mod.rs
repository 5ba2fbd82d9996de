use axum::routing::get;
use axum::{Json, Router};

use crate::response::ApiResponse;
use crate::state::AppState;

pub mod anomalies;
pub mod dashboard;
pub mod departments;
pub mod months;
pub mod projects;
pub mod upload;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .merge(upload::router())
        .merge(months::router())
        .merge(dashboard::router())
        .merge(projects::router())
        .merge(departments::router())
        .merge(anomalies::router())
}

async fn health() -> Json<ApiResponse<serde_json::Value>> {
    ApiResponse::ok(serde_json::json!({
        "status": "healthy",
        "app": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
