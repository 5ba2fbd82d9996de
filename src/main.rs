#![allow(dead_code)]
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;
mod error;
mod ingest;
mod month;
mod normalizer;
mod progress;
mod response;
mod routes;
mod state;
mod store;
mod validator;

mod business_logic_tests;
mod integration_tests;

use config::Settings;
use progress::ProgressTracker;
use state::AppState;
use store::MonthLocks;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env();
    if let Err(e) = settings.ensure_dirs() {
        eprintln!("Failed to create data directories: {e}");
        return;
    }

    // Console plus a daily-rolling file under <data_root>/logs. The guard
    // must stay alive for the whole process or file logs are dropped.
    let file_appender = tracing_appender::rolling::daily(settings.log_dir(), "costmatrix.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_ansi(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    println!("--------------------------------------------------");
    println!("  COSTMATRIX - TRAVEL & ATTENDANCE ANALYTICS      ");
    println!("  Status: INITIALIZING...                         ");
    println!(
        "  Listen: http://0.0.0.0:{}                       ",
        env::var("PORT").unwrap_or_else(|_| "8000".to_string())
    );
    println!("--------------------------------------------------");

    tracing::info!("starting CostMatrix core services...");

    let pool = match db::init_pool(&settings.database_path()).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to create pool: {e}");
            return;
        }
    };
    if let Err(e) = db::init_database(&pool).await {
        tracing::error!("Failed to run migrations: {e}");
        return;
    }

    let app_state = AppState {
        pool,
        settings: Arc::new(settings.clone()),
        progress: ProgressTracker::new(),
        month_locks: MonthLocks::new(),
    };

    // Expire finished progress tasks in the background.
    let sweeper = app_state.progress.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            sweeper.sweep_expired();
        }
    });

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = routes::create_router()
        .layer(DefaultBodyLimit::max(settings.max_upload_size_bytes()))
        .layer(cors)
        .with_state(app_state);

    let port = env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let addr = format!("0.0.0.0:{port}")
        .parse::<SocketAddr>()
        .expect("Invalid address");

    tracing::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind port");
    axum::serve(listener, app).await.expect("Server error");
}
