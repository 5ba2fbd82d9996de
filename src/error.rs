use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Serializer};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CostMatrixError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid workbook: {0}")]
    SourceInvalid(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Month {0} is locked by another ingestion")]
    Contention(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

// String form for clients; the full error stays in the logs.
impl Serialize for CostMatrixError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type CostMatrixResult<T> = Result<T, CostMatrixError>;

impl IntoResponse for CostMatrixError {
    fn into_response(self) -> Response {
        let status = match &self {
            CostMatrixError::SourceInvalid(_) | CostMatrixError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            CostMatrixError::Contention(_) => StatusCode::CONFLICT,
            // 499 is "client closed request"; axum has no named constant for it.
            CostMatrixError::Cancelled(_) => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
