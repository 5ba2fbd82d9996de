use axum::extract::{Path, State};
use axum::Json;

use crate::error::{CostMatrixError, CostMatrixResult};
use crate::month::is_month_tag;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::store;

pub async fn list(
    State(state): State<AppState>,
) -> CostMatrixResult<Json<ApiResponse<Vec<String>>>> {
    Ok(ApiResponse::ok(store::list_months(&state.pool).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> CostMatrixResult<Json<ApiResponse<store::DeleteMonthReport>>> {
    if !is_month_tag(&month) {
        return Err(CostMatrixError::Validation(format!(
            "Invalid month tag: {month} (expected YYYY-MM)"
        )));
    }
    let report = store::delete_month(&state.pool, &state.month_locks, &month).await?;
    tracing::info!(
        "deleted month {month}: {} attendance, {} travel, {} anomaly rows",
        report.deleted_attendance,
        report.deleted_travel,
        report.deleted_anomalies
    );
    Ok(ApiResponse::ok_with(format!("{month} 数据已删除"), report))
}
