use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use crate::commands::MonthsQuery;
use crate::db::DbPool;
use crate::error::CostMatrixResult;
use crate::month::{placeholders, resolve_months};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AnomalyItem {
    pub date: String,
    pub employee_name: String,
    pub department_path: Vec<String>,
    pub kind: String,
    pub attendance_status: Option<String>,
    pub detail: String,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<MonthsQuery>,
) -> CostMatrixResult<Json<ApiResponse<Vec<AnomalyItem>>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    Ok(ApiResponse::ok(
        list_anomalies_internal(&state.pool, &months).await?,
    ))
}

/// Every anomaly of the selected months, newest first.
pub async fn list_anomalies_internal(
    pool: &DbPool,
    months: &[String],
) -> CostMatrixResult<Vec<AnomalyItem>> {
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM anomalies WHERE source_month IN ({}) \
         ORDER BY date DESC, employee_name ASC, id ASC",
        placeholders(months.len())
    );
    let mut query = sqlx::query_as::<_, crate::db::AnomalyRow>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let rows = query.fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut department_path = vec![row.dept_level1];
            department_path.extend(row.dept_level2);
            department_path.extend(row.dept_level3);
            AnomalyItem {
                date: row.date.format("%Y-%m-%d").to_string(),
                employee_name: row.employee_name,
                department_path,
                kind: row.kind,
                attendance_status: row.attendance_status,
                detail: row.detail,
            }
        })
        .collect())
}
