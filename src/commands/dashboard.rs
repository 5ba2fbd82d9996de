use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use crate::commands::{anomalies, departments, projects, MonthsQuery};
use crate::db::DbPool;
use crate::error::CostMatrixResult;
use crate::month::{placeholders, resolve_months};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Serialize)]
pub struct OrderBreakdown {
    pub flight: i64,
    pub hotel: i64,
    pub train: i64,
    pub total: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub total_cost: f64,
    pub avg_work_hours: f64,
    pub holiday_avg_work_hours: f64,
    pub anomaly_count: i64,
    pub total_orders: i64,
    pub order_breakdown: OrderBreakdown,
    pub over_standard_count: i64,
    pub over_standard_breakdown: OrderBreakdown,
    pub flight_over_type_breakdown: BTreeMap<String, i64>,
    pub total_project_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MonthBreakdownRow {
    pub month: String,
    pub total_cost: f64,
    pub total_orders: i64,
    pub anomaly_count: i64,
}

/// Everything the dashboard needs for the selected months in one payload.
#[derive(Debug, Serialize)]
pub struct DashboardBundle {
    pub months: Vec<String>,
    pub summary: Summary,
    pub department_stats: Vec<departments::DepartmentCostStat>,
    pub project_top: Vec<projects::ProjectSummary>,
    pub anomalies: Vec<anomalies::AnomalyItem>,
    pub month_breakdown: Vec<MonthBreakdownRow>,
}

pub async fn analyze(
    State(state): State<AppState>,
    Query(params): Query<MonthsQuery>,
) -> CostMatrixResult<Json<ApiResponse<DashboardBundle>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    let bundle = dashboard_bundle(&state.pool, &months).await?;
    Ok(ApiResponse::ok(bundle))
}

pub async fn dashboard_bundle(
    pool: &DbPool,
    months: &[String],
) -> CostMatrixResult<DashboardBundle> {
    Ok(DashboardBundle {
        months: months.to_vec(),
        summary: summary_internal(pool, months).await?,
        department_stats: departments::department_cost_stats(pool, months, 15).await?,
        project_top: projects::project_top_n(pool, months, 20).await?,
        anomalies: anomalies::list_anomalies_internal(pool, months).await?,
        month_breakdown: month_breakdown_internal(pool, months).await?,
    })
}

/// Cross-sheet KPI roll-up over the selected months. A month with no rows
/// contributes nothing; an entirely unknown selection yields zeros.
pub async fn summary_internal(pool: &DbPool, months: &[String]) -> CostMatrixResult<Summary> {
    if months.is_empty() {
        return Ok(Summary::default());
    }
    let ph = placeholders(months.len());

    // inner ORDER BY pins the float summation order
    let sql = format!(
        "SELECT COALESCE(SUM(amount), 0.0) AS total_cost, \
                COUNT(*) AS total_orders, \
                COALESCE(SUM(CASE WHEN kind = 'flight' THEN 1 ELSE 0 END), 0) AS flight_orders, \
                COALESCE(SUM(CASE WHEN kind = 'hotel' THEN 1 ELSE 0 END), 0) AS hotel_orders, \
                COALESCE(SUM(CASE WHEN kind = 'train' THEN 1 ELSE 0 END), 0) AS train_orders, \
                COALESCE(SUM(CASE WHEN is_over_standard = 1 THEN 1 ELSE 0 END), 0) AS over_count, \
                COALESCE(SUM(CASE WHEN is_over_standard = 1 AND kind = 'flight' THEN 1 ELSE 0 END), 0) AS over_flight, \
                COALESCE(SUM(CASE WHEN is_over_standard = 1 AND kind = 'hotel' THEN 1 ELSE 0 END), 0) AS over_hotel, \
                COALESCE(SUM(CASE WHEN is_over_standard = 1 AND kind = 'train' THEN 1 ELSE 0 END), 0) AS over_train, \
                COUNT(DISTINCT COALESCE(project_code, 'nan')) AS project_count \
         FROM (SELECT * FROM travel_orders WHERE source_month IN ({ph}) \
               ORDER BY source_month, event_date, id)"
    );
    let mut query = sqlx::query_as::<_, (f64, i64, i64, i64, i64, i64, i64, i64, i64, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let travel = query.fetch_one(pool).await?;

    let sql = format!(
        "SELECT COALESCE(AVG(CASE WHEN status = 'WORK' AND work_hours > 0 THEN work_hours END), 0.0), \
                COALESCE(AVG(CASE WHEN status = 'WEEKEND_WORK' AND work_hours > 0 THEN work_hours END), 0.0) \
         FROM attendance WHERE source_month IN ({ph})"
    );
    let mut query = sqlx::query_as::<_, (f64, f64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let (avg_work_hours, holiday_avg_work_hours) = query.fetch_one(pool).await?;

    let sql = format!("SELECT COUNT(*) FROM anomalies WHERE source_month IN ({ph})");
    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let (anomaly_count,) = query.fetch_one(pool).await?;

    let sql = format!(
        "SELECT over_standard_reason, COUNT(*) FROM travel_orders \
         WHERE source_month IN ({ph}) AND kind = 'flight' AND is_over_standard = 1 \
               AND over_standard_reason IS NOT NULL AND over_standard_reason != '' \
         GROUP BY over_standard_reason"
    );
    let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let flight_over_type_breakdown: BTreeMap<String, i64> =
        query.fetch_all(pool).await?.into_iter().collect();

    Ok(Summary {
        total_cost: travel.0,
        avg_work_hours,
        holiday_avg_work_hours,
        anomaly_count,
        total_orders: travel.1,
        order_breakdown: OrderBreakdown {
            flight: travel.2,
            hotel: travel.3,
            train: travel.4,
            total: travel.1,
        },
        over_standard_count: travel.5,
        over_standard_breakdown: OrderBreakdown {
            flight: travel.6,
            hotel: travel.7,
            train: travel.8,
            total: travel.5,
        },
        flight_over_type_breakdown,
        total_project_count: travel.9,
    })
}

/// Per-month trend rows for multi-month selections.
pub async fn month_breakdown_internal(
    pool: &DbPool,
    months: &[String],
) -> CostMatrixResult<Vec<MonthBreakdownRow>> {
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let ph = placeholders(months.len());

    let sql = format!(
        "SELECT source_month, COALESCE(SUM(amount), 0.0), COUNT(*) \
         FROM (SELECT * FROM travel_orders WHERE source_month IN ({ph}) \
               ORDER BY source_month, event_date, id) \
         GROUP BY source_month"
    );
    let mut query = sqlx::query_as::<_, (String, f64, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let travel: BTreeMap<String, (f64, i64)> = query
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(m, cost, orders)| (m, (cost, orders)))
        .collect();

    let sql = format!(
        "SELECT source_month, COUNT(*) FROM anomalies \
         WHERE source_month IN ({ph}) GROUP BY source_month"
    );
    let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let anomaly_counts: BTreeMap<String, i64> = query.fetch_all(pool).await?.into_iter().collect();

    Ok(months
        .iter()
        .map(|month| {
            let (total_cost, total_orders) = travel.get(month).copied().unwrap_or((0.0, 0));
            MonthBreakdownRow {
                month: month.clone(),
                total_cost,
                total_orders,
                anomaly_count: anomaly_counts.get(month).copied().unwrap_or(0),
            }
        })
        .collect())
}
