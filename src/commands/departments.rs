use std::collections::{BTreeMap, BTreeSet};

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::commands::MonthsQuery;
use crate::db::DbPool;
use crate::error::{CostMatrixError, CostMatrixResult};
use crate::month::{placeholders, resolve_months};
use crate::response::ApiResponse;
use crate::state::AppState;

fn dept_column(level: u8) -> CostMatrixResult<&'static str> {
    match level {
        1 => Ok("dept_level1"),
        2 => Ok("dept_level2"),
        3 => Ok("dept_level3"),
        _ => Err(CostMatrixError::Validation(format!(
            "Invalid department level: {level}"
        ))),
    }
}

fn parent_column(level: u8) -> Option<&'static str> {
    match level {
        2 => Some("dept_level1"),
        3 => Some("dept_level2"),
        _ => None,
    }
}

fn child_column(level: u8) -> Option<&'static str> {
    match level {
        1 => Some("dept_level2"),
        2 => Some("dept_level3"),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct RankingItem {
    pub name: String,
    pub value: f64,
    pub detail: String,
}

#[derive(Debug, Default, Serialize)]
pub struct DepartmentHierarchy {
    pub level1: Vec<String>,
    pub level2: BTreeMap<String, Vec<String>>,
    pub level3: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct DepartmentListItem {
    pub name: String,
    pub level: u8,
    pub parent: Option<String>,
    pub person_count: i64,
    pub total_cost: f64,
    pub avg_work_hours: f64,
    pub holiday_avg_work_hours: f64,
}

/// Level-1 cost roll-up for the dashboard: one grouped travel query
/// merged with an attendance averages map.
#[derive(Debug, Serialize)]
pub struct DepartmentCostStat {
    pub dept: String,
    pub cost: f64,
    pub flight_cost: f64,
    pub hotel_cost: f64,
    pub train_cost: f64,
    pub headcount: i64,
    pub avg_hours: f64,
}

#[derive(Debug, Serialize)]
pub struct DepartmentDetails {
    pub department_name: String,
    pub level: u8,
    pub parent_department: Option<String>,
    pub person_count: i64,
    pub total_cost: f64,
    pub avg_work_hours: f64,
    pub attendance_days_distribution: BTreeMap<String, i64>,
    pub weekend_work_days: i64,
    pub workday_attendance_days: i64,
    pub travel_days: i64,
    pub leave_days: i64,
    pub anomaly_days: i64,
    pub late_after_1930_count: i64,
    pub weekend_attendance_count: i64,
    pub travel_ranking: Vec<RankingItem>,
    pub anomaly_ranking: Vec<RankingItem>,
    pub latest_checkout_ranking: Vec<RankingItem>,
    pub longest_hours_ranking: Vec<RankingItem>,
}

#[derive(Debug, Serialize)]
pub struct ChildDepartmentStats {
    pub name: String,
    pub person_count: i64,
    pub avg_work_hours: f64,
    pub workday_attendance_days: i64,
    pub weekend_work_days: i64,
    pub weekend_attendance_count: i64,
    pub travel_days: i64,
    pub leave_days: i64,
    pub anomaly_days: i64,
    pub late_after_1930_count: i64,
    pub total_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct LevelStatistics {
    pub department_name: String,
    pub level: u8,
    pub total_travel_cost: f64,
    pub attendance_days_distribution: BTreeMap<String, i64>,
    pub travel_ranking: Vec<RankingItem>,
    pub avg_hours_ranking: Vec<RankingItem>,
    pub children: Vec<ChildDepartmentStats>,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentListQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
    pub level: u8,
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentDetailsQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
    pub name: String,
    #[serde(default = "default_level")]
    pub level: u8,
}

fn default_level() -> u8 {
    1
}

#[derive(Debug, Deserialize)]
pub struct LevelStatisticsQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
    pub name: String,
}

pub async fn hierarchy(
    State(state): State<AppState>,
    Query(params): Query<MonthsQuery>,
) -> CostMatrixResult<Json<ApiResponse<DepartmentHierarchy>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    Ok(ApiResponse::ok(
        department_hierarchy(&state.pool, &months).await?,
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<DepartmentListQuery>,
) -> CostMatrixResult<Json<ApiResponse<Vec<DepartmentListItem>>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    Ok(ApiResponse::ok(
        department_list_internal(
            &state.pool,
            &months,
            params.level,
            params.parent.as_deref(),
        )
        .await?,
    ))
}

pub async fn details(
    State(state): State<AppState>,
    Query(params): Query<DepartmentDetailsQuery>,
) -> CostMatrixResult<Json<ApiResponse<DepartmentDetails>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    Ok(ApiResponse::ok(
        department_details_internal(&state.pool, &months, &params.name, params.level).await?,
    ))
}

pub async fn level1_statistics(
    State(state): State<AppState>,
    Query(params): Query<LevelStatisticsQuery>,
) -> CostMatrixResult<Json<ApiResponse<LevelStatistics>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    Ok(ApiResponse::ok(
        level_statistics_internal(&state.pool, &months, &params.name, 1).await?,
    ))
}

pub async fn level2_statistics(
    State(state): State<AppState>,
    Query(params): Query<LevelStatisticsQuery>,
) -> CostMatrixResult<Json<ApiResponse<LevelStatistics>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    Ok(ApiResponse::ok(
        level_statistics_internal(&state.pool, &months, &params.name, 2).await?,
    ))
}

/// The department forest of the selected months, derived from the level
/// columns of attendance and travel rows. No parent pointers are stored;
/// each map goes from a prefix to its children.
pub async fn department_hierarchy(
    pool: &DbPool,
    months: &[String],
) -> CostMatrixResult<DepartmentHierarchy> {
    if months.is_empty() {
        return Ok(DepartmentHierarchy::default());
    }
    let ph = placeholders(months.len());
    let sql = format!(
        "SELECT DISTINCT dept_level1, dept_level2, dept_level3 \
         FROM attendance WHERE source_month IN ({ph}) \
         UNION \
         SELECT DISTINCT dept_level1, dept_level2, dept_level3 \
         FROM travel_orders WHERE source_month IN ({ph})"
    );
    let mut query = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(&sql);
    for month in months.iter().chain(months.iter()) {
        query = query.bind(month);
    }
    let paths = query.fetch_all(pool).await?;

    let mut level1: BTreeSet<String> = BTreeSet::new();
    let mut level2: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut level3: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (l1, l2, l3) in paths {
        level1.insert(l1.clone());
        if let Some(l2) = l2 {
            level2.entry(l1).or_default().insert(l2.clone());
            if let Some(l3) = l3 {
                level3.entry(l2).or_default().insert(l3);
            }
        }
    }

    Ok(DepartmentHierarchy {
        level1: level1.into_iter().collect(),
        level2: level2
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect(),
        level3: level3
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect(),
    })
}

pub async fn department_cost_stats(
    pool: &DbPool,
    months: &[String],
    top_n: i64,
) -> CostMatrixResult<Vec<DepartmentCostStat>> {
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let ph = placeholders(months.len());

    let sql = format!(
        "SELECT dept_level1, \
                COALESCE(SUM(amount), 0.0) AS cost, \
                COALESCE(SUM(CASE WHEN kind = 'flight' THEN amount ELSE 0.0 END), 0.0), \
                COALESCE(SUM(CASE WHEN kind = 'hotel' THEN amount ELSE 0.0 END), 0.0), \
                COALESCE(SUM(CASE WHEN kind = 'train' THEN amount ELSE 0.0 END), 0.0), \
                COUNT(DISTINCT traveller_name) \
         FROM (SELECT * FROM travel_orders WHERE source_month IN ({ph}) \
               ORDER BY source_month, event_date, id) \
         GROUP BY dept_level1 ORDER BY cost DESC, dept_level1 ASC LIMIT ?"
    );
    let mut query = sqlx::query_as::<_, (String, f64, f64, f64, f64, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let cost_rows = query.bind(top_n).fetch_all(pool).await?;

    let sql = format!(
        "SELECT dept_level1, \
                COALESCE(AVG(CASE WHEN status = 'WORK' AND work_hours > 0 THEN work_hours END), 0.0) \
         FROM attendance WHERE source_month IN ({ph}) GROUP BY dept_level1"
    );
    let mut query = sqlx::query_as::<_, (String, f64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let avg_hours_map: BTreeMap<String, f64> = query.fetch_all(pool).await?.into_iter().collect();

    Ok(cost_rows
        .into_iter()
        .map(
            |(dept, cost, flight_cost, hotel_cost, train_cost, headcount)| DepartmentCostStat {
                avg_hours: avg_hours_map.get(&dept).copied().unwrap_or(0.0),
                dept,
                cost,
                flight_cost,
                hotel_cost,
                train_cost,
                headcount,
            },
        )
        .collect())
}

pub async fn department_list_internal(
    pool: &DbPool,
    months: &[String],
    level: u8,
    parent: Option<&str>,
) -> CostMatrixResult<Vec<DepartmentListItem>> {
    let col = dept_column(level)?;
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let ph = placeholders(months.len());

    let parent_filter = match (parent, parent_column(level)) {
        (Some(_), Some(parent_col)) => format!(" AND {parent_col} = ?"),
        _ => String::new(),
    };
    let parent_bind = if parent_filter.is_empty() { None } else { parent };

    // travel cost per department
    let sql = format!(
        "SELECT {col}, COALESCE(SUM(amount), 0.0) \
         FROM (SELECT * FROM travel_orders WHERE source_month IN ({ph}) \
               AND {col} IS NOT NULL{parent_filter} \
               ORDER BY source_month, event_date, id) \
         GROUP BY {col}"
    );
    let mut query = sqlx::query_as::<_, (String, f64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    if let Some(parent) = parent_bind {
        query = query.bind(parent);
    }
    let costs: BTreeMap<String, f64> = query.fetch_all(pool).await?.into_iter().collect();

    // average hours per department, workday and weekend-work separately
    let sql = format!(
        "SELECT {col}, \
                COALESCE(AVG(CASE WHEN status = 'WORK' AND work_hours > 0 THEN work_hours END), 0.0), \
                COALESCE(AVG(CASE WHEN status = 'WEEKEND_WORK' AND work_hours > 0 THEN work_hours END), 0.0) \
         FROM attendance WHERE source_month IN ({ph}) AND {col} IS NOT NULL{parent_filter} \
         GROUP BY {col}"
    );
    let mut query = sqlx::query_as::<_, (String, f64, f64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    if let Some(parent) = parent_bind {
        query = query.bind(parent);
    }
    let hours: BTreeMap<String, (f64, f64)> = query
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(name, work, weekend)| (name, (work, weekend)))
        .collect();

    // distinct people seen in either stream at this prefix
    let person_sql = format!(
        "SELECT name, COUNT(DISTINCT person) FROM ( \
            SELECT {col} AS name, employee_name AS person FROM attendance \
            WHERE source_month IN ({ph}) AND {col} IS NOT NULL{parent_filter} \
            UNION \
            SELECT {col} AS name, traveller_name AS person FROM travel_orders \
            WHERE source_month IN ({ph}) AND {col} IS NOT NULL{parent_filter} \
         ) GROUP BY name"
    );
    let mut query = sqlx::query_as::<_, (String, i64)>(&person_sql);
    for month in months {
        query = query.bind(month);
    }
    if let Some(parent) = parent_bind {
        query = query.bind(parent);
    }
    for month in months {
        query = query.bind(month);
    }
    if let Some(parent) = parent_bind {
        query = query.bind(parent);
    }
    let persons: BTreeMap<String, i64> = query.fetch_all(pool).await?.into_iter().collect();

    let mut names: BTreeSet<String> = BTreeSet::new();
    names.extend(costs.keys().cloned());
    names.extend(hours.keys().cloned());
    names.extend(persons.keys().cloned());

    let mut items: Vec<DepartmentListItem> = names
        .into_iter()
        .map(|name| {
            let (avg_work_hours, holiday_avg_work_hours) =
                hours.get(&name).copied().unwrap_or((0.0, 0.0));
            DepartmentListItem {
                person_count: persons.get(&name).copied().unwrap_or(0),
                total_cost: costs.get(&name).copied().unwrap_or(0.0),
                avg_work_hours,
                holiday_avg_work_hours,
                level,
                parent: parent.map(str::to_string),
                name,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(items)
}

/// Per-department tallies shared by the details dossier and the per-child
/// statistics tables.
struct DeptTallies {
    status_distribution: BTreeMap<String, i64>,
    avg_work_hours: f64,
    person_count: i64,
    total_cost: f64,
    anomaly_days: i64,
    late_after_1930_count: i64,
    weekend_attendance_count: i64,
}

async fn dept_tallies(
    pool: &DbPool,
    months: &[String],
    col: &str,
    name: &str,
) -> CostMatrixResult<DeptTallies> {
    let ph = placeholders(months.len());

    let sql = format!(
        "SELECT status, COUNT(*) FROM attendance \
         WHERE source_month IN ({ph}) AND {col} = ? GROUP BY status"
    );
    let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let status_distribution: BTreeMap<String, i64> =
        query.bind(name).fetch_all(pool).await?.into_iter().collect();

    let sql = format!(
        "SELECT COALESCE(AVG(CASE WHEN status = 'WORK' AND work_hours > 0 THEN work_hours END), 0.0) \
         FROM attendance WHERE source_month IN ({ph}) AND {col} = ?"
    );
    let mut query = sqlx::query_as::<_, (f64,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let (avg_work_hours,) = query.bind(name).fetch_one(pool).await?;

    let sql = format!(
        "SELECT COUNT(DISTINCT person) FROM ( \
            SELECT employee_name AS person FROM attendance \
            WHERE source_month IN ({ph}) AND {col} = ? \
            UNION \
            SELECT traveller_name AS person FROM travel_orders \
            WHERE source_month IN ({ph}) AND {col} = ?)"
    );
    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    query = query.bind(name);
    for month in months {
        query = query.bind(month);
    }
    let (person_count,) = query.bind(name).fetch_one(pool).await?;

    let sql = format!(
        "SELECT COALESCE(SUM(amount), 0.0) \
         FROM (SELECT * FROM travel_orders WHERE source_month IN ({ph}) AND {col} = ? \
               ORDER BY source_month, event_date, id)"
    );
    let mut query = sqlx::query_as::<_, (f64,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let (total_cost,) = query.bind(name).fetch_one(pool).await?;

    let sql = format!(
        "SELECT COUNT(*) FROM anomalies WHERE source_month IN ({ph}) AND {col} = ?"
    );
    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let (anomaly_days,) = query.bind(name).fetch_one(pool).await?;

    let sql = format!(
        "SELECT COUNT(*) FROM attendance \
         WHERE source_month IN ({ph}) AND {col} = ? \
               AND checkout_time IS NOT NULL AND checkout_time > '19:30:00'"
    );
    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let (late_after_1930_count,) = query.bind(name).fetch_one(pool).await?;

    let sql = format!(
        "SELECT COUNT(*) FROM attendance \
         WHERE source_month IN ({ph}) AND {col} = ? \
               AND status IN ('WORK', 'TRAVEL') AND strftime('%w', date) IN ('0', '6')"
    );
    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let (weekend_attendance_count,) = query.bind(name).fetch_one(pool).await?;

    Ok(DeptTallies {
        status_distribution,
        avg_work_hours,
        person_count,
        total_cost,
        anomaly_days,
        late_after_1930_count,
        weekend_attendance_count,
    })
}

async fn travel_ranking(
    pool: &DbPool,
    months: &[String],
    col: &str,
    name: &str,
) -> CostMatrixResult<Vec<RankingItem>> {
    let ph = placeholders(months.len());
    let sql = format!(
        "SELECT employee_name, COUNT(*) FROM attendance \
         WHERE source_month IN ({ph}) AND {col} = ? AND status = 'TRAVEL' \
         GROUP BY employee_name ORDER BY COUNT(*) DESC, employee_name ASC LIMIT 10"
    );
    let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    Ok(query
        .bind(name)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(name, days)| RankingItem {
            name,
            value: days as f64,
            detail: format!("{days}天"),
        })
        .collect())
}

async fn anomaly_ranking(
    pool: &DbPool,
    months: &[String],
    col: &str,
    name: &str,
) -> CostMatrixResult<Vec<RankingItem>> {
    let ph = placeholders(months.len());
    let sql = format!(
        "SELECT employee_name, COUNT(*) FROM anomalies \
         WHERE source_month IN ({ph}) AND {col} = ? \
         GROUP BY employee_name ORDER BY COUNT(*) DESC, employee_name ASC LIMIT 10"
    );
    let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    Ok(query
        .bind(name)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(name, count)| RankingItem {
            name,
            value: count as f64,
            detail: format!("{count}次"),
        })
        .collect())
}

async fn longest_hours_ranking(
    pool: &DbPool,
    months: &[String],
    col: &str,
    name: &str,
) -> CostMatrixResult<Vec<RankingItem>> {
    let ph = placeholders(months.len());
    let sql = format!(
        "SELECT employee_name, AVG(work_hours) AS avg_hours FROM attendance \
         WHERE source_month IN ({ph}) AND {col} = ? AND status = 'WORK' AND work_hours > 0 \
         GROUP BY employee_name ORDER BY avg_hours DESC, employee_name ASC LIMIT 10"
    );
    let mut query = sqlx::query_as::<_, (String, f64)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    Ok(query
        .bind(name)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(name, hours)| RankingItem {
            name,
            value: (hours * 100.0).round() / 100.0,
            detail: format!("{hours:.2}小时"),
        })
        .collect())
}

async fn latest_checkout_ranking(
    pool: &DbPool,
    months: &[String],
    col: &str,
    name: &str,
) -> CostMatrixResult<Vec<RankingItem>> {
    let ph = placeholders(months.len());
    let sql = format!(
        "SELECT employee_name, MAX(checkout_time) AS latest FROM attendance \
         WHERE source_month IN ({ph}) AND {col} = ? AND checkout_time IS NOT NULL \
         GROUP BY employee_name ORDER BY latest DESC, employee_name ASC LIMIT 10"
    );
    let mut query = sqlx::query_as::<_, (String, String)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    Ok(query
        .bind(name)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(name, latest)| RankingItem {
            name,
            value: 0.0,
            detail: latest,
        })
        .collect())
}

pub async fn department_details_internal(
    pool: &DbPool,
    months: &[String],
    name: &str,
    level: u8,
) -> CostMatrixResult<DepartmentDetails> {
    let col = dept_column(level)?;
    if months.is_empty() {
        return Ok(DepartmentDetails {
            department_name: name.to_string(),
            level,
            parent_department: None,
            person_count: 0,
            total_cost: 0.0,
            avg_work_hours: 0.0,
            attendance_days_distribution: BTreeMap::new(),
            weekend_work_days: 0,
            workday_attendance_days: 0,
            travel_days: 0,
            leave_days: 0,
            anomaly_days: 0,
            late_after_1930_count: 0,
            weekend_attendance_count: 0,
            travel_ranking: Vec::new(),
            anomaly_ranking: Vec::new(),
            latest_checkout_ranking: Vec::new(),
            longest_hours_ranking: Vec::new(),
        });
    }

    let tallies = dept_tallies(pool, months, col, name).await?;

    let parent_department = match parent_column(level) {
        Some(parent_col) => {
            let ph = placeholders(months.len());
            let sql = format!(
                "SELECT DISTINCT {parent_col} FROM attendance \
                 WHERE source_month IN ({ph}) AND {col} = ? AND {parent_col} IS NOT NULL \
                 UNION \
                 SELECT DISTINCT {parent_col} FROM travel_orders \
                 WHERE source_month IN ({ph}) AND {col} = ? AND {parent_col} IS NOT NULL \
                 LIMIT 1"
            );
            let mut query = sqlx::query_as::<_, (Option<String>,)>(&sql);
            for month in months {
                query = query.bind(month);
            }
            query = query.bind(name);
            for month in months {
                query = query.bind(month);
            }
            query
                .bind(name)
                .fetch_optional(pool)
                .await?
                .and_then(|(parent,)| parent)
        }
        None => None,
    };

    let dist = &tallies.status_distribution;
    Ok(DepartmentDetails {
        department_name: name.to_string(),
        level,
        parent_department,
        person_count: tallies.person_count,
        total_cost: tallies.total_cost,
        avg_work_hours: tallies.avg_work_hours,
        weekend_work_days: dist.get("WEEKEND_WORK").copied().unwrap_or(0),
        workday_attendance_days: dist.get("WORK").copied().unwrap_or(0),
        travel_days: dist.get("TRAVEL").copied().unwrap_or(0),
        leave_days: dist.get("LEAVE").copied().unwrap_or(0),
        anomaly_days: tallies.anomaly_days,
        late_after_1930_count: tallies.late_after_1930_count,
        weekend_attendance_count: tallies.weekend_attendance_count,
        attendance_days_distribution: tallies.status_distribution,
        travel_ranking: travel_ranking(pool, months, col, name).await?,
        anomaly_ranking: anomaly_ranking(pool, months, col, name).await?,
        latest_checkout_ranking: latest_checkout_ranking(pool, months, col, name).await?,
        longest_hours_ranking: longest_hours_ranking(pool, months, col, name).await?,
    })
}

/// Parent dossier plus the per-child statistics table, for level-1 and
/// level-2 drill-downs.
pub async fn level_statistics_internal(
    pool: &DbPool,
    months: &[String],
    name: &str,
    level: u8,
) -> CostMatrixResult<LevelStatistics> {
    let col = dept_column(level)?;
    let child_col = child_column(level).ok_or_else(|| {
        CostMatrixError::Validation(format!("Level {level} has no child level"))
    })?;

    if months.is_empty() {
        return Ok(LevelStatistics {
            department_name: name.to_string(),
            level,
            total_travel_cost: 0.0,
            attendance_days_distribution: BTreeMap::new(),
            travel_ranking: Vec::new(),
            avg_hours_ranking: Vec::new(),
            children: Vec::new(),
        });
    }

    let tallies = dept_tallies(pool, months, col, name).await?;

    let ph = placeholders(months.len());
    let sql = format!(
        "SELECT DISTINCT {child_col} FROM attendance \
         WHERE source_month IN ({ph}) AND {col} = ? AND {child_col} IS NOT NULL \
         UNION \
         SELECT DISTINCT {child_col} FROM travel_orders \
         WHERE source_month IN ({ph}) AND {col} = ? AND {child_col} IS NOT NULL"
    );
    let mut query = sqlx::query_as::<_, (String,)>(&sql);
    for month in months {
        query = query.bind(month);
    }
    query = query.bind(name);
    for month in months {
        query = query.bind(month);
    }
    let child_names: Vec<String> = query
        .bind(name)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(n,)| n)
        .collect();

    let mut children = Vec::with_capacity(child_names.len());
    for child in &child_names {
        let child_tallies = dept_tallies(pool, months, child_col, child).await?;
        let dist = &child_tallies.status_distribution;
        children.push(ChildDepartmentStats {
            name: child.clone(),
            person_count: child_tallies.person_count,
            avg_work_hours: child_tallies.avg_work_hours,
            workday_attendance_days: dist.get("WORK").copied().unwrap_or(0),
            weekend_work_days: dist.get("WEEKEND_WORK").copied().unwrap_or(0),
            weekend_attendance_count: child_tallies.weekend_attendance_count,
            travel_days: dist.get("TRAVEL").copied().unwrap_or(0),
            leave_days: dist.get("LEAVE").copied().unwrap_or(0),
            anomaly_days: child_tallies.anomaly_days,
            late_after_1930_count: child_tallies.late_after_1930_count,
            total_cost: child_tallies.total_cost,
        });
    }
    children.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(LevelStatistics {
        department_name: name.to_string(),
        level,
        total_travel_cost: tallies.total_cost,
        attendance_days_distribution: tallies.status_distribution,
        travel_ranking: travel_ranking(pool, months, col, name).await?,
        avg_hours_ranking: longest_hours_ranking(pool, months, col, name).await?,
        children,
    })
}
