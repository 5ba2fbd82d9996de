use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::CostMatrixResult;
use crate::month::{placeholders, resolve_months};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::store;

/// Rows without a parseable project code share one synthetic bucket; the
/// front-end renders it as 未知编号/未知项目.
pub const UNKNOWN_PROJECT_CODE: &str = "nan";
pub const UNKNOWN_PROJECT_NAME: &str = "未知项目";
/// Synthetic tail row appended by the top-N view.
pub const TAIL_PROJECT_CODE: &str = "其他";

#[derive(Debug, Default, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub code: String,
    pub name: String,
    pub total_cost: f64,
    pub flight_cost: f64,
    pub hotel_cost: f64,
    pub train_cost: f64,
    pub record_count: i64,
    pub flight_count: i64,
    pub hotel_count: i64,
    pub train_count: i64,
    pub person_count: i64,
    pub person_list: Vec<String>,
    pub department_list: Vec<String>,
    pub date_range: DateRange,
    pub over_standard_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ProjectOrder {
    pub id: String,
    pub project_code: String,
    pub project_name: String,
    pub traveller_name: String,
    pub department_path: Vec<String>,
    pub kind: String,
    pub amount: f64,
    pub event_date: String,
    pub is_over_standard: bool,
    pub over_standard_reason: String,
    pub advance_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectsQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
    pub top: Option<usize>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<ProjectsQuery>,
) -> CostMatrixResult<Json<ApiResponse<Vec<ProjectSummary>>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    let projects = match params.top {
        Some(n) => project_top_n(&state.pool, &months, n).await?,
        None => list_projects_internal(&state.pool, &months).await?,
    };
    Ok(ApiResponse::ok(projects))
}

pub async fn project_orders(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<ProjectsQuery>,
) -> CostMatrixResult<Json<ApiResponse<Vec<ProjectOrder>>>> {
    let months = resolve_months(
        &state.pool,
        params.months.as_deref(),
        params.quarter,
        params.year,
    )
    .await?;
    let orders = project_orders_internal(&state.pool, &months, &code).await?;
    Ok(ApiResponse::ok(orders))
}

#[derive(Default)]
struct ProjectAccumulator {
    // (name, count) in first-occurrence order, so ties resolve stably
    name_counts: Vec<(String, i64)>,
    total_cost: f64,
    flight_cost: f64,
    hotel_cost: f64,
    train_cost: f64,
    record_count: i64,
    flight_count: i64,
    hotel_count: i64,
    train_count: i64,
    persons: Vec<String>,
    departments: Vec<String>,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    over_standard_count: i64,
}

impl ProjectAccumulator {
    fn display_name(&self, code: &str) -> String {
        if code == UNKNOWN_PROJECT_CODE && self.name_counts.is_empty() {
            return UNKNOWN_PROJECT_NAME.to_string();
        }
        // ties on count go to the earliest-seen name
        self.name_counts
            .iter()
            .enumerate()
            .max_by_key(|(idx, (_, count))| (*count, std::cmp::Reverse(*idx)))
            .map(|(_, (name, _))| name.clone())
            .unwrap_or_else(|| UNKNOWN_PROJECT_NAME.to_string())
    }
}

/// One roll-up row per distinct project code across the selected months.
/// The fold walks rows in `(source_month, event_date, id)` order, so cost
/// sums and list orders are reproducible.
pub async fn list_projects_internal(
    pool: &DbPool,
    months: &[String],
) -> CostMatrixResult<Vec<ProjectSummary>> {
    let rows = store::fetch_travel(pool, months).await?;

    let mut buckets: BTreeMap<String, ProjectAccumulator> = BTreeMap::new();
    for row in &rows {
        let code = row
            .project_code
            .clone()
            .unwrap_or_else(|| UNKNOWN_PROJECT_CODE.to_string());
        let acc = buckets.entry(code).or_default();

        if let Some(name) = row.project_name.as_deref().map(str::trim) {
            if !name.is_empty() {
                match acc.name_counts.iter_mut().find(|(n, _)| n == name) {
                    Some((_, count)) => *count += 1,
                    None => acc.name_counts.push((name.to_string(), 1)),
                }
            }
        }

        acc.total_cost += row.amount;
        acc.record_count += 1;
        match row.kind.as_str() {
            "flight" => {
                acc.flight_cost += row.amount;
                acc.flight_count += 1;
            }
            "hotel" => {
                acc.hotel_cost += row.amount;
                acc.hotel_count += 1;
            }
            _ => {
                acc.train_cost += row.amount;
                acc.train_count += 1;
            }
        }

        if !acc.persons.iter().any(|p| p == &row.traveller_name) {
            acc.persons.push(row.traveller_name.clone());
        }
        if !acc.departments.iter().any(|d| d == &row.dept_level1) {
            acc.departments.push(row.dept_level1.clone());
        }

        acc.first_date = Some(match acc.first_date {
            Some(d) => d.min(row.event_date),
            None => row.event_date,
        });
        acc.last_date = Some(match acc.last_date {
            Some(d) => d.max(row.event_date),
            None => row.event_date,
        });
        if row.is_over_standard {
            acc.over_standard_count += 1;
        }
    }

    let mut projects: Vec<ProjectSummary> = buckets
        .into_iter()
        .map(|(code, acc)| ProjectSummary {
            name: acc.display_name(&code),
            total_cost: acc.total_cost,
            flight_cost: acc.flight_cost,
            hotel_cost: acc.hotel_cost,
            train_cost: acc.train_cost,
            record_count: acc.record_count,
            flight_count: acc.flight_count,
            hotel_count: acc.hotel_count,
            train_count: acc.train_count,
            person_count: acc.persons.len() as i64,
            person_list: acc.persons,
            department_list: acc.departments,
            date_range: DateRange {
                start: acc
                    .first_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                end: acc
                    .last_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            },
            over_standard_count: acc.over_standard_count,
            code,
        })
        .collect();

    projects.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });
    Ok(projects)
}

/// The heaviest N projects by cost, with everything else rolled into one
/// tail row.
pub async fn project_top_n(
    pool: &DbPool,
    months: &[String],
    n: usize,
) -> CostMatrixResult<Vec<ProjectSummary>> {
    let mut projects = list_projects_internal(pool, months).await?;
    if projects.len() <= n {
        return Ok(projects);
    }

    let tail: Vec<ProjectSummary> = projects.split_off(n);
    let mut rest = ProjectSummary {
        code: TAIL_PROJECT_CODE.to_string(),
        name: TAIL_PROJECT_CODE.to_string(),
        total_cost: 0.0,
        flight_cost: 0.0,
        hotel_cost: 0.0,
        train_cost: 0.0,
        record_count: 0,
        flight_count: 0,
        hotel_count: 0,
        train_count: 0,
        person_count: 0,
        person_list: Vec::new(),
        department_list: Vec::new(),
        date_range: DateRange::default(),
        over_standard_count: 0,
    };
    let mut persons: Vec<String> = Vec::new();
    for project in &tail {
        rest.total_cost += project.total_cost;
        rest.flight_cost += project.flight_cost;
        rest.hotel_cost += project.hotel_cost;
        rest.train_cost += project.train_cost;
        rest.record_count += project.record_count;
        rest.flight_count += project.flight_count;
        rest.hotel_count += project.hotel_count;
        rest.train_count += project.train_count;
        rest.over_standard_count += project.over_standard_count;
        for person in &project.person_list {
            if !persons.iter().any(|p| p == person) {
                persons.push(person.clone());
            }
        }
    }
    rest.person_count = persons.len() as i64;
    projects.push(rest);
    Ok(projects)
}

/// Every order line of one project code; `"nan"` selects the rows with no
/// parseable code.
pub async fn project_orders_internal(
    pool: &DbPool,
    months: &[String],
    code: &str,
) -> CostMatrixResult<Vec<ProjectOrder>> {
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM travel_orders \
         WHERE source_month IN ({}) AND COALESCE(project_code, 'nan') = ? \
         ORDER BY event_date DESC, id DESC",
        placeholders(months.len())
    );
    let mut query = sqlx::query_as::<_, crate::db::TravelRow>(&sql);
    for month in months {
        query = query.bind(month);
    }
    let rows = query.bind(code).fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut department_path = vec![row.dept_level1];
            department_path.extend(row.dept_level2);
            department_path.extend(row.dept_level3);
            ProjectOrder {
                id: row.id.to_string(),
                project_code: row
                    .project_code
                    .unwrap_or_else(|| UNKNOWN_PROJECT_CODE.to_string()),
                project_name: row
                    .project_name
                    .unwrap_or_else(|| UNKNOWN_PROJECT_NAME.to_string()),
                traveller_name: row.traveller_name,
                department_path,
                kind: row.kind,
                amount: row.amount,
                event_date: row.event_date.format("%Y-%m-%d").to_string(),
                is_over_standard: row.is_over_standard,
                over_standard_reason: row.over_standard_reason.unwrap_or_default(),
                advance_days: row.advance_days,
            }
        })
        .collect())
}
