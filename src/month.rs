use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::DbPool;
use crate::error::{CostMatrixError, CostMatrixResult};
use crate::store;

static MONTH_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("month tag regex"));

/// YYYY-MM tag of a calendar day. This is the sharding key of the store.
pub fn month_of(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

pub fn is_month_tag(s: &str) -> bool {
    MONTH_TAG.is_match(s)
}

/// Comma-separated `months` query value -> validated, deduplicated,
/// ascending list.
pub fn parse_months_param(raw: &str) -> CostMatrixResult<Vec<String>> {
    let mut months: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let tag = part.trim();
        if tag.is_empty() {
            continue;
        }
        if !is_month_tag(tag) {
            return Err(CostMatrixError::Validation(format!(
                "Invalid month tag: {tag} (expected YYYY-MM)"
            )));
        }
        if !months.iter().any(|m| m == tag) {
            months.push(tag.to_string());
        }
    }
    months.sort();
    Ok(months)
}

pub fn quarter_months(year: i32, quarter: u32) -> CostMatrixResult<Vec<String>> {
    if !(1..=4).contains(&quarter) {
        return Err(CostMatrixError::Validation(format!(
            "Invalid quarter: {quarter}"
        )));
    }
    let first = (quarter - 1) * 3 + 1;
    Ok((first..first + 3)
        .map(|m| format!("{:04}-{:02}", year, m))
        .collect())
}

/// Resolves the (months, quarter, year) request parameters to a concrete
/// month list. `quarter`+`year` expands to that quarter; `year` alone
/// expands to the stored months of that year. An unknown month is not an
/// error -- downstream queries simply return empty data.
pub async fn resolve_months(
    pool: &DbPool,
    months: Option<&str>,
    quarter: Option<u32>,
    year: Option<i32>,
) -> CostMatrixResult<Vec<String>> {
    if let Some(raw) = months {
        let parsed = parse_months_param(raw)?;
        if !parsed.is_empty() {
            return Ok(parsed);
        }
    }
    if let (Some(q), Some(y)) = (quarter, year) {
        return quarter_months(y, q);
    }
    if let Some(y) = year {
        let prefix = format!("{:04}-", y);
        return Ok(store::list_months(pool)
            .await?
            .into_iter()
            .filter(|m| m.starts_with(&prefix))
            .collect());
    }
    Err(CostMatrixError::Validation(
        "Missing months selection: pass months, quarter+year or year".to_string(),
    ))
}

/// "?,?,?" fragment for a dynamic IN clause.
pub fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}
