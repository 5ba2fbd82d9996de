use serde::Deserialize;

pub mod anomalies;
pub mod dashboard;
pub mod departments;
pub mod months;
pub mod projects;
pub mod upload;

/// Shared month-selection parameters: an explicit CSV of YYYY-MM tags, a
/// quarter of a year, or a whole year.
#[derive(Debug, Default, Deserialize)]
pub struct MonthsQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
}
