use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};

use crate::error::{CostMatrixError, CostMatrixResult};

pub type DbPool = Pool<Sqlite>;

pub async fn init_pool(database_path: &Path) -> CostMatrixResult<DbPool> {
    let opts = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect_with(opts)
        .await?)
}

/// In-memory pool, used by the test suite. A single connection keeps the
/// `:memory:` database alive and shared across queries.
pub async fn init_memory_pool() -> CostMatrixResult<DbPool> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| CostMatrixError::Internal(format!("Invalid DB URL: {}", e)))?;

    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?)
}

pub async fn init_database(pool: &DbPool) -> CostMatrixResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database ready");
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceRow {
    pub id: i64,
    pub date: NaiveDate,
    pub employee_name: String,
    pub dept_level1: String,
    pub dept_level2: Option<String>,
    pub dept_level3: Option<String>,
    pub status: String,
    pub work_hours: f64,
    pub checkout_time: Option<String>,
    pub source_month: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TravelRow {
    pub id: i64,
    pub kind: String,
    pub event_date: NaiveDate,
    pub booker_name: String,
    pub traveller_name: String,
    pub dept_level1: String,
    pub dept_level2: Option<String>,
    pub dept_level3: Option<String>,
    pub amount: f64,
    pub project_code: Option<String>,
    pub project_name: Option<String>,
    pub advance_days: Option<i64>,
    pub is_over_standard: bool,
    pub over_standard_reason: Option<String>,
    pub source_month: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnomalyRow {
    pub id: i64,
    pub date: NaiveDate,
    pub employee_name: String,
    pub dept_level1: String,
    pub dept_level2: Option<String>,
    pub dept_level3: Option<String>,
    pub kind: String,
    pub detail: String,
    pub attendance_status: Option<String>,
    pub source_month: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadRecord {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_hash: String,
    pub uploaded_at: NaiveDateTime,
    /// JSON array of YYYY-MM tags.
    pub months_covered: String,
    pub parsed: bool,
    pub last_analyzed_at: Option<NaiveDateTime>,
}

impl UploadRecord {
    pub fn months(&self) -> Vec<String> {
        serde_json::from_str(&self.months_covered).unwrap_or_default()
    }
}
