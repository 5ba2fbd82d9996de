use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::{AnomalyRow, AttendanceRow, DbPool, TravelRow, UploadRecord};
use crate::error::{CostMatrixError, CostMatrixResult};
use crate::month::placeholders;
use crate::normalizer::{department_levels, AttendanceRecord, TravelRecord};
use crate::validator::AnomalyDraft;

/// How long a writer waits for the month lock before reporting contention.
const LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Advisory per-month write locks. Ingestions of different months run in
/// parallel; writers of the same month serialise, last writer wins.
#[derive(Clone, Default)]
pub struct MonthLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl MonthLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        month: &str,
    ) -> CostMatrixResult<tokio::sync::OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .map_err(|_| CostMatrixError::Internal("month lock table poisoned".to_string()))?;
            map.entry(month.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        tokio::time::timeout(LOCK_TIMEOUT, lock.lock_owned())
            .await
            .map_err(|_| CostMatrixError::Contention(month.to_string()))
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ReplaceMonthStats {
    pub attendance_count: usize,
    pub travel_count: usize,
    pub anomaly_count: usize,
}

/// Atomic per-month replace: everything previously stored for the month is
/// deleted and the new row sets inserted in one transaction. Readers see
/// either the old or the new state, never a mix.
pub async fn replace_month(
    pool: &DbPool,
    locks: &MonthLocks,
    month: &str,
    attendance: &[AttendanceRecord],
    travel: &[TravelRecord],
    anomalies: &[AnomalyDraft],
) -> CostMatrixResult<ReplaceMonthStats> {
    let _guard = locks.acquire(month).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM attendance WHERE source_month = ?")
        .bind(month)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM travel_orders WHERE source_month = ?")
        .bind(month)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM anomalies WHERE source_month = ?")
        .bind(month)
        .execute(&mut *tx)
        .await?;

    let mut stats = ReplaceMonthStats::default();

    // (employee, date) is unique within a month; keep the first occurrence
    let mut seen: HashSet<(&str, NaiveDate)> = HashSet::new();
    for record in attendance {
        if !seen.insert((record.employee_name.as_str(), record.date)) {
            tracing::warn!(
                "duplicate attendance row dropped: {} {}",
                record.employee_name,
                record.date
            );
            continue;
        }
        let (l1, l2, l3) = department_levels(&record.department);
        sqlx::query(
            "INSERT INTO attendance \
             (date, employee_name, dept_level1, dept_level2, dept_level3, status, work_hours, checkout_time, source_month) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.date)
        .bind(&record.employee_name)
        .bind(&l1)
        .bind(&l2)
        .bind(&l3)
        .bind(record.status.as_str())
        .bind(record.work_hours)
        .bind(record.checkout_time.map(|t| t.format("%H:%M:%S").to_string()))
        .bind(month)
        .execute(&mut *tx)
        .await?;
        stats.attendance_count += 1;
    }

    for order in travel {
        let (l1, l2, l3) = department_levels(&order.department);
        sqlx::query(
            "INSERT INTO travel_orders \
             (kind, event_date, booker_name, traveller_name, dept_level1, dept_level2, dept_level3, \
              amount, project_code, project_name, advance_days, is_over_standard, over_standard_reason, source_month) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.kind.as_str())
        .bind(order.event_date)
        .bind(&order.booker_name)
        .bind(&order.traveller_name)
        .bind(&l1)
        .bind(&l2)
        .bind(&l3)
        .bind(order.amount)
        .bind(&order.project_code)
        .bind(&order.project_name)
        .bind(order.advance_days)
        .bind(order.is_over_standard)
        .bind(&order.over_standard_reason)
        .bind(month)
        .execute(&mut *tx)
        .await?;
        stats.travel_count += 1;
    }

    for anomaly in anomalies {
        let (l1, l2, l3) = department_levels(&anomaly.department);
        sqlx::query(
            "INSERT INTO anomalies \
             (date, employee_name, dept_level1, dept_level2, dept_level3, kind, detail, attendance_status, source_month) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(anomaly.date)
        .bind(&anomaly.employee_name)
        .bind(&l1)
        .bind(&l2)
        .bind(&l3)
        .bind(anomaly.kind.as_str())
        .bind(&anomaly.detail)
        .bind(&anomaly.attendance_status)
        .bind(month)
        .execute(&mut *tx)
        .await?;
        stats.anomaly_count += 1;
    }

    tx.commit().await?;
    Ok(stats)
}

#[derive(Debug, Default, Serialize)]
pub struct DeleteMonthReport {
    pub deleted_attendance: u64,
    pub deleted_travel: u64,
    pub deleted_anomalies: u64,
    pub deleted_uploads: Vec<String>,
    pub deleted_files: Vec<String>,
}

/// Removes every row of the month from the three fact tables, shrinks the
/// covered-month set of each affected upload record, and drops records
/// (plus their workbook blobs) that end up covering nothing.
pub async fn delete_month(
    pool: &DbPool,
    locks: &MonthLocks,
    month: &str,
) -> CostMatrixResult<DeleteMonthReport> {
    let _guard = locks.acquire(month).await?;

    let mut report = DeleteMonthReport::default();
    let mut tx = pool.begin().await?;

    report.deleted_attendance = sqlx::query("DELETE FROM attendance WHERE source_month = ?")
        .bind(month)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    report.deleted_travel = sqlx::query("DELETE FROM travel_orders WHERE source_month = ?")
        .bind(month)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    report.deleted_anomalies = sqlx::query("DELETE FROM anomalies WHERE source_month = ?")
        .bind(month)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let uploads: Vec<UploadRecord> = sqlx::query_as("SELECT * FROM uploads")
        .fetch_all(&mut *tx)
        .await?;

    for upload in uploads {
        let mut months = upload.months();
        if !months.iter().any(|m| m == month) {
            continue;
        }
        months.retain(|m| m != month);

        if months.is_empty() {
            sqlx::query("DELETE FROM uploads WHERE id = ?")
                .bind(upload.id)
                .execute(&mut *tx)
                .await?;
            report.deleted_uploads.push(upload.file_path);
        } else {
            sqlx::query("UPDATE uploads SET months_covered = ? WHERE id = ?")
                .bind(serde_json::to_string(&months)?)
                .bind(upload.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    for path in report.deleted_uploads.clone() {
        match std::fs::remove_file(&path) {
            Ok(()) => report.deleted_files.push(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to delete workbook {path}: {e}"),
        }
    }

    Ok(report)
}

/// Distinct months present in attendance rows, ascending. Attendance is
/// the canonical anchor for month discovery.
pub async fn list_months(pool: &DbPool) -> CostMatrixResult<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT source_month FROM attendance ORDER BY source_month ASC")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(m,)| m).collect())
}

pub async fn fetch_attendance(
    pool: &DbPool,
    months: &[String],
) -> CostMatrixResult<Vec<AttendanceRow>> {
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM attendance WHERE source_month IN ({}) ORDER BY source_month, date, id",
        placeholders(months.len())
    );
    let mut query = sqlx::query_as(&sql);
    for month in months {
        query = query.bind(month);
    }
    Ok(query.fetch_all(pool).await?)
}

pub async fn fetch_travel(pool: &DbPool, months: &[String]) -> CostMatrixResult<Vec<TravelRow>> {
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM travel_orders WHERE source_month IN ({}) ORDER BY source_month, event_date, id",
        placeholders(months.len())
    );
    let mut query = sqlx::query_as(&sql);
    for month in months {
        query = query.bind(month);
    }
    Ok(query.fetch_all(pool).await?)
}

pub async fn fetch_anomalies(
    pool: &DbPool,
    months: &[String],
) -> CostMatrixResult<Vec<AnomalyRow>> {
    if months.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM anomalies WHERE source_month IN ({}) ORDER BY source_month, date, id",
        placeholders(months.len())
    );
    let mut query = sqlx::query_as(&sql);
    for month in months {
        query = query.bind(month);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Insert-or-update keyed by the content hash; re-uploading the same
/// workbook refreshes the record and unions the covered months.
pub async fn upsert_upload(
    pool: &DbPool,
    file_name: &str,
    file_path: &str,
    file_size: i64,
    file_hash: &str,
    covered_months: &[String],
) -> CostMatrixResult<UploadRecord> {
    let existing: Option<UploadRecord> =
        sqlx::query_as("SELECT * FROM uploads WHERE file_hash = ?")
            .bind(file_hash)
            .fetch_optional(pool)
            .await?;

    let now = chrono::Local::now().naive_local();

    if let Some(existing) = existing {
        let mut months = existing.months();
        for month in covered_months {
            if !months.iter().any(|m| m == month) {
                months.push(month.clone());
            }
        }
        months.sort();

        sqlx::query(
            "UPDATE uploads SET file_name = ?, file_path = ?, file_size = ?, \
             months_covered = ?, parsed = 1, last_analyzed_at = ? WHERE id = ?",
        )
        .bind(file_name)
        .bind(file_path)
        .bind(file_size)
        .bind(serde_json::to_string(&months)?)
        .bind(now)
        .bind(existing.id)
        .execute(pool)
        .await?;
    } else {
        let mut months = covered_months.to_vec();
        months.sort();
        sqlx::query(
            "INSERT INTO uploads (file_name, file_path, file_size, file_hash, months_covered, parsed, last_analyzed_at) \
             VALUES (?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(file_name)
        .bind(file_path)
        .bind(file_size)
        .bind(file_hash)
        .bind(serde_json::to_string(&months)?)
        .bind(now)
        .execute(pool)
        .await?;
    }

    let record = sqlx::query_as("SELECT * FROM uploads WHERE file_hash = ?")
        .bind(file_hash)
        .fetch_one(pool)
        .await?;
    Ok(record)
}

pub async fn list_uploads(pool: &DbPool) -> CostMatrixResult<Vec<UploadRecord>> {
    Ok(
        sqlx::query_as("SELECT * FROM uploads ORDER BY uploaded_at DESC, id DESC")
            .fetch_all(pool)
            .await?,
    )
}
