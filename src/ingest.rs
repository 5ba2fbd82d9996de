use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{CostMatrixError, CostMatrixResult};
use crate::month::month_of;
use crate::normalizer;
use crate::state::AppState;
use crate::store;
use crate::validator;

pub struct SavedUpload {
    pub path: PathBuf,
    pub file_hash: String,
    pub size: i64,
}

/// Persists the uploaded workbook under a collision-free name: the
/// original stem plus the first 8 hex digits of SHA-256(name + timestamp).
pub fn save_workbook(
    upload_dir: &Path,
    original_name: &str,
    bytes: &[u8],
) -> CostMatrixResult<SavedUpload> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = upload_dir.join(unique_upload_name(original_name, &timestamp));
    std::fs::write(&path, bytes)?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let file_hash = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();

    Ok(SavedUpload {
        path,
        file_hash,
        size: bytes.len() as i64,
    })
}

pub fn unique_upload_name(original_name: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(original_name.as_bytes());
    hasher.update(timestamp.as_bytes());
    let tag = hasher
        .finalize()
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect::<String>();

    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("workbook");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{tag}.{ext}"),
        None => format!("{stem}_{tag}"),
    }
}

/// Background half of one upload: parse, cross-validate, write each
/// covered month atomically, then register the upload. Any error marks
/// the task failed; months already committed stay committed.
pub async fn run_pipeline(
    state: AppState,
    task_id: String,
    original_name: String,
    saved: SavedUpload,
) {
    if let Err(e) = run_pipeline_inner(&state, &task_id, &original_name, &saved).await {
        tracing::error!("ingestion {task_id} failed: {e}");
        state.progress.fail(&task_id, &e.to_string());
    }
}

async fn run_pipeline_inner(
    state: &AppState,
    task_id: &str,
    original_name: &str,
    saved: &SavedUpload,
) -> CostMatrixResult<()> {
    let progress = &state.progress;

    progress.update(task_id, 20, "解析 Excel 文件...");
    let path = saved.path.clone();
    let workbook = tokio::task::spawn_blocking(move || normalizer::load_workbook(&path))
        .await
        .map_err(|e| CostMatrixError::Internal(format!("parser task panicked: {e}")))??;
    progress.add_step(task_id, "解析 Excel 文件");
    if !workbook.warnings.is_empty() {
        progress.add_step(
            task_id,
            &format!("数据清洗: {} 条行级告警", workbook.warnings.len()),
        );
    }

    let months: Vec<String> = workbook.months_covered.iter().cloned().collect();
    if months.is_empty() {
        return Err(CostMatrixError::SourceInvalid(
            "工作表中没有任何可解析的数据行".to_string(),
        ));
    }

    // last chance to bail out; once replace_month starts we never abandon
    // a half-written month
    if progress.cancel_requested(task_id) {
        return Err(CostMatrixError::Cancelled("CANCELLED".to_string()));
    }

    progress.update(task_id, 30, "交叉验证与入库...");
    let total = months.len();
    for (idx, month) in months.iter().enumerate() {
        let attendance: Vec<_> = workbook
            .attendance
            .iter()
            .filter(|r| month_of(r.date) == *month)
            .cloned()
            .collect();
        let travel: Vec<_> = workbook
            .travel
            .iter()
            .filter(|r| month_of(r.event_date) == *month)
            .cloned()
            .collect();

        let (anomalies, warnings) = validator::detect_anomalies(&attendance, &travel);
        for warning in &warnings {
            tracing::warn!("{month}: {warning}");
        }

        let stats = store::replace_month(
            &state.pool,
            &state.month_locks,
            month,
            &attendance,
            &travel,
            &anomalies,
        )
        .await?;

        let pct = 30 + (((idx + 1) * 60) / total) as u8;
        progress.update(task_id, pct, &format!("已写入 {month} 数据"));
        progress.add_step(
            task_id,
            &format!(
                "写入 {month}: 考勤 {} 条, 差旅 {} 条, 异常 {} 条",
                stats.attendance_count, stats.travel_count, stats.anomaly_count
            ),
        );
    }

    progress.update(task_id, 95, "更新上传记录...");
    store::upsert_upload(
        &state.pool,
        original_name,
        &saved.path.to_string_lossy(),
        saved.size,
        &saved.file_hash,
        &months,
    )
    .await?;

    progress.complete(task_id);
    tracing::info!(
        "ingestion {task_id} completed: {} attendance rows, {} travel rows over {} month(s)",
        workbook.attendance.len(),
        workbook.travel.len(),
        total
    );
    Ok(())
}
