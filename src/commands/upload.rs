use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::db::UploadRecord;
use crate::error::{CostMatrixError, CostMatrixResult};
use crate::ingest;
use crate::progress::ProgressTask;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::store;

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub task_id: String,
}

/// Accepts one workbook, persists it, and hands the rest of the pipeline
/// to a background task. The response carries only the task id; clients
/// follow `/api/progress/{task_id}`.
pub async fn upload_workbook(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> CostMatrixResult<Json<ApiResponse<UploadAccepted>>> {
    let mut original_name: Option<String> = None;
    let mut payload: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CostMatrixError::Validation(format!("读取上传内容失败: {e}")))?
    {
        if field.name() == Some("file") {
            original_name = field.file_name().map(str::to_string);
            payload = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| CostMatrixError::Validation(format!("读取上传内容失败: {e}")))?
                    .to_vec(),
            );
        }
    }

    let name = original_name
        .ok_or_else(|| CostMatrixError::Validation("缺少 file 字段".to_string()))?;
    if !(name.ends_with(".xlsx") || name.ends_with(".xls")) {
        return Err(CostMatrixError::Validation(
            "仅支持 .xlsx 或 .xls 文件".to_string(),
        ));
    }
    let payload =
        payload.ok_or_else(|| CostMatrixError::Validation("上传内容为空".to_string()))?;
    if payload.len() > state.settings.max_upload_size_bytes() {
        return Err(CostMatrixError::Validation(format!(
            "文件超出大小限制 ({} MB)",
            state.settings.max_upload_size_mb
        )));
    }

    let task_id = Uuid::new_v4().to_string();
    state.progress.create(&task_id, &name);

    let saved = ingest::save_workbook(&state.settings.upload_dir(), &name, &payload)?;
    state.progress.update(&task_id, 10, "文件已保存");
    state.progress.add_step(&task_id, "上传文件");

    tokio::spawn(ingest::run_pipeline(
        state.clone(),
        task_id.clone(),
        name,
        saved,
    ));

    Ok(ApiResponse::ok_with(
        "上传任务已创建",
        UploadAccepted { task_id },
    ))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> CostMatrixResult<Json<ApiResponse<ProgressTask>>> {
    match state.progress.get(&task_id) {
        Some(task) => Ok(ApiResponse::ok(task)),
        None => Err(CostMatrixError::Validation(format!(
            "任务不存在: {task_id}"
        ))),
    }
}

pub async fn list_uploads(
    State(state): State<AppState>,
) -> CostMatrixResult<Json<ApiResponse<Vec<UploadRecord>>>> {
    Ok(ApiResponse::ok(store::list_uploads(&state.pool).await?))
}
