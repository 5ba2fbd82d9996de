use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Serialize;

/// Terminal tasks stay readable for an hour, then the sweeper drops them.
const TERMINAL_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressStep {
    pub step: String,
    pub completed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressTask {
    pub task_id: String,
    pub file_name: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_step: String,
    pub steps: Vec<ProgressStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    finished_at: Option<Instant>,
    #[serde(skip)]
    cancel_requested: bool,
}

/// In-process progress table for running ingestions. Single writer per
/// task_id; readers poll `get`. Nothing here outlives the process.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<HashMap<String, ProgressTask>>>,
}

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, task_id: &str, file_name: &str) {
        let now = now_stamp();
        let task = ProgressTask {
            task_id: task_id.to_string(),
            file_name: file_name.to_string(),
            status: TaskStatus::Uploading,
            progress: 0,
            current_step: "正在上传文件...".to_string(),
            steps: Vec::new(),
            error: None,
            created_at: now.clone(),
            updated_at: now,
            finished_at: None,
            cancel_requested: false,
        };
        if let Ok(mut map) = self.inner.lock() {
            map.insert(task_id.to_string(), task);
        }
    }

    pub fn update(&self, task_id: &str, progress: u8, current_step: &str) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(task) = map.get_mut(task_id) {
                // progress only ever moves forward
                task.progress = task.progress.max(progress.min(100));
                task.current_step = current_step.to_string();
                task.updated_at = now_stamp();
                if task.status == TaskStatus::Uploading {
                    task.status = TaskStatus::Processing;
                }
            }
        }
    }

    pub fn add_step(&self, task_id: &str, step: &str) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(task) = map.get_mut(task_id) {
                task.steps.push(ProgressStep {
                    step: step.to_string(),
                    completed_at: now_stamp(),
                });
            }
        }
    }

    pub fn complete(&self, task_id: &str) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(task) = map.get_mut(task_id) {
                task.status = TaskStatus::Completed;
                task.progress = 100;
                task.current_step = "上传并解析完成".to_string();
                task.updated_at = now_stamp();
                task.finished_at = Some(Instant::now());
            }
        }
    }

    pub fn fail(&self, task_id: &str, error: &str) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(task) = map.get_mut(task_id) {
                task.status = TaskStatus::Failed;
                task.error = Some(error.to_string());
                task.current_step = format!("上传失败: {error}");
                task.updated_at = now_stamp();
                task.finished_at = Some(Instant::now());
            }
        }
    }

    /// Flags a task for cancellation. Only honoured before the first
    /// month write begins; later the ingestor ignores it.
    pub fn request_cancel(&self, task_id: &str) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(task) = map.get_mut(task_id) {
                if !task.status.is_terminal() {
                    task.cancel_requested = true;
                }
            }
        }
    }

    pub fn cancel_requested(&self, task_id: &str) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(task_id).map(|t| t.cancel_requested))
            .unwrap_or(false)
    }

    pub fn get(&self, task_id: &str) -> Option<ProgressTask> {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(task_id).cloned())
    }

    /// Drops terminal tasks past their retention window. Called from the
    /// background sweeper.
    pub fn sweep_expired(&self) {
        if let Ok(mut map) = self.inner.lock() {
            map.retain(|task_id, task| {
                let expired = task
                    .finished_at
                    .map(|at| at.elapsed() > TERMINAL_RETENTION)
                    .unwrap_or(false);
                if expired {
                    tracing::info!("cleaned up finished task {task_id}");
                }
                !expired
            });
        }
    }
}
