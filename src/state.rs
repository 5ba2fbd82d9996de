use std::sync::Arc;

use crate::config::Settings;
use crate::db::DbPool;
use crate::progress::ProgressTracker;
use crate::store::MonthLocks;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub settings: Arc<Settings>,
    pub progress: ProgressTracker,
    pub month_locks: MonthLocks,
}

impl axum::extract::FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
