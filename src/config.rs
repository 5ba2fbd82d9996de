use std::env;
use std::path::PathBuf;

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://localhost:8180",
    "http://127.0.0.1:8180",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    Sqlite,
    Mysql,
}

/// Runtime configuration, read once at startup from the environment
/// (a `.env` file is honoured via dotenvy before this runs).
/// None of these options change analytical behaviour.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_root: PathBuf,
    pub max_upload_size_mb: u64,
    pub allowed_origins: Vec<String>,
    pub access_token_expire_minutes: i64,
    pub default_admin_username: String,
    pub initial_admin_password_file: PathBuf,
    pub db_backend: DbBackend,
    pub app_debug: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        let data_root = PathBuf::from(
            env::var("DATA_ROOT").unwrap_or_else(|_| "./data-root".to_string()),
        );

        let db_backend = match env::var("DB_BACKEND").as_deref() {
            Ok("mysql") => {
                tracing::warn!("DB_BACKEND=mysql is not built in; falling back to sqlite");
                DbBackend::Sqlite
            }
            _ => DbBackend::Sqlite,
        };

        let initial_admin_password_file = env::var("INITIAL_ADMIN_PASSWORD_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_root.join("config/initial_admin_password.txt"));

        Self {
            max_upload_size_mb: env::var("MAX_UPLOAD_SIZE_MB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            allowed_origins: parse_origins(env::var("ALLOWED_ORIGINS").ok().as_deref()),
            access_token_expire_minutes: env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24 * 60),
            default_admin_username: env::var("DEFAULT_ADMIN_USERNAME")
                .unwrap_or_else(|_| "admin".to_string()),
            initial_admin_password_file,
            db_backend,
            app_debug: env::var("APP_DEBUG")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            data_root,
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.data_root.join("uploads")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_root.join("data")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_root.join("logs")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("costmatrix.db")
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        (self.max_upload_size_mb as usize) * 1024 * 1024
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.upload_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

/// ALLOWED_ORIGINS accepts a comma-separated list or a JSON array string.
pub(crate) fn parse_origins(raw: Option<&str>) -> Vec<String> {
    let defaults = || DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect();

    let Some(raw) = raw else { return defaults() };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return defaults();
    }

    if trimmed.starts_with('[') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
            let origins: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !origins.is_empty() {
                return origins;
            }
        }
        return defaults();
    }

    let origins: Vec<String> = trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if origins.is_empty() {
        defaults()
    } else {
        origins
    }
}
