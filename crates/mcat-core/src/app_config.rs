use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide settings read from `MCAT_*` environment variables.
///
/// The CLI consumes the database, logging, audit and category settings. The
/// dispatch, batch and upload settings configure `ChangeDispatcher` and
/// `BatchTracker` for services that embed them, via each component's
/// `from_app_config`.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub audit_log_path: PathBuf,
    pub db_busy_timeout_secs: u64,
    pub dispatch_interval_secs: u64,
    pub dispatch_batch_limit: u32,
    pub batch_poll_interval_secs: u64,
    pub batch_timeout_secs: u64,
    pub upload_chunk_size: usize,
    pub upload_pause_ms: u64,
    /// Minimum similarity at which a category match is accepted unattended.
    pub category_auto_accept: f64,
    /// How many candidates are offered when a match needs a human.
    pub category_candidates: usize,
    pub duplicate_warnings_per_minute: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("audit_log_path", &self.audit_log_path)
            .field("db_busy_timeout_secs", &self.db_busy_timeout_secs)
            .field("dispatch_interval_secs", &self.dispatch_interval_secs)
            .field("dispatch_batch_limit", &self.dispatch_batch_limit)
            .field("batch_poll_interval_secs", &self.batch_poll_interval_secs)
            .field("batch_timeout_secs", &self.batch_timeout_secs)
            .field("upload_chunk_size", &self.upload_chunk_size)
            .field("upload_pause_ms", &self.upload_pause_ms)
            .field("category_auto_accept", &self.category_auto_accept)
            .field("category_candidates", &self.category_candidates)
            .field(
                "duplicate_warnings_per_minute",
                &self.duplicate_warnings_per_minute,
            )
            .finish()
    }
}
