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

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub sources_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub fetch_request_timeout_secs: u64,
    pub fetch_user_agent: String,
    pub fetch_inter_request_delay_ms: u64,
    pub fetch_max_pages: usize,
    /// Products not observed for this many days are retired by the `retire`
    /// command.
    pub stale_after_days: i64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[redacted]")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("sources_path", &self.sources_path)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "fetch_request_timeout_secs",
                &self.fetch_request_timeout_secs,
            )
            .field("fetch_user_agent", &self.fetch_user_agent)
            .field(
                "fetch_inter_request_delay_ms",
                &self.fetch_inter_request_delay_ms,
            )
            .field("fetch_max_pages", &self.fetch_max_pages)
            .field("stale_after_days", &self.stale_after_days)
            .finish()
    }
}
