use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for realtime events
    pub redis_url: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// HS256 secret for identity bearer tokens
    pub jwt_secret: String,

    /// Attempt budget for newly enqueued jobs
    #[serde(default = "default_job_max_attempts")]
    pub job_max_attempts: i32,

    /// Base retry delay in seconds; doubled per attempt
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Upper bound on the retry delay in seconds
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// How long a claimed job is held before the reclaim sweep may take it back
    #[serde(default = "default_job_lease_secs")]
    pub job_lease_secs: u64,

    /// Worker poll interval when the queue is empty
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Interval between lease-reclaim sweeps
    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_job_max_attempts() -> i32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_backoff_cap_secs() -> u64 {
    300
}

fn default_job_lease_secs() -> u64 {
    600
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_reclaim_interval_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
