use crate::events::{OverflowPolicy, StreamConfig};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

fn default_max_pool_size() -> u32 {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfig {
    /// Unix socket path. Local defaults (DOCKER_HOST or the standard socket) when unset.
    pub socket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    /// 0 disables periodic reconciliation; the startup pass still runs.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Cron expression (local time). Replaces the fixed interval when set.
    #[serde(default)]
    pub reconcile_schedule: Option<String>,
    #[serde(default = "default_inspect_timeout_ms")]
    pub inspect_timeout_ms: u64,
    /// How often to log sync stats at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

/// Upper bound for the periodic timers (30 days).
pub const MAX_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

fn default_queue_size() -> usize {
    1000
}

fn default_backoff_min_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_jitter() -> f64 {
    0.2
}

fn default_reconcile_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_inspect_timeout_ms() -> u64 {
    10_000
}

fn default_stats_log_interval_secs() -> u64 {
    300
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_size: default_queue_size(),
            overflow_policy: OverflowPolicy::default(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            reconcile_schedule: None,
            inspect_timeout_ms: default_inspect_timeout_ms(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

impl SyncConfig {
    pub fn stream(&self) -> StreamConfig {
        StreamConfig {
            backoff_min: Duration::from_millis(self.backoff_min_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            backoff_jitter: self.backoff_jitter,
        }
    }

    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_millis(self.inspect_timeout_ms)
    }

    /// `None` when periodic reconciliation is disabled.
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0)
            .then(|| Duration::from_secs(self.reconcile_interval_secs))
    }

    pub fn stats_log_interval(&self) -> Duration {
        Duration::from_secs(self.stats_log_interval_secs)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        let sync = &self.sync;
        anyhow::ensure!(
            sync.queue_size > 0,
            "sync.queue_size must be > 0, got {}",
            sync.queue_size
        );
        anyhow::ensure!(
            sync.backoff_min_ms > 0,
            "sync.backoff_min_ms must be > 0, got {}",
            sync.backoff_min_ms
        );
        anyhow::ensure!(
            sync.backoff_max_ms >= sync.backoff_min_ms,
            "sync.backoff_max_ms must be >= sync.backoff_min_ms ({}), got {}",
            sync.backoff_min_ms,
            sync.backoff_max_ms
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&sync.backoff_jitter),
            "sync.backoff_jitter must be between 0 and 1, got {}",
            sync.backoff_jitter
        );
        anyhow::ensure!(
            sync.inspect_timeout_ms > 0,
            "sync.inspect_timeout_ms must be > 0, got {}",
            sync.inspect_timeout_ms
        );
        anyhow::ensure!(
            sync.reconcile_interval_secs <= MAX_INTERVAL_SECS,
            "sync.reconcile_interval_secs must be <= {}, got {}",
            MAX_INTERVAL_SECS,
            sync.reconcile_interval_secs
        );
        anyhow::ensure!(
            (1..=MAX_INTERVAL_SECS).contains(&sync.stats_log_interval_secs),
            "sync.stats_log_interval_secs must be between 1 and {}, got {}",
            MAX_INTERVAL_SECS,
            sync.stats_log_interval_secs
        );
        if let Some(expr) = &sync.reconcile_schedule {
            cron::Schedule::from_str(expr).map_err(|e| {
                anyhow::anyhow!("sync.reconcile_schedule is not a valid cron expression: {e}")
            })?;
        }
        Ok(())
    }
}
