use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
pub const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_LOCK_STALE_AFTER_SECS: u64 = 3600;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_WORK_DURATION_MS: u64 = 2_000;

/// Top-level config (planrunner.toml + PLANRUNNER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanrunnerConfig {
    pub database: DatabaseConfig,
    pub runner: RunnerConfig,
    pub work: WorkConfig,
    pub seed: SeedConfig,
}

/// Shared store location. Every cooperating runner must point at the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    /// How long a writer waits on a locked database file before failing.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Identity written to `job_runs.worker_id`. Falls back to the hostname.
    pub worker_id: Option<String>,
    /// Cadence of the one-shot catch-up rescan.
    pub poll_interval_secs: u64,
    /// Time in-flight jobs get to finish after shutdown before they are cancelled.
    pub shutdown_grace_secs: u64,
    /// Upper bound on closing the store session at exit.
    pub close_timeout_secs: u64,
    /// A run lock older than this is considered abandoned by a dead runner.
    pub lock_stale_after_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            close_timeout_secs: DEFAULT_CLOSE_TIMEOUT_SECS,
            lock_stale_after_secs: DEFAULT_LOCK_STALE_AFTER_SECS,
        }
    }
}

impl RunnerConfig {
    pub fn worker_id(&self) -> String {
        self.worker_id
            .clone()
            .filter(|w| !w.trim().is_empty())
            .unwrap_or_else(local_hostname)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }
}

/// Settings for the built-in sleep work unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    pub duration_ms: u64,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_WORK_DURATION_MS,
        }
    }
}

impl WorkConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Demo schedules inserted at startup: one cron row and one one-shot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub enabled: bool,
    pub plan_id: String,
    /// Six fields, seconds first.
    pub cron_expr: String,
    pub timezone: String,
    pub one_shot_delay_secs: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            plan_id: "1".to_string(),
            cron_expr: "0 */1 * * * *".to_string(),
            timezone: "UTC".to_string(),
            one_shot_delay_secs: 90,
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.planrunner/planrunner.db", home)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.planrunner/planrunner.toml", home)
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "planrunner".to_string())
}

impl PlanrunnerConfig {
    /// Load config from a TOML file with PLANRUNNER_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `PLANRUNNER_RUNNER__POLL_INTERVAL_SECS=5`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PLANRUNNER_").split("__"))
    }
}
