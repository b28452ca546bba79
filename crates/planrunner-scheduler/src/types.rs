use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// When a schedule fires. Cron rows never carry a fire instant and one-shot
/// rows never carry an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timing {
    /// Six-field cron expression, seconds first, evaluated in the schedule's zone.
    Cron { expression: String },

    /// Single fire at an absolute instant. `consumed` only ever goes false → true.
    #[serde(rename = "oneshot")]
    OneShot {
        fire_at: DateTime<Utc>,
        consumed: bool,
    },
}

impl Timing {
    pub fn kind(&self) -> ScheduleKind {
        match self {
            Timing::Cron { .. } => ScheduleKind::Cron,
            Timing::OneShot { .. } => ScheduleKind::OneShot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    #[serde(rename = "cron")]
    Cron,
    #[serde(rename = "oneshot")]
    OneShot,
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleKind::Cron => "cron",
            ScheduleKind::OneShot => "oneshot",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cron" => Ok(ScheduleKind::Cron),
            "oneshot" => Ok(ScheduleKind::OneShot),
            other => Err(format!("unknown schedule kind: {other}")),
        }
    }
}

/// A persisted intent to run a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Store-assigned row id.
    pub id: i64,
    pub plan_id: String,
    #[serde(flatten)]
    pub timing: Timing,
    /// IANA zone name, e.g. `Europe/Rome`.
    pub timezone: String,
    pub enabled: bool,
}

/// A `plan_schedules` row as stored: nullable columns, timestamps still text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRow {
    pub id: i64,
    pub plan_id: String,
    pub kind: String,
    pub cron_expr: Option<String>,
    pub fire_at: Option<String>,
    pub timezone: String,
    pub consumed: bool,
    pub enabled: bool,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = SchedulerError;

    /// Rejects rows whose columns contradict their kind or whose `fire_at` is
    /// not an RFC 3339 instant.
    fn try_from(row: ScheduleRow) -> Result<Self> {
        let id = row.id;
        let kind: ScheduleKind = row.kind.parse().map_err(SchedulerError::InvalidSchedule)?;
        let fire_at = row
            .fire_at
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        SchedulerError::InvalidSchedule(format!("schedule {id} has fire_at {raw:?}: {e}"))
                    })
            })
            .transpose()?;
        let timing = match (kind, row.cron_expr, fire_at) {
            (ScheduleKind::Cron, Some(expression), None) if !expression.trim().is_empty() => {
                if row.consumed {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "cron schedule {id} is marked consumed"
                    )));
                }
                Timing::Cron { expression }
            }
            (ScheduleKind::OneShot, None, Some(fire_at)) => Timing::OneShot {
                fire_at,
                consumed: row.consumed,
            },
            (kind, _, _) => {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "{kind} schedule {id} has mismatched cron_expr/fire_at"
                )))
            }
        };
        Ok(Self {
            id,
            plan_id: row.plan_id,
            timing,
            timezone: row.timezone,
            enabled: row.enabled,
        })
    }
}

/// Provisioning input for a new schedule row.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub plan_id: String,
    pub timing: Timing,
    pub timezone: String,
    pub enabled: bool,
}

impl NewSchedule {
    pub fn cron(plan_id: &str, expression: &str, timezone: &str) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            timing: Timing::Cron {
                expression: expression.to_string(),
            },
            timezone: timezone.to_string(),
            enabled: true,
        }
    }

    pub fn one_shot(plan_id: &str, fire_at: DateTime<Utc>, timezone: &str) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            timing: Timing::OneShot {
                fire_at,
                consumed: false,
            },
            timezone: timezone.to_string(),
            enabled: true,
        }
    }
}

/// Outcome column of a `job_runs` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Lock won, work in progress (or interrupted by shutdown).
    Running,
    Success,
    /// Work unit failed; the message is on the row.
    Error,
    /// Another runner held the lock; nothing was executed.
    SkippedLock,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunOutcome::Running => "running",
            RunOutcome::Success => "success",
            RunOutcome::Error => "error",
            RunOutcome::SkippedLock => "skipped_lock",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunOutcome::Running),
            "success" => Ok(RunOutcome::Success),
            "error" => Ok(RunOutcome::Error),
            "skipped_lock" => Ok(RunOutcome::SkippedLock),
            other => Err(format!("unknown run outcome: {other}")),
        }
    }
}

/// One attempted occurrence of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub plan_id: String,
    pub idempotency_key: String,
    pub scheduled_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub error: Option<String>,
    /// Hostname (or configured id) of the runner that wrote the row last.
    pub worker_id: String,
    pub lock_token: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// What `JobRunCoordinator::execute` did with an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// This runner executed the work unit to success.
    Completed,
    /// Another attempt held the lock; nothing ran here.
    SkippedLock,
    /// The occurrence had already succeeded earlier; nothing ran here.
    AlreadySucceeded,
}
