use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store connection mutex was poisoned by a panicking holder.
    #[error("Store connection poisoned")]
    StorePoisoned,

    /// The try-lock itself could not be attempted. No run row was written.
    #[error("Lock attempt failed for token {token}: {reason}")]
    Lock { token: i64, reason: String },

    /// A schedule row violates the cron/one-shot shape rules.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid cron expression {expression:?}: {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Unknown time zone: {0}")]
    InvalidTimezone(String),

    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: i64 },

    /// The work unit reported a failure; the message is recorded on the run row.
    #[error("Job failed: {0}")]
    Work(String),

    /// The work unit stopped because the runner is shutting down.
    #[error("Job canceled")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
