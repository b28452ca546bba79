//! `planrunner-scheduler`: at-most-once plan execution across runners that
//! share one SQLite store.
//!
//! # Overview
//!
//! Every occurrence of a plan has an idempotency key (`plan|YYYYMMDDTHHMM`,
//! UTC minute) and a lock token derived from it. The
//! [`coordinator::JobRunCoordinator`] try-locks the token in the store, runs
//! the [`work::WorkUnit`] only if it got the lock, and records the outcome in
//! `job_runs`. Triggers decide when occurrences fire; the store decides
//! whether they may run.
//!
//! # Timing variants
//!
//! | Variant   | Fired by                                  | After firing        |
//! |-----------|-------------------------------------------|---------------------|
//! | `cron`    | [`trigger::CronTrigger`], every match     | keeps ticking       |
//! | `oneshot` | [`trigger::OneShotTrigger`] and the poller | `consumed = true`   |
//!
//! The [`registrar::ScheduleRegistrar`] arms a trigger per enabled schedule at
//! startup and drains in-flight fires at shutdown.

pub mod coordinator;
pub mod db;
pub mod error;
pub mod key;
pub mod poller;
pub mod registrar;
pub mod store;
pub mod trigger;
pub mod types;
pub mod work;

pub use coordinator::JobRunCoordinator;
pub use error::{Result, SchedulerError};
pub use key::{derive_key, derive_token, truncate_to_minute, Occurrence};
pub use poller::CatchUpPoller;
pub use registrar::{ArmSummary, ScheduleRegistrar, ShutdownReport};
pub use store::{ScheduleStore, SqliteStore};
pub use trigger::{FireContext, FireOutcome};
pub use types::{
    ExecuteOutcome, JobRun, NewSchedule, RunOutcome, Schedule, ScheduleKind, ScheduleRow, Timing,
};
pub use work::{JobContext, SleepWork, WorkError, WorkUnit};
