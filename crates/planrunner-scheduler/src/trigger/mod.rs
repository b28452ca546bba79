//! Triggers decide *when* an occurrence fires; the coordinator decides
//! whether it may run.
//!
//! Every fire is its own task on the shared [`TaskTracker`] so shutdown can
//! wait for in-flight work. Triggers never coordinate with each other: two
//! fires for the same occurrence meet at the store's try-lock and at the
//! one-shot `consumed` compare-and-set.

pub mod cron_trigger;
pub mod one_shot;

use std::future::Future;
use std::sync::Arc;

use chrono_tz::Tz;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::warn;

use crate::{coordinator::JobRunCoordinator, store::ScheduleStore};

pub use cron_trigger::{CronSpec, CronTrigger};
pub use one_shot::{fire_one_shot, FireOutcome, OneShotSpec, OneShotTrigger};

/// Shared handles every trigger, the poller and each fire task need.
#[derive(Clone)]
pub struct FireContext {
    pub store: Arc<dyn ScheduleStore>,
    pub coordinator: Arc<JobRunCoordinator>,
    /// Tracks in-flight fires so shutdown can drain them.
    pub tracker: TaskTracker,
    /// Cancelled first at shutdown: trigger loops and the poller stop arming.
    pub shutdown: CancellationToken,
    /// Cancelled after the grace period: running work units are told to stop.
    pub work_cancel: CancellationToken,
}

impl FireContext {
    pub fn new(store: Arc<dyn ScheduleStore>, coordinator: Arc<JobRunCoordinator>) -> Self {
        Self {
            store,
            coordinator,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            work_cancel: CancellationToken::new(),
        }
    }

    /// Spawn a fire task unless shutdown has begun. Returns whether it was spawned.
    pub fn spawn_fire<F>(&self, fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.tracker.spawn(fire);
        true
    }
}

/// Resolve an IANA zone name, falling back to UTC for unknown names.
pub fn zone_or_utc(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone = %name, "unknown time zone, falling back to UTC");
        Tz::UTC
    })
}
