use std::time::Duration;

use tracing::{error, info, warn};

use crate::{
    error::Result,
    poller::CatchUpPoller,
    trigger::{zone_or_utc, CronSpec, CronTrigger, FireContext, OneShotSpec, OneShotTrigger},
    types::{Schedule, Timing},
};

/// How long cancelled work units get to unwind before shutdown gives up on them.
const CANCEL_DRAIN: Duration = Duration::from_secs(2);

/// A started trigger owned by the registrar.
pub enum ArmedTrigger {
    Cron(CronTrigger),
    OneShot(OneShotTrigger),
}

impl ArmedTrigger {
    fn stop(&mut self) {
        match self {
            ArmedTrigger::Cron(t) => t.stop(),
            ArmedTrigger::OneShot(t) => t.stop(),
        }
    }
}

/// Counts from one `load_and_arm` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmSummary {
    pub cron: usize,
    pub one_shot: usize,
    /// Consumed one-shots and rows with an unusable cron expression.
    pub skipped: usize,
}

/// How shutdown went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReport {
    /// Every in-flight fire finished inside the grace period.
    Drained,
    /// Work was cancelled after the grace period and unwound in time.
    Canceled,
    /// Some fires were still running when shutdown gave up.
    Abandoned,
}

/// The set of armed triggers for this process, plus the catch-up poller.
///
/// Built once at startup, torn down once at shutdown. Schedules added to the
/// store afterwards are only seen by the poller (one-shots) or the next start.
pub struct ScheduleRegistrar {
    ctx: FireContext,
    triggers: Vec<ArmedTrigger>,
    poller: Option<CatchUpPoller>,
}

impl ScheduleRegistrar {
    pub fn new(ctx: FireContext) -> Self {
        Self {
            ctx,
            triggers: Vec::new(),
            poller: None,
        }
    }

    pub fn context(&self) -> &FireContext {
        &self.ctx
    }

    pub fn armed(&self) -> usize {
        self.triggers.len()
    }

    /// Load every enabled schedule and arm a trigger for each.
    ///
    /// A failing store read is returned; a single bad row is logged and skipped.
    pub async fn load_and_arm(&mut self) -> Result<ArmSummary> {
        let schedules = self.ctx.store.load_enabled_schedules().await?;
        let mut summary = ArmSummary::default();
        for schedule in schedules {
            match self.arm(schedule) {
                Some(ArmedKind::Cron) => summary.cron += 1,
                Some(ArmedKind::OneShot) => summary.one_shot += 1,
                None => summary.skipped += 1,
            }
        }
        info!(
            cron = summary.cron,
            one_shot = summary.one_shot,
            skipped = summary.skipped,
            "schedules registered"
        );
        Ok(summary)
    }

    fn arm(&mut self, schedule: Schedule) -> Option<ArmedKind> {
        let zone = zone_or_utc(&schedule.timezone);
        match schedule.timing {
            Timing::Cron { expression } => {
                let spec = match CronSpec::new(schedule.id, &schedule.plan_id, &expression, zone) {
                    Ok(spec) => spec,
                    Err(e) => {
                        error!(schedule_id = schedule.id, plan_id = %schedule.plan_id, "not arming: {e}");
                        return None;
                    }
                };
                let mut trigger = CronTrigger::new(spec, self.ctx.clone());
                trigger.start();
                self.triggers.push(ArmedTrigger::Cron(trigger));
                Some(ArmedKind::Cron)
            }
            Timing::OneShot { consumed: true, .. } => None,
            Timing::OneShot { fire_at, .. } => {
                let spec = OneShotSpec {
                    schedule_id: schedule.id,
                    plan_id: schedule.plan_id,
                    fire_at,
                    zone,
                };
                let mut trigger = OneShotTrigger::new(spec, self.ctx.clone());
                trigger.start();
                self.triggers.push(ArmedTrigger::OneShot(trigger));
                Some(ArmedKind::OneShot)
            }
        }
    }

    /// Start the catch-up poller. Calling it again is a no-op.
    pub fn start_catch_up(&mut self, interval: Duration) {
        self.poller
            .get_or_insert_with(|| CatchUpPoller::new(self.ctx.clone(), interval))
            .start();
    }

    /// Stop arming, give in-flight fires `grace` to finish, then cancel them.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        info!(triggers = self.triggers.len(), "stopping triggers");
        for trigger in &mut self.triggers {
            trigger.stop();
        }
        if let Some(poller) = self.poller.as_mut() {
            poller.stop();
        }
        self.ctx.shutdown.cancel();

        self.ctx.tracker.close();
        if tokio::time::timeout(grace, self.ctx.tracker.wait()).await.is_ok() {
            info!("in-flight jobs drained");
            return ShutdownReport::Drained;
        }

        warn!(
            in_flight = self.ctx.tracker.len(),
            grace_secs = grace.as_secs(),
            "grace period over, canceling running jobs"
        );
        self.ctx.work_cancel.cancel();
        if tokio::time::timeout(CANCEL_DRAIN, self.ctx.tracker.wait()).await.is_ok() {
            ShutdownReport::Canceled
        } else {
            error!(in_flight = self.ctx.tracker.len(), "jobs still running at exit");
            ShutdownReport::Abandoned
        }
    }
}

enum ArmedKind {
    Cron,
    OneShot,
}
