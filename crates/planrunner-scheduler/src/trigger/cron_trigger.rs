use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::FireContext;
use crate::{
    error::{Result, SchedulerError},
    key::truncate_to_minute,
};

/// Everything one cron trigger is bound to at registration.
#[derive(Debug, Clone)]
pub struct CronSpec {
    pub schedule_id: i64,
    pub plan_id: String,
    pub expression: String,
    pub zone: Tz,
    parsed: ::cron::Schedule,
}

impl CronSpec {
    /// Parse a six-field (seconds-first) expression, or an `@` descriptor.
    pub fn new(schedule_id: i64, plan_id: &str, expression: &str, zone: Tz) -> Result<Self> {
        let expression = expression.trim();
        let fields = expression.split_whitespace().count();
        if !expression.starts_with('@') && fields != 6 {
            return Err(SchedulerError::InvalidCron {
                expression: expression.to_string(),
                reason: format!("expected 6 fields (sec min hour dom mon dow), got {fields}"),
            });
        }
        let parsed = ::cron::Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            schedule_id,
            plan_id: plan_id.to_string(),
            expression: expression.to_string(),
            zone,
            parsed,
        })
    }

    /// First matching instant strictly after `after`, evaluated in the schedule's zone.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.parsed
            .after(&after.with_timezone(&self.zone))
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Fires a plan at every instant matching its cron expression.
///
/// Fires are fire-and-forget: a slow job never delays the next tick, and
/// overlapping fires for the same minute converge on one run row.
pub struct CronTrigger {
    spec: Arc<CronSpec>,
    ctx: FireContext,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CronTrigger {
    pub fn new(spec: CronSpec, ctx: FireContext) -> Self {
        let stop = ctx.shutdown.child_token();
        Self {
            spec: Arc::new(spec),
            ctx,
            stop,
            task: None,
        }
    }

    pub fn spec(&self) -> &CronSpec {
        &self.spec
    }

    /// Start ticking. No-op while already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.stop.is_cancelled() {
            self.stop = self.ctx.shutdown.child_token();
        }
        info!(
            schedule_id = self.spec.schedule_id,
            plan_id = %self.spec.plan_id,
            cron = %self.spec.expression,
            tz = %self.spec.zone,
            "cron trigger armed"
        );
        self.task = Some(tokio::spawn(tick_loop(
            self.spec.clone(),
            self.ctx.clone(),
            self.stop.clone(),
        )));
    }

    /// Stop ticking. Fires already spawned keep running.
    pub fn stop(&mut self) {
        self.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

async fn tick_loop(spec: Arc<CronSpec>, ctx: FireContext, stop: CancellationToken) {
    // Never emit the same tick twice if the timer wakes marginally early.
    let mut last: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        let from = match last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        let Some(next) = spec.next_after(&from) else {
            info!(plan_id = %spec.plan_id, cron = %spec.expression, "cron expression has no further fire times");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        last = Some(next);

        let fire_spec = spec.clone();
        let fire_ctx = ctx.clone();
        if !ctx.spawn_fire(async move { fire_cron(&fire_spec, &fire_ctx).await }) {
            break;
        }
    }
    debug!(plan_id = %spec.plan_id, "cron trigger stopped");
}

/// One cron tick: the occurrence is "now in the zone, truncated to the minute".
async fn fire_cron(spec: &CronSpec, ctx: &FireContext) {
    let now = Utc::now().with_timezone(&spec.zone);
    let scheduled_at = truncate_to_minute(&now);
    match ctx
        .coordinator
        .execute(&spec.plan_id, scheduled_at, &ctx.work_cancel)
        .await
    {
        Ok(outcome) => debug!(plan_id = %spec.plan_id, ?outcome, "cron fire handled"),
        Err(SchedulerError::Canceled) => debug!(plan_id = %spec.plan_id, "cron fire canceled"),
        Err(e) => error!(plan_id = %spec.plan_id, schedule_id = spec.schedule_id, "cron fire failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::coordinator::JobRunCoordinator;
    use crate::key::derive_key;
    use crate::store::SqliteStore;
    use crate::work::SleepWork;

    #[test]
    fn rejects_five_field_and_garbage_expressions() {
        assert!(matches!(
            CronSpec::new(1, "p", "* * * * *", Tz::UTC),
            Err(SchedulerError::InvalidCron { .. })
        ));
        assert!(CronSpec::new(1, "p", "not a cron at all x", Tz::UTC).is_err());
        assert!(CronSpec::new(1, "p", "0 */1 * * * *", Tz::UTC).is_ok());
    }

    #[test]
    fn every_minute_at_second_zero_yields_distinct_keys() {
        let spec = CronSpec::new(1, "p", "0 * * * * *", Tz::UTC).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 30).unwrap();

        let mut fires = Vec::new();
        let mut cursor = start;
        for _ in 0..3 {
            cursor = spec.next_after(&cursor).unwrap();
            fires.push(cursor);
        }
        assert_eq!(fires[0], Utc.with_ymd_and_hms(2025, 5, 1, 10, 1, 0).unwrap());
        for pair in fires.windows(2) {
            assert_eq!(pair[1] - pair[0], TimeDelta::minutes(1));
            assert_ne!(derive_key("p", &pair[0]), derive_key("p", &pair[1]));
        }
    }

    #[test]
    fn expression_is_evaluated_in_the_schedule_zone() {
        // 09:00 in Rome is 08:00 UTC in winter (CET) and 07:00 UTC in summer (CEST).
        let spec = CronSpec::new(1, "p", "0 0 9 * * *", Tz::Europe__Rome).unwrap();
        let winter = spec
            .next_after(&Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(winter, Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap());
        let summer = spec
            .next_after(&Utc.with_ymd_and_hms(2025, 7, 10, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(summer, Utc.with_ymd_and_hms(2025, 7, 10, 7, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn ticking_trigger_records_a_run_and_stops() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let coordinator = Arc::new(JobRunCoordinator::new(
            store.clone(),
            Arc::new(SleepWork::new(Duration::from_millis(10))),
            "test-host",
        ));
        let ctx = FireContext::new(store.clone(), coordinator);
        let spec = CronSpec::new(1, "every-second", "* * * * * *", Tz::UTC).unwrap();

        let mut trigger = CronTrigger::new(spec, ctx.clone());
        trigger.start();
        assert!(trigger.is_running());
        tokio::time::sleep(Duration::from_millis(2_300)).await;
        trigger.stop();
        ctx.tracker.close();
        ctx.tracker.wait().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!trigger.is_running());

        let runs = store.job_runs_for_plan("every-second").unwrap();
        assert!(!runs.is_empty());
        // every fire inside one minute shares a row
        assert!(runs.len() <= 2);
    }
}
