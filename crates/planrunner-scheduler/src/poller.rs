use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    trigger::{fire_one_shot, zone_or_utc, FireContext, OneShotSpec},
    types::Timing,
};

/// Safety net for one-shots whose in-process timer never ran: a runner that
/// restarted after the row was created, or a timer armed from a stale clock.
///
/// Every tick rescans the store for overdue, unconsumed one-shots and fires
/// each through the same path the trigger uses.
pub struct CatchUpPoller {
    ctx: FireContext,
    interval: Duration,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CatchUpPoller {
    pub fn new(ctx: FireContext, interval: Duration) -> Self {
        let stop = ctx.shutdown.child_token();
        Self {
            ctx,
            interval,
            stop,
            task: None,
        }
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.stop.is_cancelled() {
            self.stop = self.ctx.shutdown.child_token();
        }
        info!(interval_ms = self.interval.as_millis() as u64, "catch-up poller started");
        self.task = Some(tokio::spawn(poll_loop(
            self.ctx.clone(),
            self.interval,
            self.stop.clone(),
        )));
    }

    pub fn stop(&mut self) {
        self.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

async fn poll_loop(ctx: FireContext, every: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let spawned = rescan(&ctx).await;
                if spawned > 0 {
                    debug!(spawned, "catch-up fired overdue one-shots");
                }
            }
        }
    }
    debug!("catch-up poller stopped");
}

/// One rescan. Returns how many fire tasks were spawned.
pub async fn rescan(ctx: &FireContext) -> usize {
    let due = match ctx.store.due_one_shots(Utc::now()).await {
        Ok(due) => due,
        Err(e) => {
            error!("catch-up query failed: {e}");
            return 0;
        }
    };

    let mut spawned = 0;
    for schedule in due {
        let Timing::OneShot { fire_at, .. } = schedule.timing else {
            continue;
        };
        let spec = OneShotSpec {
            schedule_id: schedule.id,
            plan_id: schedule.plan_id,
            fire_at,
            zone: zone_or_utc(&schedule.timezone),
        };
        let fire_ctx = ctx.clone();
        if ctx.spawn_fire(async move {
            fire_one_shot(&spec, &fire_ctx).await;
        }) {
            spawned += 1;
        }
    }
    spawned
}
