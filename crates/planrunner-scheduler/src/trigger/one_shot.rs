use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::FireContext;
use crate::{error::SchedulerError, key::truncate_to_minute, types::ExecuteOutcome};

/// Everything one one-shot trigger is bound to at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotSpec {
    pub schedule_id: i64,
    pub plan_id: String,
    pub fire_at: DateTime<Utc>,
    pub zone: Tz,
}

/// Result of one pass through the fire-and-consume path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The schedule was already consumed; nothing ran.
    AlreadyConsumed,
    /// This attempt flipped `consumed` to true.
    Consumed,
    /// The occurrence was handled but another attempt flipped `consumed` first.
    LostRace,
    /// Left unconsumed for a later attempt: lock held elsewhere, shutdown, or
    /// a store failure.
    Deferred,
}

/// Fire a one-shot schedule: fresh consumed check, execute, compare-and-set.
///
/// Shared by [`OneShotTrigger`] and the catch-up poller, which may race each
/// other (and other runners) on the same row.
///
/// The schedule is consumed only after this attempt ran the occurrence, found
/// it already succeeded, or recorded its failure. Losing the lock, being
/// canceled, or a store error leaves it unconsumed: the lock holder consumes
/// it when done, and if that holder dies first the catch-up rescan fires it
/// again.
pub async fn fire_one_shot(spec: &OneShotSpec, ctx: &FireContext) -> FireOutcome {
    let plan_id = spec.plan_id.as_str();

    match ctx.store.is_consumed(spec.schedule_id).await {
        Ok(true) => {
            debug!(schedule_id = spec.schedule_id, plan_id, "one-shot already consumed");
            return FireOutcome::AlreadyConsumed;
        }
        Ok(false) => {}
        Err(e) => {
            error!(schedule_id = spec.schedule_id, plan_id, "consumed check failed: {e}");
            return FireOutcome::Deferred;
        }
    }

    let scheduled_at = truncate_to_minute(&spec.fire_at);
    match ctx
        .coordinator
        .execute(plan_id, scheduled_at, &ctx.work_cancel)
        .await
    {
        Ok(ExecuteOutcome::SkippedLock) => {
            // The holder consumes it; if it dies first, catch-up retries.
            info!(schedule_id = spec.schedule_id, plan_id, "one-shot held by another attempt");
            return FireOutcome::Deferred;
        }
        Ok(_) => {}
        Err(SchedulerError::Work(message)) => {
            // Recorded as `error` on the run row; the occurrence is spent.
            warn!(schedule_id = spec.schedule_id, plan_id, "one-shot job failed: {message}");
        }
        Err(SchedulerError::Canceled) => {
            info!(schedule_id = spec.schedule_id, plan_id, "one-shot canceled, left for catch-up");
            return FireOutcome::Deferred;
        }
        Err(e) => {
            error!(schedule_id = spec.schedule_id, plan_id, "one-shot not executed: {e}");
            return FireOutcome::Deferred;
        }
    }

    match ctx.store.mark_consumed(spec.schedule_id).await {
        Ok(true) => {
            info!(
                schedule_id = spec.schedule_id,
                plan_id,
                scheduled_at = %scheduled_at.to_rfc3339(),
                "one-shot executed and consumed"
            );
            FireOutcome::Consumed
        }
        Ok(false) => {
            debug!(schedule_id = spec.schedule_id, plan_id, "one-shot consumed by a concurrent attempt");
            FireOutcome::LostRace
        }
        Err(e) => {
            warn!(schedule_id = spec.schedule_id, plan_id, "failed to mark one-shot consumed: {e}");
            FireOutcome::Deferred
        }
    }
}

/// Fires a one-shot schedule once, at its fire instant, or right away if
/// that instant has already passed.
pub struct OneShotTrigger {
    spec: Arc<OneShotSpec>,
    ctx: FireContext,
    stop: CancellationToken,
    started: bool,
    timer: Option<JoinHandle<()>>,
}

impl OneShotTrigger {
    pub fn new(spec: OneShotSpec, ctx: FireContext) -> Self {
        let stop = ctx.shutdown.child_token();
        Self {
            spec: Arc::new(spec),
            ctx,
            stop,
            started: false,
            timer: None,
        }
    }

    pub fn spec(&self) -> &OneShotSpec {
        &self.spec
    }

    /// Arm the deferred fire, or fire now when the instant is not in the future.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let delay = self.spec.fire_at - Utc::now();
        let local = self.spec.fire_at.with_timezone(&self.spec.zone);
        let spec = self.spec.clone();
        let ctx = self.ctx.clone();

        match delay.to_std() {
            Ok(wait) if !wait.is_zero() => {
                info!(
                    schedule_id = spec.schedule_id,
                    plan_id = %spec.plan_id,
                    fire_at = %local.to_rfc3339(),
                    delay_ms = wait.as_millis() as u64,
                    "one-shot armed"
                );
                let stop = self.stop.clone();
                self.timer = Some(tokio::spawn(async move {
                    tokio::select! {
                        _ = stop.cancelled() => {
                            debug!(schedule_id = spec.schedule_id, "one-shot disarmed");
                        }
                        _ = tokio::time::sleep(wait) => {
                            let fire_ctx = ctx.clone();
                            ctx.spawn_fire(async move {
                                fire_one_shot(&spec, &fire_ctx).await;
                            });
                        }
                    }
                }));
            }
            _ => {
                info!(
                    schedule_id = spec.schedule_id,
                    plan_id = %spec.plan_id,
                    fire_at = %local.to_rfc3339(),
                    "one-shot instant already passed, firing now"
                );
                let fire_ctx = ctx.clone();
                ctx.spawn_fire(async move {
                    fire_one_shot(&spec, &fire_ctx).await;
                });
            }
        }
    }

    /// Disarm a pending deferred fire. A fire already in flight is not affected.
    pub fn stop(&mut self) {
        self.stop.cancel();
    }

    /// True while the deferred timer is still pending.
    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}
