use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    key::Occurrence,
    store::ScheduleStore,
    types::ExecuteOutcome,
    work::{JobContext, WorkError, WorkUnit},
};

/// Decides, at fire time, whether an occurrence may run, and runs it.
///
/// Exclusion is the store's try-lock keyed by the occurrence's lock token.
/// The `job_runs` row is bookkeeping: failing to write a terminal outcome is
/// logged, never fatal, and never keeps the lock held.
pub struct JobRunCoordinator {
    store: Arc<dyn ScheduleStore>,
    work: Arc<dyn WorkUnit>,
    worker_id: String,
}

impl JobRunCoordinator {
    pub fn new(store: Arc<dyn ScheduleStore>, work: Arc<dyn WorkUnit>, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            work,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the occurrence of `plan_id` at `scheduled_at` unless another
    /// attempt holds it or it already succeeded.
    ///
    /// Errors: [`SchedulerError::Lock`] if the lock could not even be
    /// attempted, [`SchedulerError::Work`] if the work unit failed,
    /// [`SchedulerError::Canceled`] if `cancel` fired first.
    pub async fn execute(
        &self,
        plan_id: &str,
        scheduled_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ExecuteOutcome> {
        if cancel.is_cancelled() {
            return Err(SchedulerError::Canceled);
        }

        let occ = Occurrence::new(plan_id, &scheduled_at);
        let token = occ.lock_token;

        let acquired = self
            .store
            .try_lock(token)
            .await
            .map_err(|e| SchedulerError::Lock {
                token,
                reason: e.to_string(),
            })?;

        if !acquired {
            info!(plan_id, key = %occ.idempotency_key, token, "occurrence locked elsewhere, skipping");
            if let Err(e) = self.store.record_skipped(&occ, &self.worker_id).await {
                warn!(plan_id, key = %occ.idempotency_key, "failed to record skipped_lock: {e}");
            }
            return Ok(ExecuteOutcome::SkippedLock);
        }

        let result = self.run_locked(&occ, cancel).await;

        if let Err(e) = self.store.unlock(token).await {
            error!(plan_id, key = %occ.idempotency_key, token, "failed to release run lock: {e}");
        }
        result
    }

    /// Everything between acquire and release. Must not return early past the
    /// caller's unlock, so every path flows back as a value.
    async fn run_locked(&self, occ: &Occurrence, cancel: &CancellationToken) -> Result<ExecuteOutcome> {
        let plan_id = occ.plan_id.as_str();
        let key = occ.idempotency_key.as_str();

        if !self.store.record_running(occ, &self.worker_id).await? {
            info!(plan_id, key, "occurrence already succeeded, not re-running");
            return Ok(ExecuteOutcome::AlreadySucceeded);
        }

        let job = JobContext {
            plan_id: occ.plan_id.clone(),
            idempotency_key: occ.idempotency_key.clone(),
            scheduled_at: occ.scheduled_at,
        };

        let start = Instant::now();
        info!(plan_id, key, scheduled_at = %occ.scheduled_at.to_rfc3339(), "job start");

        let work = AssertUnwindSafe(self.work.perform(&job, cancel.clone())).catch_unwind();
        let outcome = match self.store.lock_heartbeat() {
            Some(every) => self.renewing(occ, every, work).await,
            None => work.await,
        }
        .unwrap_or_else(|_| Err(WorkError::Failed("work unit panicked".to_string())));

        match outcome {
            Ok(()) => {
                if let Err(e) = self.store.record_success(occ).await {
                    warn!(plan_id, key, "failed to record success: {e}");
                }
                info!(plan_id, key, elapsed_ms = start.elapsed().as_millis() as u64, "job end ok");
                Ok(ExecuteOutcome::Completed)
            }
            Err(WorkError::Canceled) => {
                // Left as `running`: a later attempt may overwrite it.
                warn!(plan_id, key, "job canceled by shutdown");
                Err(SchedulerError::Canceled)
            }
            Err(WorkError::Failed(message)) => {
                if let Err(e) = self.store.record_error(occ, &message).await {
                    warn!(plan_id, key, "failed to record error outcome: {e}");
                }
                error!(plan_id, key, elapsed_ms = start.elapsed().as_millis() as u64, "job failed: {message}");
                Err(SchedulerError::Work(message))
            }
        }
    }

    /// Drive `work` to completion, renewing the occurrence's lock every `every`
    /// so a long job is never mistaken for a crashed one.
    async fn renewing<F: Future>(&self, occ: &Occurrence, every: Duration, work: F) -> F::Output {
        let token = occ.lock_token;
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        tokio::pin!(work);
        loop {
            tokio::select! {
                biased;
                output = &mut work => return output,
                _ = ticker.tick() => match self.store.renew_lock(token).await {
                    Ok(true) => {}
                    Ok(false) => warn!(plan_id = %occ.plan_id, key = %occ.idempotency_key, token, "run lock no longer held"),
                    Err(e) => warn!(plan_id = %occ.plan_id, token, "failed to renew run lock: {e}"),
                },
            }
        }
    }
}
