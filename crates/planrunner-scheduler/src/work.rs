use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What a work unit is told about the occurrence it is running.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub plan_id: String,
    pub idempotency_key: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkError {
    #[error("{0}")]
    Failed(String),

    /// Returned when the cancellation token fires mid-run.
    #[error("canceled")]
    Canceled,
}

/// The opaque business logic of a plan.
///
/// Implementations must return promptly with [`WorkError::Canceled`] once
/// `cancel` fires.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    async fn perform(&self, job: &JobContext, cancel: CancellationToken) -> Result<(), WorkError>;
}

/// Stand-in work unit: sleeps for a fixed duration.
pub struct SleepWork {
    duration: Duration,
}

impl SleepWork {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl WorkUnit for SleepWork {
    async fn perform(&self, job: &JobContext, cancel: CancellationToken) -> Result<(), WorkError> {
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {
                info!(plan_id = %job.plan_id, key = %job.idempotency_key, "work done");
                Ok(())
            }
            _ = cancel.cancelled() => Err(WorkError::Canceled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobContext {
        JobContext {
            plan_id: "p".to_string(),
            idempotency_key: "p|20250101T0000".to_string(),
            scheduled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sleep_work_completes() {
        let work = SleepWork::new(Duration::from_millis(10));
        assert_eq!(work.perform(&job(), CancellationToken::new()).await, Ok(()));
    }

    #[tokio::test]
    async fn sleep_work_honours_cancellation() {
        let work = SleepWork::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        assert_eq!(work.perform(&job(), cancel).await, Err(WorkError::Canceled));
    }
}
