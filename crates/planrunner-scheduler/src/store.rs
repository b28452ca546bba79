use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use planrunner_core::config::DatabaseConfig;
use rusqlite::{types::Type, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    key::Occurrence,
    types::{JobRun, NewSchedule, RunOutcome, Schedule, ScheduleRow, Timing},
};

/// Everything the coordinator, triggers and poller need from the shared store.
///
/// Exclusion lives here and nowhere else: `try_lock` is the only thing that
/// stops two runners executing the same occurrence, and `mark_consumed` the
/// only thing that stops a one-shot from being consumed twice.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// All schedules with `enabled = true`.
    async fn load_enabled_schedules(&self) -> Result<Vec<Schedule>>;

    /// Enabled, unconsumed one-shot schedules whose fire instant is at or before `now`.
    async fn due_one_shots(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>>;

    /// Fresh read of a one-shot's `consumed` flag.
    async fn is_consumed(&self, schedule_id: i64) -> Result<bool>;

    /// Compare-and-set `consumed` false → true. Returns `false` if someone else won.
    async fn mark_consumed(&self, schedule_id: i64) -> Result<bool>;

    /// Non-blocking exclusive lock on `token`, owned by this store session.
    async fn try_lock(&self, token: i64) -> Result<bool>;

    /// Release a lock previously acquired by this session.
    async fn unlock(&self, token: i64) -> Result<()>;

    /// Mark a lock held by this session as still alive. Returns `false` if
    /// the session no longer holds it.
    async fn renew_lock(&self, token: i64) -> Result<bool>;

    /// How often a running job must renew its lock, if locks can go stale.
    fn lock_heartbeat(&self) -> Option<Duration> {
        None
    }

    /// Insert a `skipped_lock` row unless the occurrence already has one.
    async fn record_skipped(&self, occurrence: &Occurrence, worker_id: &str) -> Result<()>;

    /// Upsert the occurrence to `running`. Returns `false` when the row is
    /// already `success`, in which case nothing was written.
    async fn record_running(&self, occurrence: &Occurrence, worker_id: &str) -> Result<bool>;

    async fn record_success(&self, occurrence: &Occurrence) -> Result<()>;

    async fn record_error(&self, occurrence: &Occurrence, message: &str) -> Result<()>;

    /// End the session: release every lock it still holds. Returns how many.
    async fn close(&self) -> Result<usize>;
}

/// [`ScheduleStore`] backed by a SQLite file shared by every runner process.
///
/// Each instance is one lock session (a random UUID). Two instances opened on
/// the same file behave like two runners, even inside one process.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    session_id: String,
    lock_stale_after: Option<TimeDelta>,
}

impl SqliteStore {
    /// Open (or create) the shared database and initialise the schema.
    pub fn open(config: &DatabaseConfig, lock_stale_after: Duration) -> Result<Self> {
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn, lock_stale_after)
    }

    /// Private in-memory database; only useful for a single runner.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, Duration::from_secs(3600))
    }

    fn from_connection(conn: Connection, lock_stale_after: Duration) -> Result<Self> {
        init_db(&conn)?;
        let session_id = Uuid::new_v4().to_string();
        debug!(session = %session_id, "store session opened");
        Ok(Self {
            conn: Mutex::new(conn),
            session_id,
            lock_stale_after: TimeDelta::from_std(lock_stale_after).ok(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::StorePoisoned)
    }

    /// Provision a schedule row. Returns the assigned id.
    pub fn insert_schedule(&self, new: &NewSchedule) -> Result<i64> {
        let (kind, cron_expr, fire_at) = match &new.timing {
            Timing::Cron { expression } => {
                if expression.trim().is_empty() {
                    return Err(SchedulerError::InvalidSchedule(
                        "cron schedule needs an expression".to_string(),
                    ));
                }
                ("cron", Some(expression.clone()), None)
            }
            Timing::OneShot { fire_at, consumed } => {
                if *consumed {
                    return Err(SchedulerError::InvalidSchedule(
                        "new one-shot schedule cannot start consumed".to_string(),
                    ));
                }
                ("oneshot", None, Some(fmt_ts(fire_at)))
            }
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO plan_schedules
             (plan_id, kind, cron_expr, fire_at, timezone, consumed, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            rusqlite::params![
                new.plan_id,
                kind,
                cron_expr,
                fire_at,
                new.timezone,
                new.enabled,
                fmt_ts(&Utc::now())
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(schedule_id = id, plan_id = %new.plan_id, %kind, "schedule added");
        Ok(id)
    }

    pub fn schedule(&self, id: i64) -> Result<Schedule> {
        let conn = self.conn()?;
        read_schedules(
            &conn,
            &format!("{SCHEDULE_COLUMNS} WHERE id = ?1"),
            rusqlite::params![id],
        )?
        .pop()
        .ok_or(SchedulerError::ScheduleNotFound { id })
    }

    /// Every schedule, enabled or not, ordered by id.
    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let conn = self.conn()?;
        read_schedules(&conn, &format!("{SCHEDULE_COLUMNS} ORDER BY id"), [])
    }

    /// Run history for one plan, oldest occurrence first.
    pub fn job_runs_for_plan(&self, plan_id: &str) -> Result<Vec<JobRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT plan_id, idempotency_key, scheduled_at, outcome, error,
                    worker_id, lock_token, started_at, ended_at
             FROM job_runs WHERE plan_id = ?1
             ORDER BY scheduled_at, id",
        )?;
        let runs = stmt
            .query_map([plan_id], |row| {
                let outcome: String = row.get(3)?;
                let ended_at: Option<String> = row.get(8)?;
                Ok(JobRun {
                    plan_id: row.get(0)?,
                    idempotency_key: row.get(1)?,
                    scheduled_at: parse_ts(2, &row.get::<_, String>(2)?)?,
                    outcome: outcome.parse().map_err(|e: String| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
                    })?,
                    error: row.get(4)?,
                    worker_id: row.get(5)?,
                    lock_token: row.get(6)?,
                    started_at: parse_ts(7, &row.get::<_, String>(7)?)?,
                    ended_at: ended_at.map(|s| parse_ts(8, &s)).transpose()?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn finish(&self, occurrence: &Occurrence, outcome: RunOutcome, error: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE job_runs SET outcome = ?1, error = ?2, ended_at = ?3
             WHERE plan_id = ?4 AND idempotency_key = ?5",
            rusqlite::params![
                outcome.to_string(),
                error,
                fmt_ts(&Utc::now()),
                occurrence.plan_id,
                occurrence.idempotency_key
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for SqliteStore {
    async fn load_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        let conn = self.conn()?;
        read_schedules(
            &conn,
            &format!("{SCHEDULE_COLUMNS} WHERE enabled = 1 ORDER BY id"),
            [],
        )
    }

    async fn due_one_shots(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>> {
        let conn = self.conn()?;
        read_schedules(
            &conn,
            &format!(
                "{SCHEDULE_COLUMNS}
                 WHERE enabled = 1 AND kind = 'oneshot' AND consumed = 0 AND fire_at <= ?1
                 ORDER BY fire_at"
            ),
            [fmt_ts(&now)],
        )
    }

    async fn is_consumed(&self, schedule_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT consumed FROM plan_schedules WHERE id = ?1",
            [schedule_id],
            |row| row.get::<_, bool>(0),
        )
        .optional()?
        .ok_or(SchedulerError::ScheduleNotFound { id: schedule_id })
    }

    async fn mark_consumed(&self, schedule_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE plan_schedules SET consumed = 1
             WHERE id = ?1 AND kind = 'oneshot' AND consumed = 0",
            [schedule_id],
        )?;
        Ok(n == 1)
    }

    async fn try_lock(&self, token: i64) -> Result<bool> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // A crashed runner stops renewing; take over locks not renewed within the horizon.
        let stale = match self.lock_stale_after.and_then(|d| now.checked_sub_signed(d)) {
            Some(cutoff) => tx.execute(
                "DELETE FROM run_locks WHERE token = ?1 AND renewed_at < ?2",
                rusqlite::params![token, fmt_ts(&cutoff)],
            )?,
            None => 0,
        };
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO run_locks (token, holder, acquired_at, renewed_at)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![token, self.session_id, fmt_ts(&now)],
        )?;
        tx.commit()?;

        if stale > 0 {
            warn!(token, "took over stale run lock");
        }
        Ok(inserted == 1)
    }

    async fn unlock(&self, token: i64) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM run_locks WHERE token = ?1 AND holder = ?2",
            rusqlite::params![token, self.session_id],
        )?;
        if n == 0 {
            warn!(token, "unlock found no lock held by this session");
        }
        Ok(())
    }

    async fn renew_lock(&self, token: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE run_locks SET renewed_at = ?1 WHERE token = ?2 AND holder = ?3",
            rusqlite::params![fmt_ts(&Utc::now()), token, self.session_id],
        )?;
        Ok(n == 1)
    }

    /// A third of the stale horizon, so two missed renewals still keep the lock.
    fn lock_heartbeat(&self) -> Option<Duration> {
        let horizon = self.lock_stale_after?.to_std().ok()?;
        Some((horizon / 3).max(MIN_HEARTBEAT))
    }

    async fn record_skipped(&self, occurrence: &Occurrence, worker_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let now = fmt_ts(&Utc::now());
        conn.execute(
            "INSERT INTO job_runs
             (plan_id, idempotency_key, scheduled_at, outcome, worker_id, lock_token,
              started_at, ended_at)
             VALUES (?1, ?2, ?3, 'skipped_lock', ?4, ?5, ?6, ?6)
             ON CONFLICT (plan_id, idempotency_key) DO NOTHING",
            rusqlite::params![
                occurrence.plan_id,
                occurrence.idempotency_key,
                fmt_ts(&occurrence.scheduled_at),
                worker_id,
                occurrence.lock_token,
                now
            ],
        )?;
        Ok(())
    }

    async fn record_running(&self, occurrence: &Occurrence, worker_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "INSERT INTO job_runs
             (plan_id, idempotency_key, scheduled_at, outcome, worker_id, lock_token, started_at)
             VALUES (?1, ?2, ?3, 'running', ?4, ?5, ?6)
             ON CONFLICT (plan_id, idempotency_key) DO UPDATE SET
                outcome = 'running',
                worker_id = excluded.worker_id,
                started_at = excluded.started_at,
                error = NULL,
                ended_at = NULL
             WHERE job_runs.outcome <> 'success'",
            rusqlite::params![
                occurrence.plan_id,
                occurrence.idempotency_key,
                fmt_ts(&occurrence.scheduled_at),
                worker_id,
                occurrence.lock_token,
                fmt_ts(&Utc::now())
            ],
        )?;
        Ok(n == 1)
    }

    async fn record_success(&self, occurrence: &Occurrence) -> Result<()> {
        self.finish(occurrence, RunOutcome::Success, None)
    }

    async fn record_error(&self, occurrence: &Occurrence, message: &str) -> Result<()> {
        self.finish(occurrence, RunOutcome::Error, Some(message))
    }

    async fn close(&self) -> Result<usize> {
        let conn = self.conn()?;
        let released = conn.execute(
            "DELETE FROM run_locks WHERE holder = ?1",
            [&self.session_id],
        )?;
        info!(session = %self.session_id, released, "store session closed");
        Ok(released)
    }
}

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

const SCHEDULE_COLUMNS: &str =
    "SELECT id, plan_id, kind, cron_expr, fire_at, timezone, consumed, enabled FROM plan_schedules";

/// Run a `SCHEDULE_COLUMNS` query. Rows that fail validation, a bad `fire_at`
/// included, are logged and dropped so one bad row cannot hide the rest.
fn read_schedules<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Schedule>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(ScheduleRow {
                id: row.get(0)?,
                plan_id: row.get(1)?,
                kind: row.get(2)?,
                cron_expr: row.get(3)?,
                fire_at: row.get(4)?,
                timezone: row.get(5)?,
                consumed: row.get(6)?,
                enabled: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            Schedule::try_from(row)
                .map_err(|e| warn!(schedule_id = id, "skipping malformed schedule row: {e}"))
                .ok()
        })
        .collect())
}

/// Fixed-width UTC timestamps so `fire_at <= ?` compares correctly as text.
fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn occurrence(plan: &str) -> Occurrence {
        Occurrence::new(plan, &Utc.with_ymd_and_hms(2025, 1, 1, 8, 30, 12).unwrap())
    }

    fn shared_pair(dir: &tempfile::TempDir) -> (SqliteStore, SqliteStore) {
        let config = DatabaseConfig {
            path: dir.path().join("shared.db").to_string_lossy().into_owned(),
            busy_timeout_ms: 2_000,
        };
        let a = SqliteStore::open(&config, Duration::from_secs(3600)).unwrap();
        let b = SqliteStore::open(&config, Duration::from_secs(3600)).unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn lock_is_exclusive_across_sessions_and_not_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = shared_pair(&dir);

        assert!(a.try_lock(7).await.unwrap());
        assert!(!a.try_lock(7).await.unwrap());
        assert!(!b.try_lock(7).await.unwrap());
        assert!(b.try_lock(8).await.unwrap());

        // b cannot release a's lock
        b.unlock(7).await.unwrap();
        assert!(!b.try_lock(7).await.unwrap());

        a.unlock(7).await.unwrap();
        assert!(b.try_lock(7).await.unwrap());
    }

    #[tokio::test]
    async fn close_releases_session_locks() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = shared_pair(&dir);
        assert!(a.try_lock(1).await.unwrap());
        assert!(a.try_lock(2).await.unwrap());
        assert_eq!(a.close().await.unwrap(), 2);
        assert!(b.try_lock(1).await.unwrap());
    }

    #[tokio::test]
    async fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("stale.db").to_string_lossy().into_owned(),
            busy_timeout_ms: 2_000,
        };
        let crashed = SqliteStore::open(&config, Duration::from_secs(3600)).unwrap();
        let eager = SqliteStore::open(&config, Duration::ZERO).unwrap();
        assert!(crashed.try_lock(99).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(eager.try_lock(99).await.unwrap());
    }

    #[tokio::test]
    async fn bad_fire_at_row_does_not_hide_the_rest() {
        let store = SqliteStore::open_in_memory().unwrap();
        let good = store
            .insert_schedule(&NewSchedule::cron("good", "0 * * * * *", "UTC"))
            .unwrap();
        let due = store
            .insert_schedule(&NewSchedule::one_shot("due", Utc::now() - TimeDelta::minutes(1), "UTC"))
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO plan_schedules (plan_id, kind, fire_at, timezone, created_at)
                 VALUES ('hand-written', 'oneshot', '2025-01-01 10:00:00', 'UTC', 'now')",
                [],
            )
            .unwrap();

        let ids: Vec<i64> = store
            .load_enabled_schedules()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![good, due]);

        let due_ids: Vec<i64> = store
            .due_one_shots(Utc::now())
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(due_ids, vec![due]);
    }

    #[tokio::test]
    async fn renewed_lock_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("renew.db").to_string_lossy().into_owned(),
            busy_timeout_ms: 2_000,
        };
        let horizon = Duration::from_millis(300);
        let holder = SqliteStore::open(&config, horizon).unwrap();
        let other = SqliteStore::open(&config, horizon).unwrap();
        assert_eq!(holder.lock_heartbeat(), Some(Duration::from_millis(100)));

        assert!(holder.try_lock(7).await.unwrap());
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(holder.renew_lock(7).await.unwrap());
            assert!(!other.try_lock(7).await.unwrap(), "renewed lock taken over");
        }

        // renewal stops, as when the holder crashes
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(other.try_lock(7).await.unwrap());
        assert!(!holder.renew_lock(7).await.unwrap());
    }

    #[tokio::test]
    async fn consumed_compare_and_set_wins_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_schedule(&NewSchedule::one_shot("p", Utc::now(), "UTC"))
            .unwrap();
        assert!(!store.is_consumed(id).await.unwrap());
        assert!(store.mark_consumed(id).await.unwrap());
        assert!(!store.mark_consumed(id).await.unwrap());
        assert!(store.is_consumed(id).await.unwrap());
    }

    #[tokio::test]
    async fn cron_rows_are_never_consumed() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_schedule(&NewSchedule::cron("p", "0 * * * * *", "UTC"))
            .unwrap();
        assert!(!store.mark_consumed(id).await.unwrap());
        assert!(!store.is_consumed(id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_schedule_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.is_consumed(404).await,
            Err(SchedulerError::ScheduleNotFound { id: 404 })
        ));
    }

    #[tokio::test]
    async fn due_one_shots_filters_future_consumed_and_disabled() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let due = store
            .insert_schedule(&NewSchedule::one_shot("due", now - TimeDelta::seconds(5), "UTC"))
            .unwrap();
        store
            .insert_schedule(&NewSchedule::one_shot("future", now + TimeDelta::minutes(5), "UTC"))
            .unwrap();
        let consumed = store
            .insert_schedule(&NewSchedule::one_shot("done", now - TimeDelta::seconds(5), "UTC"))
            .unwrap();
        store.mark_consumed(consumed).await.unwrap();
        let mut disabled = NewSchedule::one_shot("off", now - TimeDelta::seconds(5), "UTC");
        disabled.enabled = false;
        store.insert_schedule(&disabled).unwrap();
        store
            .insert_schedule(&NewSchedule::cron("cron", "* * * * * *", "UTC"))
            .unwrap();

        let found = store.due_one_shots(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due);

        let enabled = store.load_enabled_schedules().await.unwrap();
        assert_eq!(enabled.len(), 4);
        assert_eq!(store.list_schedules().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn skipped_row_never_overwrites_existing_run() {
        let store = SqliteStore::open_in_memory().unwrap();
        let occ = occurrence("p");
        assert!(store.record_running(&occ, "w1").await.unwrap());
        store.record_skipped(&occ, "w2").await.unwrap();

        let runs = store.job_runs_for_plan("p").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, RunOutcome::Running);
        assert_eq!(runs[0].worker_id, "w1");
    }

    #[tokio::test]
    async fn running_upsert_overwrites_partial_runs_but_not_success() {
        let store = SqliteStore::open_in_memory().unwrap();
        let occ = occurrence("p");

        store.record_skipped(&occ, "w1").await.unwrap();
        assert!(store.record_running(&occ, "w2").await.unwrap());
        store.record_error(&occ, "boom").await.unwrap();

        let run = &store.job_runs_for_plan("p").unwrap()[0];
        assert_eq!(run.outcome, RunOutcome::Error);
        assert_eq!(run.error.as_deref(), Some("boom"));
        assert_eq!(run.worker_id, "w2");
        assert!(run.ended_at.is_some());

        assert!(store.record_running(&occ, "w3").await.unwrap());
        let run = &store.job_runs_for_plan("p").unwrap()[0];
        assert_eq!(run.outcome, RunOutcome::Running);
        assert!(run.error.is_none());
        assert!(run.ended_at.is_none());

        store.record_success(&occ).await.unwrap();
        assert!(!store.record_running(&occ, "w4").await.unwrap());
        let runs = store.job_runs_for_plan("p").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, RunOutcome::Success);
        assert_eq!(runs[0].worker_id, "w3");
        assert_eq!(runs[0].scheduled_at, occ.scheduled_at);
        assert_eq!(runs[0].lock_token, occ.lock_token);
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let late = early + TimeDelta::milliseconds(1);
        assert!(fmt_ts(&early) < fmt_ts(&late));
        assert_eq!(parse_ts(0, &fmt_ts(&late)).unwrap(), late);
    }
}
