use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Idempotent; every runner calls it at startup against the shared file.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS plan_schedules (
            id          INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            plan_id     TEXT    NOT NULL,
            kind        TEXT    NOT NULL CHECK (kind IN ('cron', 'oneshot')),
            cron_expr   TEXT,               -- six fields, seconds first
            fire_at     TEXT,               -- RFC 3339 UTC, millisecond precision
            timezone    TEXT    NOT NULL DEFAULT 'UTC',
            consumed    INTEGER NOT NULL DEFAULT 0,
            enabled     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,
            CHECK (
                (kind = 'cron' AND cron_expr IS NOT NULL AND trim(cron_expr) <> ''
                    AND fire_at IS NULL AND consumed = 0)
                OR
                (kind = 'oneshot' AND fire_at IS NOT NULL AND cron_expr IS NULL)
            )
        ) STRICT;

        -- Catch-up rescan: WHERE kind = 'oneshot' AND consumed = 0 AND fire_at <= ?
        CREATE INDEX IF NOT EXISTS idx_plan_schedules_due
            ON plan_schedules (kind, consumed, fire_at);

        CREATE TABLE IF NOT EXISTS job_runs (
            id               INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            plan_id          TEXT    NOT NULL,
            idempotency_key  TEXT    NOT NULL,
            scheduled_at     TEXT    NOT NULL,
            outcome          TEXT    NOT NULL
                CHECK (outcome IN ('running', 'success', 'error', 'skipped_lock')),
            worker_id        TEXT    NOT NULL,
            lock_token       INTEGER NOT NULL,
            error            TEXT,
            started_at       TEXT    NOT NULL,
            ended_at         TEXT,
            UNIQUE (plan_id, idempotency_key)
        ) STRICT;

        -- One row per held lock token; the holder is a store session id.
        -- A running job bumps renewed_at; a row not renewed in time is stale.
        CREATE TABLE IF NOT EXISTS run_locks (
            token        INTEGER NOT NULL PRIMARY KEY,
            holder       TEXT    NOT NULL,
            acquired_at  TEXT    NOT NULL,
            renewed_at   TEXT    NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}
