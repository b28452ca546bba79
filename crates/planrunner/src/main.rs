use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use clap::Parser;
use planrunner_core::config::{PlanrunnerConfig, SeedConfig};
use planrunner_scheduler::{
    trigger::CronSpec, FireContext, JobRunCoordinator, NewSchedule, ScheduleRegistrar,
    ScheduleStore, SchedulerError, SleepWork, SqliteStore, Timing,
};
use tracing::{info, warn};

mod cli;

use cli::{AddCronArgs, AddOneShotArgs, Cli, Command, RunArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planrunner=info,planrunner_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config / PLANRUNNER_CONFIG > ~/.planrunner/planrunner.toml
    let config = PlanrunnerConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PlanrunnerConfig::default()
    });

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::AddCron(args) => add_cron(&config, args),
        Command::AddOneshot(args) => add_one_shot(&config, args),
        Command::Schedules => print_schedules(&config),
    }
}

async fn run(config: PlanrunnerConfig, args: RunArgs) -> anyhow::Result<()> {
    let store = Arc::new(open_store(&config)?);
    if args.seed_demo || config.seed.enabled {
        seed_demo(&store, &config.seed)?;
    }

    let worker_id = config.runner.worker_id();
    let coordinator = Arc::new(JobRunCoordinator::new(
        store.clone(),
        Arc::new(SleepWork::new(config.work.duration())),
        worker_id.clone(),
    ));
    let mut registrar = ScheduleRegistrar::new(FireContext::new(store.clone(), coordinator));
    registrar
        .load_and_arm()
        .await
        .context("failed to load schedules")?;
    registrar.start_catch_up(config.runner.poll_interval());
    info!(worker_id = %worker_id, session = %store.session_id(), "planrunner running");

    shutdown_signal().await;
    info!("shutdown requested");

    let report = registrar.shutdown(config.runner.shutdown_grace()).await;
    info!(?report, "triggers stopped");

    // release this session's locks; never hang the exit on a stuck database
    match tokio::time::timeout(config.runner.close_timeout(), store.close()).await {
        Ok(Ok(released)) => info!(released, "store closed"),
        Ok(Err(e)) => warn!("store close failed: {e}"),
        Err(_) => warn!(
            timeout_secs = config.runner.close_timeout_secs,
            "store close timed out"
        ),
    }
    Ok(())
}

fn add_cron(config: &PlanrunnerConfig, args: AddCronArgs) -> anyhow::Result<()> {
    let zone = strict_zone(&args.tz)?;
    CronSpec::new(0, &args.plan_id, &args.expression, zone)?;

    let store = open_store(config)?;
    let id = store.insert_schedule(&NewSchedule::cron(&args.plan_id, &args.expression, &args.tz))?;
    println!("{id}");
    Ok(())
}

fn add_one_shot(config: &PlanrunnerConfig, args: AddOneShotArgs) -> anyhow::Result<()> {
    strict_zone(&args.tz)?;
    let fire_at = match (args.in_secs, args.at.as_deref()) {
        (Some(secs), _) => Utc::now() + seconds(secs)?,
        (None, Some(at)) => DateTime::parse_from_rfc3339(at)
            .with_context(|| format!("--at {at:?} is not an RFC 3339 instant"))?
            .with_timezone(&Utc),
        (None, None) => anyhow::bail!("one of --in-secs or --at is required"),
    };

    let store = open_store(config)?;
    let id = store.insert_schedule(&NewSchedule::one_shot(&args.plan_id, fire_at, &args.tz))?;
    println!("{id}");
    Ok(())
}

fn print_schedules(config: &PlanrunnerConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    for schedule in store.list_schedules()? {
        println!("{}", serde_json::to_string(&schedule)?);
    }
    Ok(())
}

fn open_store(config: &PlanrunnerConfig) -> anyhow::Result<SqliteStore> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = SqliteStore::open(&config.database, config.runner.lock_stale_after())
        .with_context(|| format!("failed to open {db_path}"))?;
    Ok(store)
}

/// Insert the demo schedules: a cron row (once per plan and expression) and a
/// fresh one-shot `one_shot_delay_secs` from now.
fn seed_demo(store: &SqliteStore, seed: &SeedConfig) -> anyhow::Result<()> {
    let already = store.list_schedules()?.into_iter().any(|s| {
        s.plan_id == seed.plan_id
            && matches!(&s.timing, Timing::Cron { expression } if *expression == seed.cron_expr)
    });
    if !already {
        store.insert_schedule(&NewSchedule::cron(&seed.plan_id, &seed.cron_expr, &seed.timezone))?;
    }

    let fire_at = Utc::now() + seconds(seed.one_shot_delay_secs)?;
    store.insert_schedule(&NewSchedule::one_shot(&seed.plan_id, fire_at, &seed.timezone))?;
    info!(plan_id = %seed.plan_id, cron = %seed.cron_expr, %fire_at, "demo schedules seeded");
    Ok(())
}

fn seconds(secs: u64) -> anyhow::Result<TimeDelta> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .with_context(|| format!("{secs}s is out of range"))
}

/// Zones are checked when provisioning; at arm time an unknown zone only warns.
fn strict_zone(name: &str) -> Result<Tz, SchedulerError> {
    name.parse::<Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), "failed to create database directory: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dir_is_created_for_nested_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("a/b/planrunner.db");
        ensure_parent_dir(&db.to_string_lossy());
        assert!(dir.path().join("a/b").is_dir());
    }

    #[test]
    fn blocked_parent_dir_surfaces_as_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let mut config = PlanrunnerConfig::default();
        config.database.path = blocker.join("planrunner.db").to_string_lossy().into_owned();
        let err = open_store(&config).err().expect("open must fail");
        assert!(err.to_string().contains("failed to open"));
    }
}
