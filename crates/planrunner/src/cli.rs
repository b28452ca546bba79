use clap::{Args, Parser, Subcommand};

/// Cron and one-shot plan runner with at-most-once execution across nodes.
#[derive(Debug, Parser)]
#[command(name = "planrunner", version, about, long_about = None)]
pub struct Cli {
    /// Path to planrunner.toml.
    #[arg(long, global = true, env = "PLANRUNNER_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Arm every enabled schedule and run until SIGINT/SIGTERM.
    Run(RunArgs),
    /// Provision a cron schedule.
    AddCron(AddCronArgs),
    /// Provision a one-shot schedule.
    AddOneshot(AddOneShotArgs),
    /// Print every schedule as one JSON object per line.
    Schedules,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Insert the demo cron and one-shot schedules before arming.
    #[arg(long)]
    pub seed_demo: bool,
}

#[derive(Debug, Args)]
pub struct AddCronArgs {
    pub plan_id: String,
    /// Six fields, seconds first, e.g. "0 */5 * * * *".
    pub expression: String,
    /// IANA zone the expression is evaluated in.
    #[arg(long, default_value = "UTC")]
    pub tz: String,
}

#[derive(Debug, Args)]
pub struct AddOneShotArgs {
    pub plan_id: String,
    /// Fire this many seconds from now.
    #[arg(long, conflicts_with = "at", required_unless_present = "at")]
    pub in_secs: Option<u64>,
    /// Fire at an RFC 3339 instant.
    #[arg(long)]
    pub at: Option<String>,
    #[arg(long, default_value = "UTC")]
    pub tz: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_cron_takes_plan_expression_and_zone() {
        let cli = Cli::parse_from([
            "planrunner",
            "--config",
            "/tmp/p.toml",
            "add-cron",
            "42",
            "0 0 9 * * MON-FRI",
            "--tz",
            "Europe/Rome",
        ]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/p.toml"));
        let Command::AddCron(args) = cli.command else {
            panic!("expected add-cron");
        };
        assert_eq!(args.plan_id, "42");
        assert_eq!(args.expression, "0 0 9 * * MON-FRI");
        assert_eq!(args.tz, "Europe/Rome");
    }

    #[test]
    fn add_oneshot_needs_exactly_one_instant() {
        assert!(Cli::try_parse_from(["planrunner", "add-oneshot", "7"]).is_err());
        assert!(Cli::try_parse_from([
            "planrunner",
            "add-oneshot",
            "7",
            "--in-secs",
            "5",
            "--at",
            "2030-01-01T00:00:00Z"
        ])
        .is_err());

        let cli = Cli::parse_from(["planrunner", "add-oneshot", "7", "--in-secs", "90"]);
        let Command::AddOneshot(args) = cli.command else {
            panic!("expected add-oneshot");
        };
        assert_eq!(args.in_secs, Some(90));
        assert_eq!(args.tz, "UTC");
    }

    #[test]
    fn run_flag_defaults_off() {
        let cli = Cli::parse_from(["planrunner", "run"]);
        assert!(matches!(cli.command, Command::Run(RunArgs { seed_demo: false })));
    }
}
