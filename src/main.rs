use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use repo_maintenance::blob::{BlobStore, SqliteBlobStore};
use repo_maintenance::config::{AppConfig, CliConfig, FileConfig};
use repo_maintenance::maintenance::policy::{next_maintenance_time, should_run};
use repo_maintenance::maintenance::{get_params, get_schedule, set_params, CycleParams, Params};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite file backing the repository blob store.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to the repository config file. Defaults to the database path.
    #[clap(long, value_parser = parse_path)]
    pub config_path: Option<PathBuf>,

    /// Optional TOML file; its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    #[clap(long)]
    pub username: Option<String>,

    #[clap(long)]
    pub hostname: Option<String>,

    #[clap(long)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show maintenance parameters, schedule and recent runs.
    Info,

    /// Change maintenance parameters.
    Set {
        /// New owner as `user@host`, or `me` for the current identity.
        #[clap(long)]
        owner: Option<String>,

        #[clap(long)]
        enable_quick: Option<bool>,

        #[clap(long)]
        quick_interval_secs: Option<u64>,

        #[clap(long)]
        enable_full: Option<bool>,

        #[clap(long)]
        full_interval_secs: Option<u64>,

        #[clap(long)]
        max_log_count: Option<usize>,

        #[clap(long)]
        max_log_age_secs: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = cli_args.config.as_deref().map(FileConfig::load).transpose()?;
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        config_path: cli_args.config_path.clone(),
        username: cli_args.username.clone(),
        hostname: cli_args.hostname.clone(),
        log_level: cli_args.log_level.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(config.log_level).into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!("Opening blob store at {:?}...", config.db_path);
    let store = SqliteBlobStore::new(&config.db_path)?;

    match cli_args.command {
        Command::Info => print_info(&store, Utc::now()),
        Command::Set {
            owner,
            enable_quick,
            quick_interval_secs,
            enable_full,
            full_interval_secs,
            max_log_count,
            max_log_age_secs,
        } => {
            let mut params = get_params(&store)?;

            if let Some(owner) = owner {
                params.owner = if owner == "me" {
                    config.username_at_host()
                } else {
                    owner
                };
                info!("Setting maintenance owner to {}", params.owner);
            }
            update_cycle(&mut params.quick_cycle, enable_quick, quick_interval_secs);
            update_cycle(&mut params.full_cycle, enable_full, full_interval_secs);

            if max_log_count.is_some() || max_log_age_secs.is_some() {
                let mut retention = params.log_retention.or_default();
                if let Some(count) = max_log_count {
                    retention.max_count = count;
                }
                if let Some(secs) = max_log_age_secs {
                    retention.max_age = Duration::from_secs(secs);
                }
                params.log_retention = retention;
            }

            set_params(&store, &params)?;
            info!("Maintenance parameters updated.");
            Ok(())
        }
    }
}

fn update_cycle(cycle: &mut CycleParams, enabled: Option<bool>, interval_secs: Option<u64>) {
    if let Some(enabled) = enabled {
        cycle.enabled = enabled;
    }
    if let Some(secs) = interval_secs {
        cycle.interval = Duration::from_secs(secs);
    }
}

fn describe_cycle(cycle: &CycleParams) -> String {
    if cycle.enabled {
        format!("enabled, every {:?}", cycle.interval)
    } else {
        "disabled".to_string()
    }
}

fn describe_time(t: Option<DateTime<Utc>>) -> String {
    t.map_or_else(|| "now".to_string(), |t| t.to_rfc3339())
}

fn print_info(store: &dyn BlobStore, now: DateTime<Utc>) -> Result<()> {
    let params: Params = get_params(store)?;
    let schedule = get_schedule(store)?;

    let owner = if params.owner.is_empty() {
        "<none>"
    } else {
        params.owner.as_str()
    };
    println!("Owner: {}", owner);
    println!("Quick cycle: {}", describe_cycle(&params.quick_cycle));
    println!("Full cycle: {}", describe_cycle(&params.full_cycle));

    let retention = params.log_retention.or_default();
    println!(
        "Log retention: {} logs, {:?}, {} bytes",
        retention.max_count, retention.max_age, retention.max_total_size
    );

    println!(
        "Next quick maintenance: {}",
        describe_time(schedule.next_quick_maintenance_time)
    );
    println!(
        "Next full maintenance: {}",
        describe_time(schedule.next_full_maintenance_time)
    );
    match next_maintenance_time(&params, &schedule, now) {
        Some(t) => println!("Next maintenance due: {}", t.to_rfc3339()),
        None => println!("Next maintenance due: never (all cycles disabled)"),
    }
    println!("Auto mode would run now: {}", should_run(&params, &schedule, now));

    println!();
    println!("Recent runs:");
    for task in schedule.task_types() {
        println!("  {}:", task);
        for run in schedule.runs(task).iter().rev() {
            let outcome = match (&run.error, run.success) {
                (_, true) => "SUCCESS".to_string(),
                (Some(err), false) => format!("ERROR: {}", err),
                (None, false) => "ERROR".to_string(),
            };
            println!(
                "    {} ({}s) {}",
                run.start.to_rfc3339(),
                (run.end - run.start).num_seconds(),
                outcome
            );
        }
    }

    Ok(())
}
