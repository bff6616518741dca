use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ratekeeper::config::{LoggingConfig, RatekeeperConfig};
use ratekeeper::ratelimit::{Admission, Manager, RuleSet, RuleSpec};

/// Multi-rule sliding-window rate limiter.
#[derive(Debug, Parser)]
#[command(name = "ratekeeper", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rule as INTERVAL=AMOUNT; repeat for several rules (overrides the file)
    #[arg(short, long = "rule", value_name = "INTERVAL=AMOUNT")]
    rules: Vec<RuleSpec>,

    /// Log file snapshots are written to
    #[arg(long)]
    log: Option<PathBuf>,

    /// Log file prior state is read from
    #[arg(long)]
    load: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Try to admit one event; prints 0 or the seconds to wait
    Check,
    /// Admit events one after another, waiting whenever a rule is full
    Run {
        /// Number of events to admit
        #[arg(short = 'n', long, default_value_t = 1)]
        events: u64,
    },
    /// Print the current normalized snapshot
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RatekeeperConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RatekeeperConfig::default(),
    };
    // Tracing is configured by the file, so report it once the subscriber is up.
    init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "Loaded configuration file");
    }

    if let Some(log) = cli.log {
        config.log.path = log;
    }
    if let Some(load) = cli.load {
        config.log.load_path = Some(load);
    }

    let rules = if cli.rules.is_empty() {
        config
            .rules
            .take()
            .context("no rules configured; pass --rule INTERVAL=AMOUNT or a config file")?
    } else {
        RuleSet::from_specs(cli.rules)?
    };
    info!(
        rules = %rules.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
        log = %config.log.path.display(),
        "Configuration loaded"
    );

    let mut manager = Manager::with_config(rules, config.log)?;

    match cli.command {
        Command::Check => {
            let wait = manager.check_time()?;
            println!("{wait}");
        }
        Command::Run { events } => run(&mut manager, events).await?,
        Command::Show => {
            println!("{}", serde_json::to_string_pretty(&manager.snapshot())?);
        }
    }
    Ok(())
}

/// Admit `events` events, sleeping out every refusal. Ctrl+C or SIGTERM
/// during a wait stops the loop early; the log is synced either way.
async fn run(manager: &mut Manager, events: u64) -> anyhow::Result<()> {
    let mut terminate = terminate_signal().context("installing SIGTERM handler")?;

    let mut admitted = 0;
    while admitted < events {
        let secs = match manager.check()? {
            Admission::Admitted => {
                admitted += 1;
                println!("admitted {admitted}/{events}");
                continue;
            }
            Admission::Wait(secs) => secs,
        };

        info!(wait = secs, admitted, "Rate limited, waiting");
        let stopped_by = tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => None,
            _ = signal::ctrl_c() => Some("Ctrl+C"),
            _ = terminated(&mut terminate) => Some("SIGTERM"),
        };
        if let Some(by) = stopped_by {
            warn!(
                signal = by,
                admitted,
                remaining = events - admitted,
                "Stopping before all events were admitted"
            );
            break;
        }
    }

    manager.sync_file()?;
    Ok(())
}

#[cfg(unix)]
type Terminate = signal::unix::Signal;
#[cfg(not(unix))]
type Terminate = ();

#[cfg(unix)]
fn terminate_signal() -> std::io::Result<Terminate> {
    signal::unix::signal(signal::unix::SignalKind::terminate())
}

#[cfg(not(unix))]
fn terminate_signal() -> std::io::Result<Terminate> {
    Ok(())
}

#[cfg(unix)]
async fn terminated(terminate: &mut Terminate) {
    terminate.recv().await;
}

#[cfg(not(unix))]
async fn terminated(_: &mut Terminate) {
    std::future::pending::<()>().await
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
