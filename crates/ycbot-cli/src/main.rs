mod check;
mod run;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};

use ycbot_cloud::{Endpoints, RefreshPolicy};
use ycbot_config::{AutoShutdownConfig, CloudConfig, CredentialConfig, YcBotConfig};
use ycbot_cron::Schedule;

#[derive(Parser)]
#[command(name = "ycbot", about = "Stops Yandex Cloud instances past their expiry date")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot
    Run {
        /// Config file (defaults to ~/.ycbot/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List expired instances once and optionally stop them
    Check {
        /// Config file (defaults to ~/.ycbot/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop the expired instances after listing them
        #[arg(long)]
        stop: bool,
    },
    /// Print when auto-shutdown would fire next
    NextRun {
        /// Config file (defaults to ~/.ycbot/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Start time, HH:MM (overrides config)
        #[arg(long)]
        start: Option<String>,

        /// Period, HH:MM or 24:00 (overrides config)
        #[arg(long)]
        period: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<YcBotConfig> {
    let config = match path {
        Some(path) => ycbot_config::load_config_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ycbot_config::load_config().context("failed to load config")?,
    };
    Ok(config)
}

fn endpoints(cloud: &CloudConfig) -> Endpoints {
    Endpoints {
        iam: cloud.iam_endpoint.clone(),
        resource_manager: cloud.resource_manager_endpoint.clone(),
        compute: cloud.compute_endpoint.clone(),
        organization_manager: cloud.organization_manager_endpoint.clone(),
    }
}

fn refresh_policy(credential: &CredentialConfig) -> RefreshPolicy {
    RefreshPolicy {
        safety_margin: Duration::from_secs(credential.refresh_margin_secs),
        max_attempts: credential.max_attempts.max(1),
        initial_backoff: Duration::from_secs(credential.initial_backoff_secs),
        max_backoff: Duration::from_secs(credential.max_backoff_secs),
    }
}

fn schedule(auto_shutdown: &AutoShutdownConfig) -> anyhow::Result<Schedule> {
    Schedule::parse(&auto_shutdown.start, &auto_shutdown.period)
        .context("invalid auto_shutdown schedule in config")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run_bot(config))?;
        }
        Commands::Check { config, stop } => {
            let config = load_config(config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check::run_check(config, stop))?;
        }
        Commands::NextRun {
            config,
            start,
            period,
        } => {
            let mut auto_shutdown = load_config(config)?.auto_shutdown;
            if let Some(start) = start {
                auto_shutdown.start = start;
            }
            if let Some(period) = period {
                auto_shutdown.period = period;
            }
            let schedule = schedule(&auto_shutdown)?;
            let next = schedule.next_fire_after(Local::now().naive_local());
            println!("{schedule}");
            println!("next run: {}", next.format("%Y-%m-%d %H:%M"));
        }
    }

    Ok(())
}
