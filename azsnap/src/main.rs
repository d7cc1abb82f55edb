// File: azsnap/src/main.rs
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use azsnap::commands::{self, Backends, CommandContext};
use azsnap::config::{Backend, ConfigManager, Overrides};
use azsnap::{RunLog, SnapError};

#[derive(Parser)]
#[command(name = "azsnap", version, about = "Batch-create and validate Azure VM snapshots")]
struct Cli {
    /// TOML configuration file (default: config/azsnap.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for logs, summaries and partition files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Operations in flight at once
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Do not create anything; read-only checks still run
    #[arg(long, global = true)]
    dry_run: bool,

    /// Transport used for Azure calls
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Fail instead of running `az login` when no session exists
    #[arg(long, global = true)]
    no_login: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an OS-disk snapshot for every VM in the inventory
    Create {
        /// VM inventory file
        #[arg(long, short)]
        input: PathBuf,

        /// Change ticket number used in snapshot names and tags
        #[arg(long, env = "AZSNAP_CHG")]
        chg: String,
    },
    /// Check that every snapshot in the list exists and is usable
    Validate {
        /// Snapshot list file
        #[arg(long, short)]
        input: PathBuf,
    },
    /// Move confirmed-invalid snapshots out of the snapshot list
    MoveInvalid {
        /// Snapshot list file to clean up
        #[arg(long, short)]
        input: PathBuf,

        /// Invalid candidates (default: newest invalid_snap_rid_*.txt in the output dir)
        #[arg(long)]
        invalid: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Nothing can be logged until the subscriber exists
    let run_log = match RunLog::init() {
        Ok(run_log) => run_log,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli, run_log).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, run_log: RunLog) -> Result<()> {
    info!("Starting azsnap {}", env!("CARGO_PKG_VERSION"));

    let overrides = Overrides {
        backend: cli.backend,
        concurrency: cli.concurrency,
        output_dir: cli.output_dir,
        dry_run: cli.dry_run,
        no_login: cli.no_login,
    };
    let config_manager = ConfigManager::new(cli.config, &overrides)
        .await
        .map_err(SnapError::Config)?;
    let config = config_manager.get_current_config();
    info!(
        "Backend {:?}, concurrency {}, output dir {}{}",
        config.azure.backend,
        config.batch.concurrency,
        config.output.dir.display(),
        if config.batch.dry_run { ", dry run" } else { "" }
    );

    let backends = Backends::from_config(&config)?;
    let ctx = CommandContext::new(config, backends, run_log);

    let output = match cli.command {
        Command::Create { input, chg } => commands::create_snapshots(&ctx, &input, &chg).await?,
        Command::Validate { input } => commands::validate_snapshots(&ctx, &input).await?,
        Command::MoveInvalid { input, invalid } => {
            commands::move_invalid_snapshots(&ctx, &input, invalid.as_deref()).await?
        }
    };

    info!("Outcomes written to {}", output.outcomes_file.display());
    info!("Summary written to {}", output.summary_file.display());
    for artifact in &output.artifacts {
        info!("Updated {}", artifact.display());
    }
    if output.summary.failed > 0 {
        info!(
            "{} entities failed; details in {}",
            output.summary.failed,
            output.summary_file.display()
        );
    }
    Ok(())
}
