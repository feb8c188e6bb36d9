use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use grace_sync::app::{App, RunOptions};
use grace_sync::catalog::JsonLinesIngest;
use grace_sync::config::ConfigLoader;
use grace_sync::domain::Operation;
use grace_sync::error::GraceError;
use grace_sync::output::{JsonOutput, LogProgress, write_summary};
use grace_sync::transfer::SystemTransfer;

#[derive(Parser)]
#[command(name = "grace-sync")]
#[command(about = "Discover, download and catalog GRACE Tellus L3 GSM solutions")]
#[command(version, author)]
struct Cli {
    /// search, fetch, organize or sync (legacy ids such as `curlgrace` are accepted)
    operation: String,

    /// Path to the JSON run configuration (default: ./grace-sync.json)
    #[arg(long)]
    config: Option<String>,

    /// Refresh the listing even if a cached index.html exists
    #[arg(long)]
    force_index: bool,

    /// Re-download files that already exist locally
    #[arg(long)]
    overwrite: bool,

    /// Report what would be downloaded without transferring anything
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(grace) = report.downcast_ref::<GraceError>() {
            return ExitCode::from(map_exit_code(grace));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GraceError) -> u8 {
    if error.is_configuration() { 2 } else { 1 }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let operation: Operation = cli.operation.parse()?;
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    let ingest = JsonLinesIngest::new(config.manifest.clone());
    let transfer = SystemTransfer::new(config.transfer.clone());
    let app = App::new(config, transfer, ingest);
    let options = RunOptions {
        force_index: cli.force_index,
        overwrite_files: cli.overwrite,
        dry_run: cli.dry_run,
    };

    let report = if cli.json {
        app.run(operation, options, &JsonOutput)?
    } else {
        app.run(operation, options, &LogProgress)?
    };

    if report.failed_transfers() > 0 {
        warn!(
            failed = report.failed_transfers(),
            "some transfers failed; rerun to retry them"
        );
    }

    if cli.json {
        JsonOutput::print_report(&report).into_diagnostic()?;
    } else {
        write_summary(&mut std::io::stdout(), &report).into_diagnostic()?;
    }
    Ok(())
}
