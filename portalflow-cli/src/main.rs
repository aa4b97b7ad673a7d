//! Portalflow CLI
//!
//! Drives the claims portal from the command line: one-off downloads, uploads
//! and reports, an unattended full backup, the recurring backup scheduler and
//! housekeeping of the backup folder.
//!
//! Usage:
//!   portalflow test-login
//!   portalflow download --month 2026-01
//!   portalflow upload --directory data/uploads
//!   portalflow report --types "월별 청구현황" "심사결과" --month 2026-01
//!   portalflow backup --start-date 2026-01-01 --end-date 2026-01-31
//!   portalflow scheduler
//!   portalflow list-backups
//!   portalflow cleanup --keep-days 30

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Args, Parser, Subcommand};
use colored::*;
use portalflow::config::DEFAULT_CONFIG_PATH;
use portalflow::{Config, DateRange, FileFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

mod commands;
mod logging;
mod output;

use commands::App;

#[derive(Parser)]
#[command(name = "portalflow")]
#[command(about = "Claims portal automation: downloads, uploads, reports and scheduled backups")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[clap(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Either explicit bounds or a whole month. Neither means month-to-date.
#[derive(Args, Debug)]
struct RangeArgs {
    /// First day (YYYY-MM-DD)
    #[clap(long)]
    start_date: Option<String>,

    /// Last day (YYYY-MM-DD)
    #[clap(long)]
    end_date: Option<String>,

    /// Whole calendar month (YYYY-MM)
    #[clap(long, conflicts_with_all = ["start_date", "end_date"])]
    month: Option<String>,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// File format to download (excel, pdf, csv). Defaults to download.format
    #[clap(long)]
    format: Option<FileFormat>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct UploadSource {
    /// A single claim file
    #[clap(long)]
    file: Option<PathBuf>,

    /// Upload every file in this directory
    #[clap(long)]
    directory: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[command(flatten)]
    source: UploadSource,

    /// Submit without running the portal's validation first
    #[clap(long)]
    no_validate: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// A single report type
    #[clap(long = "type")]
    report_type: Option<String>,

    /// Several report types. Defaults to backup.report_types
    #[clap(long, num_args = 1.., conflicts_with = "report_type")]
    types: Vec<String>,

    #[command(flatten)]
    range: RangeArgs,

    /// File format to download (excel, pdf, csv)
    #[clap(long)]
    format: Option<FileFormat>,
}

#[derive(Args, Debug)]
struct BackupArgs {
    /// First day (YYYY-MM-DD), defaults to the first of this month
    #[clap(long)]
    start_date: Option<String>,

    /// Last day (YYYY-MM-DD), defaults to today
    #[clap(long)]
    end_date: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, wait for confirmation, log out
    TestLogin,
    /// Download claim data
    Download(DownloadArgs),
    /// Upload claim files
    Upload(UploadArgs),
    /// Generate and download statistics reports
    Report(ReportArgs),
    /// Run one full backup of claims and reports
    Backup(BackupArgs),
    /// Run the configured recurring backups until Ctrl-C
    Scheduler,
    /// Show backup folders, newest first
    ListBackups {
        /// Print machine-readable JSON
        #[clap(long)]
        json: bool,
    },
    /// Delete backup folders older than the retention period
    Cleanup {
        /// Days to keep. Defaults to backup.keep_days
        #[clap(long)]
        keep_days: Option<u32>,
    },
}

impl RangeArgs {
    /// The explicit month, if one was given, and the range to use.
    fn resolve(&self, app: &App) -> Result<(Option<(i32, u32)>, DateRange)> {
        if let Some(month) = &self.month {
            let range = DateRange::parse_month(month).context("Invalid --month")?;
            return Ok((Some((range.start.year(), range.start.month())), range));
        }
        Ok((
            None,
            app.range(self.start_date.as_deref(), self.end_date.as_deref())?,
        ))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    dotenvy::dotenv().ok();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let _guard = logging::init_logging(&config.logging)?;
    if cli.config.exists() {
        info!("Using config {}", cli.config.display());
    } else {
        warn!("Config file {} not found, using defaults", cli.config.display());
    }

    let app = App::new(config);
    match cli.command {
        Commands::TestLogin => app.test_login().await,
        Commands::Download(args) => {
            let (_, range) = args.range.resolve(&app)?;
            app.download(range, args.format).await
        }
        Commands::Upload(args) => {
            let files = match (args.source.file, args.source.directory) {
                (Some(file), _) => vec![file],
                (None, Some(dir)) => commands::files_in(&dir)?,
                (None, None) => Vec::new(),
            };
            let validate = app.config.upload.validate_before_upload && !args.no_validate;
            app.upload(files, validate).await
        }
        Commands::Report(args) => {
            let (month, range) = args.range.resolve(&app)?;
            let kinds = match args.report_type {
                Some(kind) => vec![kind],
                None => args.types,
            };
            app.report(kinds, range, month, args.format).await
        }
        Commands::Backup(args) => {
            let range = app.range(args.start_date.as_deref(), args.end_date.as_deref())?;
            app.backup(range).await
        }
        Commands::Scheduler => app.scheduler().await,
        Commands::ListBackups { json } => app.list_backups(json),
        Commands::Cleanup { keep_days } => app.cleanup(keep_days),
    }
}
