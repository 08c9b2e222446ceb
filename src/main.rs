//! Scheduled database backup runner.
//!
//! Backs up every database on a configured server into a dated 7z
//! archive, prunes old files in the backup directory, and emails the
//! operator when a run fails.

// dbbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod logging;
mod notify;
mod retention;
mod runner;

use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use backup::archive::SevenZipArchiver;
use backup::service::PgBackupService;
use config::BackupOptions;
use notify::SmtpMailer;
use runner::{RunReport, Stage, StageFailure};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the JSON options file
    #[arg(short, long, default_value = "./options.json")]
    config: PathBuf,

    /// Path to the 7-Zip executable
    #[arg(long, default_value_os_t = SevenZipArchiver::default_tool_path())]
    seven_zip: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let started = Utc::now();
    let stamp = logging::run_stamp(&started);
    let (log_path, _guard) = match logging::init_logging(Path::new("./logs"), &stamp) {
        Ok(initialized) => initialized,
        Err(e) => {
            eprintln!("Failed to initialise run log: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Backup run {} started, logging to {}", stamp, log_path.display());

    let options = match config::load_options(&args.config) {
        Ok(options) => options,
        Err(e) => {
            // No notification on this path: the SMTP settings live in
            // the configuration that just failed to load. The run log
            // is the only channel.
            error!("{} failed: {}", Stage::LoadConfig, e);
            return ExitCode::FAILURE;
        }
    };
    info!("Loaded options from {}", args.config.display());

    match run_pipeline(&options, &args.seven_zip, &stamp).await {
        Ok(report) => {
            info!(
                "✅ Backup run succeeded: {} database(s) archived to {}",
                report.databases.len(),
                report.archive_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!("❌ {} failed: {}", failure.stage, failure.error);
            let mailer = SmtpMailer::from_options(&options);
            notify::notify_failure(&mailer, &options, failure.stage, &failure.error);
            ExitCode::FAILURE
        }
    }
}

/// Builds the production collaborators and drives the stage machine.
/// Both external tools are checked before any database work starts.
async fn run_pipeline(
    options: &BackupOptions,
    seven_zip: &Path,
    stamp: &str,
) -> Result<RunReport, StageFailure> {
    let archiver = SevenZipArchiver::new(seven_zip.to_path_buf()).map_err(|e| StageFailure {
        stage: Stage::Archive,
        error: e,
    })?;
    let service =
        PgBackupService::new(&options.database_backup.servername).map_err(|e| StageFailure {
            stage: Stage::Enumerate,
            error: e,
        })?;

    runner::run(options, &service, &archiver, stamp).await
}
