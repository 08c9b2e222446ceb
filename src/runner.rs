// dbbackup/src/runner.rs
//! The backup pipeline as an explicit sequence of named stages. Any
//! failure lands in the single terminal `StageFailure` state; there is
//! no partial continuation and no retry.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backup::archive::Archiver;
use crate::backup::service::DatabaseBackupService;
use crate::config::BackupOptions;
use crate::errors::{AppError, Result};
use crate::retention;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadConfig,
    Enumerate,
    BackupEach,
    Archive,
    Prune,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadConfig => "loading configuration",
            Stage::Enumerate => "enumerating databases",
            Stage::BackupEach => "backing up databases",
            Stage::Archive => "archiving",
            Stage::Prune => "pruning old backups",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal failure state: the stage that failed and the error it
/// failed with.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: AppError,
}

#[derive(Debug)]
pub struct RunReport {
    pub databases: Vec<String>,
    pub archive_path: PathBuf,
    pub pruned: usize,
}

pub async fn run<S, A>(
    options: &BackupOptions,
    service: &S,
    archiver: &A,
    stamp: &str,
) -> std::result::Result<RunReport, StageFailure>
where
    S: DatabaseBackupService,
    A: Archiver,
{
    let db = &options.database_backup;
    let target_dir = &db.backup_directory_path;
    info!(
        "Starting backup run for server '{}' instance '{}'",
        db.servername, db.instance
    );

    let stage = Stage::Enumerate;
    let databases = service
        .list_databases()
        .await
        .map_err(|e| fail(stage, e))?;
    if databases.is_empty() {
        return Err(fail(
            stage,
            AppError::Connection(format!("no databases enumerated on '{}'", db.servername)),
        ));
    }
    info!("Found {} database(s): {:?}", databases.len(), databases);

    let stage = Stage::BackupEach;
    fs::create_dir_all(target_dir).map_err(|e| fail(stage, e.into()))?;
    for name in &databases {
        let artifact = artifact_path(target_dir, name).map_err(|e| fail(stage, e))?;
        info!("Backing up database '{}' to {}", name, artifact.display());
        service
            .backup_database(name, &artifact)
            .await
            .map_err(|e| fail(stage, e))?;
        info!("✓ Backed up database '{}'", name);
    }

    let stage = Stage::Archive;
    let archive_path = archiver
        .archive(target_dir, &db.servername, stamp)
        .map_err(|e| fail(stage, e))?;

    let stage = Stage::Prune;
    let pruned = retention::prune_older_than(target_dir, db.remove_backups_older_than)
        .map_err(|e| fail(stage, e))?;
    info!(
        "Pruned {} file(s) older than {} days",
        pruned, db.remove_backups_older_than
    );

    let stage = Stage::Done;
    info!(
        "Backup run {}: {} database(s), archive {}",
        stage,
        databases.len(),
        archive_path.display()
    );
    Ok(RunReport {
        databases,
        archive_path,
        pruned,
    })
}

fn fail(stage: Stage, error: AppError) -> StageFailure {
    StageFailure { stage, error }
}

/// Artifact path for one database. Names come from the engine, but a
/// name that could escape the backup directory aborts the run.
fn artifact_path(dir: &Path, name: &str) -> Result<PathBuf> {
    if name.trim().is_empty()
        || name.contains(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
    {
        return Err(AppError::Backup {
            database: name.to_string(),
            detail: "invalid character in database name".to_string(),
        });
    }
    Ok(dir.join(format!("{name}.bak")))
}
