// dbbackup/src/retention.rs
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

/// Deletes every file under `dir`, at any depth, whose last-modified
/// time is strictly older than `days` days. Returns the number of files
/// removed.
///
/// The scan is deliberately recursive over the whole directory: anything
/// an operator parks under the backup directory ages out with the
/// archives. `days` has already been validated non-negative at load.
pub fn prune_older_than(dir: &Path, days: i64) -> Result<usize> {
    prune_older_than_at(dir, days, Utc::now())
}

pub(crate) fn prune_older_than_at(dir: &Path, days: i64, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = now - Duration::days(days);
    warn!(
        "Pruning every file under {} last modified before {}, recursively",
        dir.display(),
        cutoff.format("%Y-%m-%dT%H:%M:%S")
    );

    let mut deleted = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| AppError::Prune {
            path: dir.display().to_string(),
            detail: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let modified = entry
            .metadata()
            .map_err(|e| AppError::Prune {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?
            .modified()
            .map_err(|e| AppError::Prune {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        let modified: DateTime<Utc> = modified.into();

        if modified < cutoff {
            fs::remove_file(path).map_err(|e| AppError::Prune {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
            info!("Deleted {} (last modified {})", path.display(), modified);
            deleted += 1;
        }
    }

    Ok(deleted)
}
