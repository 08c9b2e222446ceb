// dbbackup/src/backup/service.rs
use sqlx::{Connection, PgConnection, Row};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::info;
use url::Url;
use which::which;

use crate::errors::{AppError, Result};

/// Seam over the engine's enumeration and native backup facilities so
/// the orchestration can be driven against fakes in tests.
pub trait DatabaseBackupService {
    async fn list_databases(&self) -> Result<Vec<String>>;
    async fn backup_database(&self, name: &str, target: &Path) -> Result<()>;
}

/// Backs up PostgreSQL databases with the engine's own tooling:
/// enumeration through an administrative connection, export via
/// `pg_dump` in custom format.
///
/// Credentials come from the libpq environment (`PGUSER`/`PGPASSWORD`,
/// usually via `.env`) so the admin connection and `pg_dump` authenticate
/// the same way; the options file never carries them.
pub struct PgBackupService {
    base_url: String,
    pg_dump_path: PathBuf,
    connect_timeout: Duration,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

impl PgBackupService {
    pub fn new(servername: &str) -> Result<Self> {
        let pg_dump_path = which("pg_dump").map_err(|_| {
            AppError::Config(
                "pg_dump executable not found in PATH. Ensure PostgreSQL client tools are installed."
                    .to_string(),
            )
        })?;
        let base_url = format!("postgres://{servername}");
        Url::parse(&base_url)
            .map_err(|e| AppError::Config(format!("Invalid server name '{servername}': {e}")))?;
        Ok(Self {
            base_url,
            pg_dump_path,
            connect_timeout: CONNECT_TIMEOUT,
        })
    }
}

impl DatabaseBackupService for PgBackupService {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let admin_url = format!("{}/postgres", self.base_url);
        info!("Fetching list of databases from {}", self.base_url);

        let mut conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect(&admin_url))
            .await
            .map_err(|_| {
                AppError::Connection(format!(
                    "Timed out after {:?} connecting to {}",
                    self.connect_timeout, self.base_url
                ))
            })?
            .map_err(|e| {
                AppError::Connection(format!("Failed to connect to {}: {}", self.base_url, e))
            })?;

        let rows = sqlx::query(
            "SELECT datname FROM pg_database WHERE datistemplate = false AND datallowconn = true ORDER BY datname",
        )
        .fetch_all(&mut conn)
        .await
        .map_err(|e| {
            AppError::Connection(format!(
                "Failed to list databases on {}: {}",
                self.base_url, e
            ))
        })?;

        let mut names = Vec::new();
        for row in rows {
            let name: String = row.try_get("datname")?;
            // The maintenance database and templates are never part of a
            // backup set.
            if name.starts_with("template") || name == "postgres" {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    async fn backup_database(&self, name: &str, target: &Path) -> Result<()> {
        let db_url = format!("{}/{}", self.base_url, name);
        let output = Command::new(&self.pg_dump_path)
            .arg("--format=custom")
            .arg("-f")
            .arg(target)
            .arg(&db_url)
            .output()
            .map_err(|e| AppError::Backup {
                database: name.to_string(),
                detail: format!("failed to execute pg_dump: {e}"),
            })?;

        if !output.status.success() {
            return Err(AppError::Backup {
                database: name.to_string(),
                detail: format!(
                    "pg_dump exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}
