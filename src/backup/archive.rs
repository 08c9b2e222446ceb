// dbbackup/src/backup/archive.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::errors::{AppError, Result};

/// Seam over archive creation so the orchestration can run in tests
/// without a 7-Zip install.
pub trait Archiver {
    /// Bundles the `.bak` files in `source_dir` into
    /// `<server_name>_<stamp>.7z` inside the same directory, consuming
    /// the sources on success. Returns the archive path.
    fn archive(&self, source_dir: &Path, server_name: &str, stamp: &str) -> Result<PathBuf>;
}

/// Invokes the external 7-Zip executable. The sources are deleted by
/// the tool itself (`-sdel`) only after they were added successfully.
pub struct SevenZipArchiver {
    tool_path: PathBuf,
}

impl SevenZipArchiver {
    /// Fails if the executable is not present, so a bad tool path is
    /// caught before any database work starts.
    pub fn new(tool_path: PathBuf) -> Result<Self> {
        if !tool_path.is_file() {
            return Err(AppError::ArchiveTool(format!(
                "Compression tool not found at {}",
                tool_path.display()
            )));
        }
        Ok(Self { tool_path })
    }

    pub fn default_tool_path() -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(r"C:\Program Files\7-Zip\7z.exe")
        } else {
            PathBuf::from("/usr/bin/7z")
        }
    }
}

impl Archiver for SevenZipArchiver {
    fn archive(&self, source_dir: &Path, server_name: &str, stamp: &str) -> Result<PathBuf> {
        let archive_path = source_dir.join(format!("{server_name}_{stamp}.7z"));
        let bak_files = collect_bak_files(source_dir)?;
        if bak_files.is_empty() {
            return Err(AppError::ArchiveTool(format!(
                "No .bak files to archive in {}",
                source_dir.display()
            )));
        }

        info!(
            "Compressing {} backup file(s) into {}",
            bak_files.len(),
            archive_path.display()
        );
        let output = Command::new(&self.tool_path)
            .arg("a")
            .arg("-t7z")
            .arg("-mx=9")
            .arg("-sdel")
            .arg(&archive_path)
            .args(&bak_files)
            .output()
            .map_err(|e| {
                AppError::ArchiveTool(format!(
                    "Failed to execute {}: {}",
                    self.tool_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(AppError::ArchiveTool(format!(
                "{} exited with {}: {}",
                self.tool_path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!("✓ Archive created at {}", archive_path.display());
        Ok(archive_path)
    }
}

/// The `.bak` set is expanded here rather than by a shell glob, sorted
/// for a stable member order inside the archive.
fn collect_bak_files(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(source_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "bak") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
