use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot reach database server: {0}")]
    Connection(String),

    #[error("Backup of database '{database}' failed: {detail}")]
    Backup { database: String, detail: String },

    #[error("Archive tool failed: {0}")]
    ArchiveTool(String),

    #[error("Pruning '{path}' failed: {detail}")]
    Prune { path: String, detail: String },

    #[error("Failure notification could not be sent: {0}")]
    Notification(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl AppError {
    /// The concrete item the error is about, when there is one: the
    /// database that failed to dump or the file that failed to delete.
    /// Included in notification bodies.
    pub fn subject_item(&self) -> Option<&str> {
        match self {
            AppError::Backup { database, .. } => Some(database),
            AppError::Prune { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
