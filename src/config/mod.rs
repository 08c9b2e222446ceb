// dbbackup/src/config/mod.rs
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, Result};

/// SMTP password wrapper: usable for sending, invisible everywhere else.
/// `Debug` prints a placeholder so the credential can never leak through
/// logs or error context.
#[derive(Clone, Deserialize)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***REDACTED***")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseBackupSection {
    pub servername: String,
    pub instance: String,
    pub backup_directory_path: PathBuf,
    pub remove_backups_older_than: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailCredentials {
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub send_to: String,
    pub server_address: String,
    pub port: u16,
}

/// Decoded `options.json`. Every field is required; a missing key or a
/// wrong type fails the load before any backup work starts.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupOptions {
    pub database_backup: DatabaseBackupSection,
    pub email_credentials: EmailCredentials,
    pub smtp_settings: SmtpSettings,
}

pub fn load_options(config_path: &Path) -> Result<BackupOptions> {
    let config_content = fs::read_to_string(config_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read config file at {}: {}",
            config_path.display(),
            e
        ))
    })?;
    let options: BackupOptions = serde_json::from_str(&config_content).map_err(|e| {
        AppError::Config(format!(
            "Failed to parse JSON from config file at {}: {}",
            config_path.display(),
            e
        ))
    })?;

    validate_options(&options)?;
    Ok(options)
}

fn validate_options(options: &BackupOptions) -> Result<()> {
    let db = &options.database_backup;
    if db.servername.trim().is_empty() {
        return Err(AppError::Config(
            "database_backup.servername cannot be empty".to_string(),
        ));
    }
    if db.backup_directory_path.as_os_str().is_empty() {
        return Err(AppError::Config(
            "database_backup.backup_directory_path cannot be empty".to_string(),
        ));
    }
    // A negative window would make every file "older than the future"
    // and eligible for deletion. Refuse it outright.
    if db.remove_backups_older_than < 0 {
        return Err(AppError::Config(format!(
            "database_backup.remove_backups_older_than must be >= 0, got {}",
            db.remove_backups_older_than
        )));
    }
    if options.smtp_settings.send_to.trim().is_empty() {
        return Err(AppError::Config(
            "smtp_settings.send_to cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn valid_config_json() -> serde_json::Value {
        json!({
            "database_backup": {
                "servername": "db1.internal",
                "instance": "DEFAULT",
                "backup_directory_path": "/var/backups/db",
                "remove_backups_older_than": 14
            },
            "email_credentials": {
                "username": "ops@example.com",
                "password": "hunter2hunter2"
            },
            "smtp_settings": {
                "send_to": "dba@example.com",
                "server_address": "smtp.example.com",
                "port": 587
            }
        })
    }

    fn write_config(value: &serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", value).unwrap();
        file
    }

    #[test]
    fn test_load_options_round_trips_all_fields() {
        let file = write_config(&valid_config_json());
        let options = load_options(file.path()).unwrap();

        assert_eq!(options.database_backup.servername, "db1.internal");
        assert_eq!(options.database_backup.instance, "DEFAULT");
        assert_eq!(
            options.database_backup.backup_directory_path,
            PathBuf::from("/var/backups/db")
        );
        assert_eq!(options.database_backup.remove_backups_older_than, 14);
        assert_eq!(options.email_credentials.username, "ops@example.com");
        assert_eq!(options.email_credentials.password.expose(), "hunter2hunter2");
        assert_eq!(options.smtp_settings.send_to, "dba@example.com");
        assert_eq!(options.smtp_settings.server_address, "smtp.example.com");
        assert_eq!(options.smtp_settings.port, 587);
    }

    #[test]
    fn test_load_options_missing_file() {
        let result = load_options(Path::new("/nonexistent/options.json"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_options_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let result = load_options(file.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_options_missing_required_field() {
        let mut value = valid_config_json();
        value["smtp_settings"]
            .as_object_mut()
            .unwrap()
            .remove("send_to");
        let file = write_config(&value);
        let result = load_options(file.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_options_missing_section() {
        let mut value = valid_config_json();
        value.as_object_mut().unwrap().remove("email_credentials");
        let file = write_config(&value);
        let result = load_options(file.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_options_rejects_negative_retention() {
        let mut value = valid_config_json();
        value["database_backup"]["remove_backups_older_than"] = json!(-7);
        let file = write_config(&value);
        let result = load_options(file.path());
        match result {
            Err(AppError::Config(msg)) => assert!(msg.contains("remove_backups_older_than")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_options_wrong_type() {
        let mut value = valid_config_json();
        value["smtp_settings"]["port"] = json!("not-a-port");
        let file = write_config(&value);
        let result = load_options(file.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_password_never_appears_in_debug_output() {
        let file = write_config(&valid_config_json());
        let options = load_options(file.path()).unwrap();
        let debugged = format!("{:?}", options);
        assert!(!debugged.contains("hunter2hunter2"));
        assert!(debugged.contains("***REDACTED***"));
    }
}
