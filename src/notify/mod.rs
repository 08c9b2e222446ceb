// dbbackup/src/notify/mod.rs
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

use crate::config::{BackupOptions, Secret};
use crate::errors::{AppError, Result};
use crate::runner::Stage;

/// Outbound mail seam so failure notification can be exercised in tests
/// without an SMTP server.
pub trait Mailer {
    fn send(&self, subject: &str, body: &str) -> Result<()>;
}

pub struct SmtpMailer {
    server_address: String,
    port: u16,
    username: String,
    password: Secret,
    send_to: String,
}

impl SmtpMailer {
    pub fn from_options(options: &BackupOptions) -> Self {
        Self {
            server_address: options.smtp_settings.server_address.clone(),
            port: options.smtp_settings.port,
            username: options.email_credentials.username.clone(),
            password: options.email_credentials.password.clone(),
            send_to: options.smtp_settings.send_to.clone(),
        }
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, subject: &str, body: &str) -> Result<()> {
        let from = self
            .username
            .parse()
            .map_err(|e| AppError::Notification(format!("Invalid sender address '{}': {}", self.username, e)))?;
        let to = self
            .send_to
            .parse()
            .map_err(|e| AppError::Notification(format!("Invalid recipient address '{}': {}", self.send_to, e)))?;
        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Notification(format!("Failed to build email: {e}")))?;

        let creds = Credentials::new(
            self.username.clone(),
            self.password.expose().to_string(),
        );
        let mailer = SmtpTransport::starttls_relay(&self.server_address)
            .map_err(|e| {
                AppError::Notification(format!(
                    "Failed to build SMTP client for {}: {}",
                    self.server_address, e
                ))
            })?
            .port(self.port)
            .credentials(creds)
            .build();

        let response = mailer
            .send(&email)
            .map_err(|e| AppError::Notification(format!("SMTP send failed: {e}")))?;
        if response.is_positive() {
            Ok(())
        } else {
            Err(AppError::Notification(format!(
                "SMTP server rejected the message: {}",
                response.code()
            )))
        }
    }
}

/// Sends the diagnostic email for a failed run. A send failure is logged
/// and swallowed: by this point the run log already holds the full
/// story, and the process still has to terminate cleanly.
pub fn notify_failure<M: Mailer>(
    mailer: &M,
    options: &BackupOptions,
    stage: Stage,
    error: &AppError,
) {
    let now = Utc::now();
    let subject = format!(
        "Database backup failed on {} - {}",
        options.database_backup.servername,
        now.format("%Y-%m-%d")
    );
    let body = compose_body(options, stage, error, now);

    info!(
        "Sending failure notification to {}",
        options.smtp_settings.send_to
    );
    match mailer.send(&subject, &body) {
        Ok(()) => info!("Failure notification sent"),
        Err(e) => error!("{e}"),
    }
}

fn compose_body(
    options: &BackupOptions,
    stage: Stage,
    error: &AppError,
    now: DateTime<Utc>,
) -> String {
    let mut body = format!(
        "The scheduled database backup run did not complete.\n\
         \n\
         Server:   {}\n\
         Instance: {}\n\
         Time:     {}\n\
         Stage:    {}\n\
         Error:    {}\n",
        options.database_backup.servername,
        options.database_backup.instance,
        now.format("%Y-%m-%dT%H:%M:%S"),
        stage,
        error
    );
    if let Some(item) = error.subject_item() {
        body.push_str(&format!("Item:     {item}\n"));
    }
    body.push_str("\nThe run log contains the full sequence of events.\n");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_options;
    use serde_json::json;
    use std::cell::RefCell;
    use std::io::Write;

    struct RecordingMailer {
        sent: RefCell<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingMailer {
        fn new(fail: bool) -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                fail,
            }
        }
    }

    impl Mailer for RecordingMailer {
        fn send(&self, subject: &str, body: &str) -> Result<()> {
            self.sent
                .borrow_mut()
                .push((subject.to_string(), body.to_string()));
            if self.fail {
                Err(AppError::Notification("simulated SMTP outage".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn test_options() -> BackupOptions {
        let value = json!({
            "database_backup": {
                "servername": "SRV1",
                "instance": "DEFAULT",
                "backup_directory_path": "/backups",
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
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", value).unwrap();
        load_options(file.path()).unwrap()
    }

    #[test]
    fn test_notify_failure_attempts_exactly_one_send() {
        let options = test_options();
        let mailer = RecordingMailer::new(false);
        let error = AppError::ArchiveTool("7z exited with code 2".to_string());

        notify_failure(&mailer, &options, Stage::Archive, &error);

        assert_eq!(mailer.sent.borrow().len(), 1);
    }

    #[test]
    fn test_notification_body_names_server_instance_and_error() {
        let options = test_options();
        let error = AppError::ArchiveTool("7z exited with code 2".to_string());
        let body = compose_body(&options, Stage::Archive, &error, Utc::now());

        assert!(body.contains("SRV1"));
        assert!(body.contains("DEFAULT"));
        assert!(body.contains("7z exited with code 2"));
        assert!(body.contains("archiving"));
    }

    #[test]
    fn test_notification_body_carries_the_failing_database() {
        let options = test_options();
        let error = AppError::Backup {
            database: "catalog".to_string(),
            detail: "pg_dump exited with code 1".to_string(),
        };
        let body = compose_body(&options, Stage::BackupEach, &error, Utc::now());

        assert!(body.contains("Item:     catalog"));
    }

    #[test]
    fn test_notify_failure_survives_a_failing_mailer() {
        let options = test_options();
        let mailer = RecordingMailer::new(true);
        let error = AppError::Connection("no route to host".to_string());

        // Must not panic; the log file is the fallback channel.
        notify_failure(&mailer, &options, Stage::Enumerate, &error);

        assert_eq!(mailer.sent.borrow().len(), 1);
    }

    #[test]
    fn test_subject_names_server_and_date() {
        let options = test_options();
        let mailer = RecordingMailer::new(false);
        let error = AppError::Connection("refused".to_string());

        notify_failure(&mailer, &options, Stage::Enumerate, &error);

        let sent = mailer.sent.borrow();
        let (subject, _) = &sent[0];
        assert!(subject.contains("SRV1"));
        assert!(subject.contains(&Utc::now().format("%Y-%m-%d").to_string()));
    }
}
