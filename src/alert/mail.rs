//! Email alerts over SMTP
//!
//! Messages are handed to curl's SMTP client, which takes care of TLS and
//! authentication. Credentials come from the environment.

use crate::error::{AlertDeliveryError, CommandError};
use crate::process;
use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;

/// Email alert channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), AlertDeliveryError>;
}

/// SMTP connection settings
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl SmtpSettings {
    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD`, `SMTP_FROM`
    pub fn from_env() -> Result<Self, AlertDeliveryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AlertDeliveryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let user = non_empty("SMTP_USER").ok_or_else(|| {
            AlertDeliveryError::MailNotConfigured("SMTP_USER is not set".to_string())
        })?;
        let password = non_empty("SMTP_PASSWORD").ok_or_else(|| {
            AlertDeliveryError::MailNotConfigured("SMTP_PASSWORD is not set".to_string())
        })?;

        let host = non_empty("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string());
        let port = non_empty("SMTP_PORT")
            .and_then(|p| p.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);
        let from = non_empty("SMTP_FROM").unwrap_or_else(|| user.clone());

        Ok(Self {
            host,
            port,
            user,
            password,
            from,
        })
    }

    /// Port 465 speaks implicit TLS, everything else upgrades with STARTTLS
    pub fn url(&self) -> String {
        let scheme = if self.port == 465 { "smtps" } else { "smtp" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Mailer that pipes an RFC 5322 message into `curl`
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    settings: SmtpSettings,
    recipient: String,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings, recipient: String, timeout: Duration) -> Self {
        Self {
            settings,
            recipient,
            timeout,
        }
    }

    /// Environment-configured mailer; errors when credentials or recipient are missing
    pub fn from_env(recipient: Option<&str>, timeout: Duration) -> Result<Self, AlertDeliveryError> {
        let recipient = recipient
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                AlertDeliveryError::MailNotConfigured("alert.recipient is not set".to_string())
            })?;
        let settings = SmtpSettings::from_env()?;
        info!(
            "Email alerts enabled via {} to {}",
            settings.url(),
            recipient
        );
        Ok(Self::new(settings, recipient.to_string(), timeout))
    }

    /// curl command line for delivering one message read from stdin.
    /// Credentials are read from `config_file`, never passed as arguments.
    pub fn curl_args(&self, config_file: &Path) -> Vec<String> {
        let mut argv = vec![
            "curl".to_string(),
            "--silent".to_string(),
            "--show-error".to_string(),
            "--config".to_string(),
            config_file.display().to_string(),
            "--max-time".to_string(),
            self.timeout.as_secs().max(1).to_string(),
            "--url".to_string(),
            self.settings.url(),
        ];
        if self.settings.port != 465 {
            argv.push("--ssl-reqd".to_string());
        }
        argv.extend([
            "--mail-from".to_string(),
            self.settings.from.clone(),
            "--mail-rcpt".to_string(),
            self.recipient.clone(),
            "--upload-file".to_string(),
            "-".to_string(),
        ]);
        argv
    }

    /// curl config carrying the SMTP login
    pub fn curl_config(&self) -> String {
        let login = format!("{}:{}", self.settings.user, self.settings.password);
        format!(
            "user = \"{}\"\n",
            login.replace('\\', "\\\\").replace('"', "\\\"")
        )
    }

    // Created 0600 and removed when the returned handle drops
    fn write_curl_config(&self) -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("vigil-smtp-")
            .suffix(".conf")
            .tempfile()?;
        file.write_all(self.curl_config().as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    /// Render the message headers and body
    pub fn render(&self, subject: &str, body: &str) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            self.settings.from,
            self.recipient,
            subject,
            Utc::now().to_rfc2822(),
            body.replace('\n', "\r\n")
        )
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<(), AlertDeliveryError> {
        let message = self.render(subject, body);
        // Leave curl time to report its own timeout before ours fires
        let deadline = self.timeout + Duration::from_secs(5);

        let config = self.write_curl_config().map_err(|source| {
            AlertDeliveryError::Mail(CommandError::Io {
                program: "curl".to_string(),
                source,
            })
        })?;

        process::run_command(
            &self.curl_args(config.path()),
            Some(message.as_bytes()),
            deadline,
        )
        .await
        .map_err(AlertDeliveryError::Mail)?;

        debug!("Alert email sent to {}", self.recipient);
        Ok(())
    }
}
