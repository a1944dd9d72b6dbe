//! Throttled alert dispatch
//!
//! An alert fires once a failure episode has lasted past the threshold and is
//! repeated no more often than the repeat window. Sound and email are
//! independent channels; one failing never suppresses the other.

use super::mail::Mailer;
use super::sound::SoundPlayer;
use crate::domain::{ServiceDescriptor, ServiceState};
use crate::error::AlertDeliveryError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Alert payload for one failed service
#[derive(Debug, Clone)]
pub struct ServiceAlert {
    pub service: String,
    pub description: Option<String>,
    pub downtime: Duration,
    pub restart_attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl ServiceAlert {
    pub fn new(
        service: &ServiceDescriptor,
        downtime: Duration,
        restart_attempts: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            service: service.id.clone(),
            description: service.description.clone(),
            downtime,
            restart_attempts,
            timestamp,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "[vigil] {} down for {}",
            self.service,
            humanize_duration(self.downtime)
        )
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "Service: {}\nDown for: {}\nRestart attempts: {}\nDetected at: {}\n",
            self.service,
            humanize_duration(self.downtime),
            self.restart_attempts,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        if let Some(desc) = &self.description {
            body.push_str(&format!("Description: {}\n", desc));
        }
        body.push_str("\nAutomatic remediation did not bring the service back. Manual intervention required.\n");
        body
    }

    /// Short text for speech synthesis
    pub fn spoken(&self) -> String {
        format!(
            "Alert. {} has been down for {}.",
            self.service.replace('_', " "),
            humanize_duration(self.downtime)
        )
    }
}

/// Render a duration as `2h 5m`, `31m`, `45s`
pub fn humanize_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3600,
        (total % 3600) / 60,
        total % 60,
    );

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// Threshold and repeat window for alerts
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Failure duration before the first alert (default: 1800s)
    pub threshold: Duration,
    /// Minimum spacing between alerts in one episode (default: 1800s)
    pub repeat_window: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(1800),
            repeat_window: Duration::from_secs(1800),
        }
    }
}

impl AlertPolicy {
    /// Re-evaluated on every over-threshold cycle
    pub fn should_alert(
        &self,
        failure_duration: Duration,
        last_alert_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if failure_duration < self.threshold {
            return false;
        }

        match last_alert_at {
            None => true,
            Some(last) => {
                let since = now
                    .signed_duration_since(last)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                since >= self.repeat_window
            }
        }
    }
}

/// Whether an alert went out this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    Sent,
    Suppressed,
}

/// Per-channel outcome of one dispatch
#[derive(Debug)]
pub struct DeliveryReport {
    pub sound: Result<(), AlertDeliveryError>,
    pub email: Result<(), AlertDeliveryError>,
}

/// Sends throttled service-down alerts
pub struct AlertDispatcher {
    policy: AlertPolicy,
    sound: Arc<dyn SoundPlayer>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl AlertDispatcher {
    pub fn new(
        policy: AlertPolicy,
        sound: Arc<dyn SoundPlayer>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            policy,
            sound,
            mailer,
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Alert about a failed service if the throttle allows it.
    /// `last_alert_at` is recorded whenever an alert is attempted.
    pub async fn maybe_alert(
        &self,
        service: &ServiceDescriptor,
        state: &mut ServiceState,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        let Some(failure_duration) = state.failure_duration(now) else {
            return AlertDecision::Suppressed;
        };

        if !self
            .policy
            .should_alert(failure_duration, state.last_alert_at(), now)
        {
            debug!(
                service = %service.id,
                "Alert suppressed (down {}s)",
                failure_duration.as_secs()
            );
            return AlertDecision::Suppressed;
        }

        let alert = ServiceAlert::new(service, failure_duration, state.restart_attempts(), now);
        warn!(
            service = %service.id,
            "Dispatching alert: down for {} after {} restart attempts",
            humanize_duration(failure_duration),
            state.restart_attempts()
        );

        let report = self.dispatch(&alert).await;
        if let Err(e) = &report.sound {
            error!(service = %service.id, "Sound alert failed: {}", e);
        }
        match &report.email {
            Ok(()) => info!(service = %service.id, "Alert email sent"),
            Err(AlertDeliveryError::MailNotConfigured(reason)) => {
                warn!(service = %service.id, "Skipping alert email: {}", reason)
            }
            Err(e) => error!(service = %service.id, "Alert email failed: {}", e),
        }

        state.record_alert(now);
        AlertDecision::Sent
    }

    /// Send on both channels without throttling
    pub async fn dispatch(&self, alert: &ServiceAlert) -> DeliveryReport {
        let sound = self.sound.play(&alert.spoken()).await;
        let email = self.send_email(&alert.subject(), &alert.body()).await;
        DeliveryReport { sound, email }
    }

    async fn send_email(&self, subject: &str, body: &str) -> Result<(), AlertDeliveryError> {
        match &self.mailer {
            Some(mailer) => mailer.send(subject, body).await,
            None => Err(AlertDeliveryError::MailNotConfigured(
                "SMTP credentials or recipient missing".to_string(),
            )),
        }
    }

    /// One-shot check of the sound channel
    pub async fn self_test_sound(&self) -> Result<(), AlertDeliveryError> {
        self.sound.play("Vigil sound test").await
    }

    /// One-shot check of the email channel
    pub async fn self_test_email(&self) -> Result<(), AlertDeliveryError> {
        self.send_email(
            "[vigil] email self-test",
            &format!(
                "This is a test message from the vigil supervisor.\nSent at: {}\n",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        )
        .await
    }
}
