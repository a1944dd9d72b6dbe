//! Wiring of concrete collaborators from configuration

use crate::alert::{AlertDispatcher, Mailer, SmtpMailer, SystemSoundPlayer};
use crate::config::{expand_tilde, AppConfig};
use crate::control::SystemController;
use crate::domain::ServiceDescriptor;
use crate::gap::{GapDetector, PostgresFreshness};
use crate::probe::SystemProber;
use crate::remediation::{CommandDependencyRemediator, RemediationEscalator};
use crate::state::FileStateStore;
use crate::supervisor::SupervisionLoop;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub fn build_prober(config: &AppConfig) -> Arc<SystemProber> {
    Arc::new(SystemProber::new(
        config.supervisor.registry_command.clone(),
        Duration::from_secs(config.supervisor.probe_timeout_secs),
    ))
}

/// Alert dispatcher; email is disabled (with a warning) when SMTP is not configured
pub fn build_dispatcher(config: &AppConfig) -> AlertDispatcher {
    let timeout = Duration::from_secs(config.alert.timeout_secs);
    let sound = SystemSoundPlayer::new(
        config.alert.sound_file.as_ref().map(expand_tilde),
        config.alert.player_command.clone(),
        config.alert.speech_command.clone(),
        timeout,
    );

    let mailer: Option<Arc<dyn Mailer>> =
        match SmtpMailer::from_env(config.alert.recipient.as_deref(), timeout) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                warn!("Email alerts disabled: {}", e);
                None
            }
        };

    AlertDispatcher::new(config.alert_policy(), Arc::new(sound), mailer)
}

/// Gap detector when a database is configured and gap checks are enabled
pub fn build_gap_detector(config: &AppConfig) -> Option<GapDetector> {
    if !config.gap.enabled {
        return None;
    }
    let url = config.database.url.as_deref()?;

    let query_timeout = Duration::from_secs(config.gap.query_timeout_secs);
    match PostgresFreshness::connect_lazy(url, config.database.max_connections, query_timeout) {
        Ok(source) => Some(GapDetector::new(
            Box::new(source),
            Duration::from_secs(config.gap.threshold_secs),
            config.gap_markers_path(),
        )),
        Err(e) => {
            warn!("Gap detection disabled: {}", e);
            None
        }
    }
}

/// Assemble the supervision loop for `services`
pub fn build_loop(config: &AppConfig, services: Vec<ServiceDescriptor>) -> SupervisionLoop {
    let prober = build_prober(config);
    let controller = Arc::new(SystemController::new(
        Duration::from_secs(config.supervisor.control_timeout_secs),
        Duration::from_secs(config.supervisor.stop_grace_secs),
    ));
    let dependencies = Arc::new(CommandDependencyRemediator::new(
        config.dependencies.network_tunnel_restart.clone(),
        config.dependencies.database_restart.clone(),
        Duration::from_secs(config.dependencies.timeout_secs),
    ));
    let escalator = RemediationEscalator::new(
        config.escalation_policy(),
        controller,
        dependencies,
        prober.clone(),
    );
    let store = Arc::new(FileStateStore::new(config.state_dir()));

    let mut supervision = SupervisionLoop::new(
        services,
        config.interval(),
        prober,
        escalator,
        build_dispatcher(config),
        store,
    );

    match build_gap_detector(config) {
        Some(detector) => {
            info!(
                "Gap detection enabled (threshold {}s)",
                config.gap.threshold_secs
            );
            supervision = supervision.with_gap_detector(detector);
        }
        None => info!("Gap detection disabled"),
    }

    supervision
}
