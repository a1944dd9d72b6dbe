//! Supervision loop
//!
//! Probes every configured service once per cycle, drives the per-service
//! state machine and hands failed services to the escalator and the alert
//! dispatcher. Services are processed strictly one after another in config
//! order; one service's trouble never affects another's handling.

use super::clock::{Clock, SystemClock};
use super::shutdown::ShutdownToken;
use crate::alert::{AlertDecision, AlertDispatcher};
use crate::domain::{ServiceDescriptor, ServiceState, ServiceStatus, Transition};
use crate::gap::{Freshness, GapDetector};
use crate::probe::LivenessProber;
use crate::remediation::{RemediationEscalator, RemediationOutcome, Tier};
use crate::state::StateStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Observable supervision events
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisionEvent {
    /// Service status changed
    StatusChanged {
        service: String,
        from: ServiceStatus,
        to: ServiceStatus,
    },
    /// A remediation tier ran
    RemediationAttempted {
        service: String,
        tier: Tier,
        attempt: u32,
        recovered: bool,
    },
    /// No tier left in this failure episode
    RemediationExhausted { service: String, attempts: u32 },
    /// Alert dispatched
    AlertSent {
        service: String,
        downtime: Duration,
    },
    /// Recovered service has a data gap
    GapDetected {
        service: String,
        gap: Option<Duration>,
    },
    /// A full pass over all services finished
    CycleCompleted { cycle: u64, elapsed: Duration },
}

/// Sequential supervision loop over a fixed service list
pub struct SupervisionLoop {
    services: Vec<ServiceDescriptor>,
    states: HashMap<String, ServiceState>,
    interval: Duration,
    prober: Arc<dyn LivenessProber>,
    escalator: RemediationEscalator,
    alerts: AlertDispatcher,
    gap_detector: Option<GapDetector>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<SupervisionEvent>,
    cycles: u64,
}

impl SupervisionLoop {
    pub fn new(
        services: Vec<ServiceDescriptor>,
        interval: Duration,
        prober: Arc<dyn LivenessProber>,
        escalator: RemediationEscalator,
        alerts: AlertDispatcher,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            services,
            states: HashMap::new(),
            interval,
            prober,
            escalator,
            alerts,
            gap_detector: None,
            store,
            clock: Arc::new(SystemClock),
            event_tx,
            cycles: 0,
        }
    }

    pub fn with_gap_detector(mut self, detector: GapDetector) -> Self {
        self.gap_detector = Some(detector);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribe to supervision events
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisionEvent> {
        self.event_tx.subscribe()
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// In-memory state of a service, once it has been processed
    pub fn state(&self, service_id: &str) -> Option<&ServiceState> {
        self.states.get(service_id)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until shutdown is requested
    pub async fn run(&mut self, mut token: ShutdownToken) {
        info!(
            "Supervision loop started: {} services, interval {}s",
            self.services.len(),
            self.interval.as_secs()
        );

        while !token.is_requested() {
            let started = Instant::now();
            self.run_cycle(&token).await;

            let wait = self.interval.saturating_sub(started.elapsed());
            debug!("Next cycle in {}s", wait.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = token.cancelled() => {}
            }
        }

        info!("Supervision loop stopped after {} cycles", self.cycles);
    }

    /// One pass over every service. Stops early between services on shutdown.
    pub async fn run_cycle(&mut self, token: &ShutdownToken) {
        let started = Instant::now();
        self.cycles += 1;
        debug!("Cycle #{} started", self.cycles);

        for index in 0..self.services.len() {
            if token.is_requested() {
                info!("Shutdown requested, ending cycle early");
                return;
            }
            let service = self.services[index].clone();
            self.process_service(&service).await;
        }

        let elapsed = started.elapsed();
        debug!("Cycle #{} completed in {:?}", self.cycles, elapsed);
        self.emit(SupervisionEvent::CycleCompleted {
            cycle: self.cycles,
            elapsed,
        });
    }

    async fn process_service(&mut self, service: &ServiceDescriptor) {
        // Earlier services may have spent a while in remediation
        let now = self.clock.now();
        let mut state = match self.states.remove(&service.id) {
            Some(state) => state,
            None => self.restore(&service.id, now).await,
        };

        let liveness = self.prober.probe(service).await;
        let previous = state.status();
        let transition = if liveness.is_alive() {
            state.observe_alive()
        } else {
            state.observe_dead(now)
        };
        self.emit_status_change(&service.id, previous, state.status());

        match transition {
            Transition::Recovered => {
                info!(service = %service.id, "Service recovered");
                self.check_gap(service, now).await;
            }
            Transition::Failed => {
                error!(service = %service.id, "Service is down ({})", service.check);
                self.handle_failed(service, &mut state, now).await;
            }
            Transition::StillFailed => {
                self.handle_failed(service, &mut state, now).await;
            }
            Transition::Started => {
                info!(service = %service.id, "Service is running");
            }
            Transition::StillRunning => {
                debug!(service = %service.id, "Service is running");
            }
        }

        if let Err(e) = self.store.save(&service.id, &state).await {
            error!(service = %service.id, "Failed to persist state: {}", e);
        }
        self.states.insert(service.id.clone(), state);
    }

    async fn handle_failed(
        &self,
        service: &ServiceDescriptor,
        state: &mut ServiceState,
        now: DateTime<Utc>,
    ) {
        let outcome = self.escalator.remediate(service, state, now).await;
        // Settle waits may have passed since the probe
        let now = self.clock.now();

        match outcome {
            RemediationOutcome::Attempted {
                tier,
                attempt,
                recovered,
            } => {
                self.emit(SupervisionEvent::RemediationAttempted {
                    service: service.id.clone(),
                    tier,
                    attempt,
                    recovered,
                });
                if recovered {
                    self.emit_status_change(&service.id, ServiceStatus::Failed, state.status());
                    self.check_gap(service, now).await;
                    return;
                }
            }
            RemediationOutcome::Exhausted { attempts } => {
                self.emit(SupervisionEvent::RemediationExhausted {
                    service: service.id.clone(),
                    attempts,
                });
            }
            RemediationOutcome::NotFailed => return,
        }

        if self.alerts.maybe_alert(service, state, now).await == AlertDecision::Sent {
            self.emit(SupervisionEvent::AlertSent {
                service: service.id.clone(),
                downtime: state.failure_duration(now).unwrap_or(Duration::ZERO),
            });
        }
    }

    async fn check_gap(&self, service: &ServiceDescriptor, now: DateTime<Utc>) {
        let (Some(detector), Some(freshness)) = (&self.gap_detector, &service.freshness) else {
            return;
        };

        if let Freshness::Stale { gap } = detector.check_freshness(&service.id, freshness, now).await
        {
            self.emit(SupervisionEvent::GapDetected {
                service: service.id.clone(),
                gap,
            });
        }
    }

    async fn restore(&self, service_id: &str, now: DateTime<Utc>) -> ServiceState {
        match self.store.load(service_id).await {
            Ok(Some(state)) => {
                debug!(service = %service_id, "Restored state: {}", state.status());
                state.normalized(now)
            }
            Ok(None) => ServiceState::new(),
            Err(e) => {
                warn!(service = %service_id, "Could not restore state, starting fresh: {}", e);
                ServiceState::new()
            }
        }
    }

    fn emit_status_change(&self, service_id: &str, from: ServiceStatus, to: ServiceStatus) {
        if from != to {
            self.emit(SupervisionEvent::StatusChanged {
                service: service_id.to_string(),
                from,
                to,
            });
        }
    }

    fn emit(&self, event: SupervisionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
