//! Fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil::alert::{AlertDispatcher, AlertPolicy, Mailer, SoundPlayer};
use vigil::control::ServiceController;
use vigil::domain::{
    ControlSpec, DependencyTag, FreshnessRef, LivenessCheck, ServiceDescriptor, ServiceState,
};
use vigil::error::{
    AlertDeliveryError, CommandError, ControlError, DependencyError, GapError, PersistenceError,
};
use vigil::gap::{FreshnessSource, GapDetector};
use vigil::probe::{Liveness, LivenessProber};
use vigil::remediation::{Dependency, DependencyRemediator, EscalationPolicy, RemediationEscalator};
use vigil::state::{FileStateStore, StateStore};
use vigil::supervisor::{Clock, ShutdownToken, SupervisionLoop};

/// When a restart brings a dead service back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revive {
    Never,
    OnRestart,
    AfterDependency(Dependency),
}

/// Scripted environment: liveness per service plus a log of every action
#[derive(Default)]
pub struct World {
    alive: Mutex<HashMap<String, bool>>,
    revive: Mutex<HashMap<String, Revive>>,
    restarts: Mutex<Vec<String>>,
    dependency_restarts: Mutex<Vec<Dependency>>,
    dependency_failures: Mutex<Vec<Dependency>>,
    failing_control: Mutex<HashSet<String>>,
    failing_dependencies: AtomicBool,
    restart_cost: Mutex<Option<(Arc<ManualClock>, ChronoDuration)>>,
    probes: AtomicUsize,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_alive(&self, service: &str, alive: bool) {
        self.alive
            .lock()
            .unwrap()
            .insert(service.to_string(), alive);
    }

    pub fn set_revive(&self, service: &str, revive: Revive) {
        self.revive
            .lock()
            .unwrap()
            .insert(service.to_string(), revive);
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().unwrap().clone()
    }

    pub fn restart_count(&self, service: &str) -> usize {
        self.restarts
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == service)
            .count()
    }

    pub fn dependency_restarts(&self) -> Vec<Dependency> {
        self.dependency_restarts.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Start and stop of `service` exit non-zero from now on
    pub fn fail_control(&self, service: &str) {
        self.failing_control
            .lock()
            .unwrap()
            .insert(service.to_string());
    }

    /// Every dependency restart fails from now on
    pub fn fail_dependencies(&self) {
        self.failing_dependencies.store(true, Ordering::SeqCst);
    }

    pub fn dependency_failures(&self) -> Vec<Dependency> {
        self.dependency_failures.lock().unwrap().clone()
    }

    /// Each service start moves `clock` forward by `secs`
    pub fn charge_restarts(&self, clock: &Arc<ManualClock>, secs: i64) {
        *self.restart_cost.lock().unwrap() = Some((clock.clone(), ChronoDuration::seconds(secs)));
    }

    fn control_fails(&self, service: &str) -> bool {
        self.failing_control.lock().unwrap().contains(service)
    }
}

fn exit_failure(program: &str) -> CommandError {
    CommandError::NonZeroExit {
        program: program.to_string(),
        status: "exit status: 1".into(),
        stderr: "service not found".into(),
    }
}

#[async_trait]
impl LivenessProber for World {
    async fn probe(&self, service: &ServiceDescriptor) -> Liveness {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let alive = self
            .alive
            .lock()
            .unwrap()
            .get(&service.id)
            .copied()
            .unwrap_or(false);
        Liveness::from(alive)
    }
}

#[async_trait]
impl ServiceController for World {
    async fn start(&self, service: &ServiceDescriptor) -> Result<(), ControlError> {
        self.restarts.lock().unwrap().push(service.id.clone());
        if let Some((clock, cost)) = self.restart_cost.lock().unwrap().as_ref() {
            clock.advance(*cost);
        }
        if self.control_fails(&service.id) {
            return Err(ControlError::Command(exit_failure("launchctl")));
        }

        let revive = self
            .revive
            .lock()
            .unwrap()
            .get(&service.id)
            .copied()
            .unwrap_or(Revive::Never);
        let comes_back = match revive {
            Revive::Never => false,
            Revive::OnRestart => true,
            Revive::AfterDependency(dep) => self.dependency_restarts.lock().unwrap().contains(&dep),
        };
        if comes_back {
            self.set_alive(&service.id, true);
        }
        Ok(())
    }

    async fn stop(&self, service: &ServiceDescriptor) -> Result<(), ControlError> {
        if self.control_fails(&service.id) {
            return Err(ControlError::Command(exit_failure("launchctl")));
        }
        Ok(())
    }
}

#[async_trait]
impl DependencyRemediator for World {
    async fn restart(&self, dependency: Dependency) -> Result<(), DependencyError> {
        if self.failing_dependencies.load(Ordering::SeqCst) {
            self.dependency_failures.lock().unwrap().push(dependency);
            return Err(DependencyError::Command {
                dependency: format!("{:?}", dependency),
                source: exit_failure("tunnelctl"),
            });
        }
        self.dependency_restarts.lock().unwrap().push(dependency);
        Ok(())
    }
}

/// Sound and mail channels that record what they were asked to send
#[derive(Default)]
pub struct Outbox {
    pub sounds: Mutex<Vec<String>>,
    pub mails: Mutex<Vec<String>>,
}

impl Outbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alert_count(&self) -> usize {
        self.mails.lock().unwrap().len()
    }
}

pub struct OutboxSound(pub Arc<Outbox>);

#[async_trait]
impl SoundPlayer for OutboxSound {
    async fn play(&self, message: &str) -> Result<(), AlertDeliveryError> {
        self.0.sounds.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

pub struct OutboxMailer(pub Arc<Outbox>);

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, subject: &str, _body: &str) -> Result<(), AlertDeliveryError> {
        self.0.mails.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

/// Freshness source reporting a fixed latest timestamp
pub struct FixedFreshness {
    pub latest: Option<DateTime<Utc>>,
    pub queries: Arc<AtomicUsize>,
}

#[async_trait]
impl FreshnessSource for FixedFreshness {
    async fn latest_timestamp(
        &self,
        _table: &str,
        _column: &str,
    ) -> Result<Option<DateTime<Utc>>, GapError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.latest)
    }
}

/// File store whose writes can be switched off
pub struct FlakyStore {
    inner: FileStateStore,
    failing: AtomicBool,
    failed_saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: FileStateStore::new(dir),
            failing: AtomicBool::new(false),
            failed_saves: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn failed_saves(&self) -> usize {
        self.failed_saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load(&self, service_id: &str) -> Result<Option<ServiceState>, PersistenceError> {
        self.inner.load(service_id).await
    }

    async fn save(&self, service_id: &str, state: &ServiceState) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(PersistenceError::Io {
                path: self.inner.path_for(service_id),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.save(service_id, state).await
    }
}

/// Clock set by the test
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Supervision loop driven by a manual clock
pub struct Harness {
    supervision: SupervisionLoop,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Set the clock to `now` and run one cycle
    pub async fn run_cycle(&mut self, now: DateTime<Utc>, token: &ShutdownToken) {
        self.clock.set(now);
        self.supervision.run_cycle(token).await;
    }

    pub fn with_gap_detector(self, detector: GapDetector) -> Self {
        Self {
            supervision: self.supervision.with_gap_detector(detector),
            clock: self.clock,
        }
    }
}

impl Deref for Harness {
    type Target = SupervisionLoop;

    fn deref(&self) -> &SupervisionLoop {
        &self.supervision
    }
}

impl DerefMut for Harness {
    fn deref_mut(&mut self) -> &mut SupervisionLoop {
        &mut self.supervision
    }
}

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + ChronoDuration::seconds(secs)
}

pub fn port_service(id: &str) -> ServiceDescriptor {
    ServiceDescriptor {
        id: id.to_string(),
        description: None,
        check: LivenessCheck::Port {
            port: 9100,
            host: "127.0.0.1".into(),
        },
        control: ControlSpec::Managed {
            start: vec!["true".into()],
            stop: Some(vec!["true".into()]),
        },
        tags: vec![],
        freshness: None,
    }
}

pub fn network_service(id: &str) -> ServiceDescriptor {
    ServiceDescriptor {
        tags: vec![DependencyTag::NetworkDependent],
        ..port_service(id)
    }
}

pub fn fresh_service(id: &str, table: &str) -> ServiceDescriptor {
    ServiceDescriptor {
        freshness: Some(FreshnessRef {
            table: table.to_string(),
            timestamp_column: "ts".into(),
        }),
        ..port_service(id)
    }
}

/// Default ladder with no settle waits
pub fn fast_policy() -> EscalationPolicy {
    EscalationPolicy {
        dependency_settle: Duration::ZERO,
        restart_settle: Duration::ZERO,
        ..EscalationPolicy::default()
    }
}

/// Loop over `services` wired to `world` and `outbox`, storing state under `dir`
pub fn build_loop(
    world: &Arc<World>,
    outbox: &Arc<Outbox>,
    services: Vec<ServiceDescriptor>,
    dir: &Path,
) -> Harness {
    build_loop_with_store(world, outbox, services, Arc::new(FileStateStore::new(dir)))
}

pub fn build_loop_with_store(
    world: &Arc<World>,
    outbox: &Arc<Outbox>,
    services: Vec<ServiceDescriptor>,
    store: Arc<dyn StateStore>,
) -> Harness {
    let escalator =
        RemediationEscalator::new(fast_policy(), world.clone(), world.clone(), world.clone());
    let alerts = AlertDispatcher::new(
        AlertPolicy::default(),
        Arc::new(OutboxSound(outbox.clone())),
        Some(Arc::new(OutboxMailer(outbox.clone()))),
    );
    let clock = ManualClock::new(t0());
    let supervision = SupervisionLoop::new(
        services,
        Duration::from_secs(300),
        world.clone(),
        escalator,
        alerts,
        store,
    )
    .with_clock(clock.clone());
    Harness { supervision, clock }
}
