#![cfg(unix)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vigil::alert::{AlertDispatcher, AlertPolicy, SoundPlayer};
use vigil::control::{ServiceController, SystemController};
use vigil::domain::{ControlSpec, LivenessCheck, ServiceDescriptor, ServiceStatus};
use vigil::error::{AlertDeliveryError, VigilError};
use vigil::probe::{Liveness, LivenessProber, SystemProber};
use vigil::process::{is_process_alive, read_pid_file};
use vigil::remediation::{CommandDependencyRemediator, EscalationPolicy, RemediationEscalator};
use vigil::state::{read_instance, FileStateStore, InstanceGuard};
use vigil::supervisor::{Shutdown, SupervisionLoop};

struct Silent;

#[async_trait]
impl SoundPlayer for Silent {
    async fn play(&self, _message: &str) -> Result<(), AlertDeliveryError> {
        Ok(())
    }
}

fn sleeper(pid_file: &Path) -> ServiceDescriptor {
    ServiceDescriptor {
        id: "sleeper".into(),
        description: Some("Detached test process".into()),
        check: LivenessCheck::PidFile {
            path: pid_file.to_path_buf(),
        },
        control: ControlSpec::BareProcess {
            command: vec!["sleep".into(), "30".into()],
            pid_file: pid_file.to_path_buf(),
            log_file: None,
            working_dir: None,
        },
        tags: vec![],
        freshness: None,
    }
}

fn prober() -> Arc<SystemProber> {
    Arc::new(SystemProber::new(
        vec!["true".into()],
        Duration::from_secs(5),
    ))
}

#[tokio::test]
async fn test_stale_pid_file_is_dead_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("sleeper.pid");
    std::fs::write(&pid_file, "999999999\n").unwrap();

    assert_eq!(prober().probe(&sleeper(&pid_file)).await, Liveness::Dead);
    assert!(!pid_file.exists());
}

#[tokio::test]
async fn test_garbage_pid_file_is_dead_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("sleeper.pid");
    std::fs::write(&pid_file, "not a pid").unwrap();

    assert_eq!(prober().probe(&sleeper(&pid_file)).await, Liveness::Dead);
    assert!(!pid_file.exists());
}

#[tokio::test]
async fn test_loop_relaunches_bare_process_with_stale_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("run").join("sleeper.pid");
    std::fs::create_dir_all(pid_file.parent().unwrap()).unwrap();
    std::fs::write(&pid_file, "999999999\n").unwrap();
    let service = sleeper(&pid_file);

    let prober = prober();
    let controller = Arc::new(SystemController::new(
        Duration::from_secs(5),
        Duration::from_secs(2),
    ));
    let escalator = RemediationEscalator::new(
        EscalationPolicy {
            dependency_settle: Duration::ZERO,
            restart_settle: Duration::from_millis(100),
            ..EscalationPolicy::default()
        },
        controller.clone(),
        Arc::new(CommandDependencyRemediator::new(None, None, Duration::from_secs(5))),
        prober.clone(),
    );
    let alerts = AlertDispatcher::new(AlertPolicy::default(), Arc::new(Silent), None);
    let mut supervision = SupervisionLoop::new(
        vec![service.clone()],
        Duration::from_secs(300),
        prober,
        escalator,
        alerts,
        Arc::new(FileStateStore::new(dir.path().join("state"))),
    );

    let token = Shutdown::new().token();
    supervision.run_cycle(&token).await;

    let state = supervision.state("sleeper").unwrap();
    assert_eq!(state.status(), ServiceStatus::Running);
    assert_eq!(state.restart_attempts(), 0);

    let pid = read_pid_file(&pid_file).unwrap().flatten().unwrap();
    assert_ne!(pid, 999_999_999);
    assert!(is_process_alive(pid));

    controller.stop(&service).await.unwrap();
    assert!(!pid_file.exists());
}

#[test]
fn test_second_instance_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("supervisor.pid");

    let mut guard = InstanceGuard::acquire(&marker).unwrap();
    for _ in 0..3 {
        match InstanceGuard::acquire(&marker) {
            Err(VigilError::AlreadyRunning { pid }) => assert_eq!(pid, guard.pid()),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
    }
    assert_eq!(read_instance(&marker), Some(guard.pid()));

    guard.release();
    assert_eq!(read_instance(&marker), None);
    let again = InstanceGuard::acquire(&marker).unwrap();
    assert_eq!(again.pid(), std::process::id());
}
