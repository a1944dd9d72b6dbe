//! Process utilities
//!
//! Bounded external command execution, PID file handling and signal delivery.
//! Every call into an OS tool made by the supervisor goes through here so that
//! no single hung tool can stall the loop.

use crate::error::CommandError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `argv` to completion within `timeout`, optionally feeding `stdin`.
///
/// A non-zero exit status is an error. The child is killed if the timeout
/// elapses.
pub async fn run_command(
    argv: &[String],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Arguments may carry credentials; log the program only
    debug!("Running command: {} ({} args)", program, args.len());

    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input)
                .await
                .map_err(|source| CommandError::Io {
                    program: program.clone(),
                    source,
                })?;
            // Close stdin so the child sees EOF
            drop(pipe);
        }
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| CommandError::Io {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            return Err(CommandError::Timeout {
                program: program.clone(),
                timeout_secs: timeout.as_secs(),
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        return Err(CommandError::NonZeroExit {
            program: program.clone(),
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Parse the content of a PID file
pub fn parse_pid(content: &str) -> Option<u32> {
    content.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

/// Read a PID file. `Ok(None)` when the file does not exist.
/// `Ok(Some(None))` when it exists but holds no valid PID.
pub fn read_pid_file(path: &Path) -> std::io::Result<Option<Option<u32>>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(parse_pid(&content))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write `pid` to `path` atomically (temp file + rename)
pub fn write_pid_file(path: &Path, pid: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("pid.tmp");
    std::fs::write(&tmp, format!("{}\n", pid))?;
    std::fs::rename(&tmp, path)
}

/// Remove a PID file, ignoring a missing file
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove PID file {}: {}", path.display(), e);
        }
    }
}

/// Check whether `pid` identifies a live process
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but belongs to another user
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    // On non-Unix, just assume it's running if PID file exists
    true
}

/// Outcome of a terminate request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Process was not running
    NotRunning,
    /// Exited after SIGTERM
    Graceful,
    /// Needed SIGKILL
    Forced,
}

/// Send SIGTERM, wait up to `grace`, then SIGKILL.
/// With `force` SIGKILL is sent straight away.
#[cfg(unix)]
pub async fn terminate(pid: u32, grace: Duration, force: bool) -> Result<Termination, String> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| format!("PID {} out of range", pid))?;
    let target = Pid::from_raw(raw);

    if !is_process_alive(pid) {
        return Ok(Termination::NotRunning);
    }

    if !force {
        match kill(target, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(Termination::NotRunning),
            Err(e) => return Err(format!("SIGTERM failed: {}", e)),
        }

        let poll = Duration::from_millis(200);
        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !is_process_alive(pid) {
                return Ok(Termination::Graceful);
            }
            tokio::time::sleep(poll).await;
        }

        warn!("PID {} still alive after {:?}, sending SIGKILL", pid, grace);
    }

    match kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(Termination::Forced),
        Err(e) => Err(format!("SIGKILL failed: {}", e)),
    }
}

#[cfg(not(unix))]
pub async fn terminate(pid: u32, _grace: Duration, _force: bool) -> Result<Termination, String> {
    Err(format!(
        "Signal handling not supported on this platform; kill PID {} manually",
        pid
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("1234\n"), Some(1234));
        assert_eq!(parse_pid("  42 "), Some(42));
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("abc"), None);
        assert_eq!(parse_pid(""), None);
    }

    #[test]
    fn test_pid_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("svc.pid");

        assert!(read_pid_file(&path).unwrap().is_none());
        write_pid_file(&path, 4321).unwrap();
        assert_eq!(read_pid_file(&path).unwrap(), Some(Some(4321)));

        remove_pid_file(&path);
        assert!(!path.exists());
        // Removing twice is harmless
        remove_pid_file(&path);
    }

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_unused_pid_is_dead() {
        // Above the kernel's pid_max ceiling
        assert!(!is_process_alive(999_999_999));
    }

    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let out = run_command(&argv(&["echo", "hello"]), None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_command_feeds_stdin() {
        let out = run_command(&argv(&["cat"]), Some(b"piped"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "piped");
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit() {
        let err = run_command(&argv(&["false"]), None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let err = run_command(&argv(&["sleep", "5"]), None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_command_empty() {
        let err = run_command(&[], None, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CommandError::Empty));
    }
}
