//! Process-group lifecycle: spawn, signal, kill-tree.
//!
//! Grounded on this workspace's `spawn_tool_with_pre_exec` (new process
//! group via `setsid` in `pre_exec`, piped stdio, `kill_on_drop`) and
//! `kill_child_process_group` (negative-PID `libc::kill` targeting the
//! whole group). Generalizes the bare kill into the full escalation ladder
//! spec §4.6 requires: `SIGTERM -> grace -> SIGKILL -> reap_timeout`.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SpawnFailed(pub String);

impl std::fmt::Display for SpawnFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to spawn child process: {}", self.0)
    }
}

/// Outcome of the exit/signal resolution (spec §3's `Execution.exit_code` /
/// `signal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

/// Result of [`ProcessHandle::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The group exited before or during the grace period, or after the
    /// kill signal, within `reap_timeout`.
    Reaped(ExitOutcome),
    /// `reap_timeout` elapsed with the group still unaccounted for. The
    /// group is now considered leaked (spec §4.6).
    Leaked,
}

/// Owns a spawned child's lifecycle: waiting, signaling, and the
/// terminate escalation ladder. Does not own the output pipes — those are
/// handed to the Stream Pump at spawn time, per the ownership split in
/// spec §3 ("Each Session exclusively owns its Execution (and through it,
/// its process group, pipes, and output queue)").
pub struct ProcessHandle {
    child: Child,
    pgid: i32,
}

impl ProcessHandle {
    /// Spawn `command` via `sh -c` in a new process group. Returns the
    /// handle plus the stdout/stderr pipes for the Stream Pump to drain.
    /// `stdin` is always closed (spec §4.6).
    pub async fn spawn(
        command: &str,
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<(Self, ChildStdout, ChildStderr), SpawnFailed> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .envs(env);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        // SAFETY: setsid() is async-signal-safe and runs before exec in the
        // child, placing it in a new process group we can signal as a unit.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| SpawnFailed(e.to_string()))?;
        let pgid = child.id().ok_or_else(|| SpawnFailed("child exited before pgid could be read".into()))? as i32;
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        Ok((Self { child, pgid }, stdout, stderr))
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// Resolves when the child terminates.
    pub async fn wait(&mut self) -> ExitOutcome {
        match self.child.wait().await {
            Ok(status) => exit_outcome(status),
            Err(e) => {
                warn!(error = %e, "wait() on child failed");
                ExitOutcome {
                    exit_code: None,
                    signal: None,
                }
            }
        }
    }

    /// Deliver `sig` to the entire process group. Tolerates the group
    /// already having exited (`ESRCH`).
    pub fn signal_group(&self, sig: i32) {
        // SAFETY: kill() is async-signal-safe; negative PID targets the
        // whole process group created by `setsid()` at spawn time.
        let ret = unsafe { libc::kill(-self.pgid, sig) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(pgid = self.pgid, signal = sig, error = %err, "signal_group failed");
            }
        }
    }

    /// Escalation ladder: `SIGTERM` -> wait `grace` -> `SIGKILL` -> wait
    /// `reap_timeout`. Returns [`TerminateOutcome::Leaked`] and emits a
    /// warning if the group is not reaped within `reap_timeout` (spec
    /// §4.6).
    pub async fn terminate(&mut self, grace: Duration, reap_timeout: Duration) -> TerminateOutcome {
        self.signal_group(libc::SIGTERM);

        if let Ok(Ok(status)) = tokio::time::timeout(grace, self.child.wait()).await {
            return TerminateOutcome::Reaped(exit_outcome(status));
        }

        self.signal_group(libc::SIGKILL);

        match tokio::time::timeout(reap_timeout, self.child.wait()).await {
            Ok(Ok(status)) => TerminateOutcome::Reaped(exit_outcome(status)),
            _ => {
                warn!(pgid = self.pgid, "process group not reaped within reap_timeout, considered leaked");
                TerminateOutcome::Leaked
            }
        }
    }
}

#[cfg(unix)]
fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    use std::os::unix::process::ExitStatusExt;
    ExitOutcome {
        exit_code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_outcome(status: std::process::ExitStatus) -> ExitOutcome {
    ExitOutcome {
        exit_code: status.code(),
        signal: None,
    }
}
