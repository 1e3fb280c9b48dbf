//! Hook command execution with template variable substitution.
//!
//! Ported from this workspace's synchronous hook runner to `tokio::process`
//! so it can be awaited from the Supervisor without blocking a worker
//! thread; the escaping, substitution, and process-group-kill-on-timeout
//! behavior is unchanged.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;

/// Escape a string for safe shell usage by wrapping in single quotes.
///
/// Internal single quotes are escaped as `'\''` (end quote, escaped quote,
/// start quote).
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Substitute template variables in a command string using single-pass
/// parsing. Variables are specified as `{key}` and replaced with
/// shell-escaped values. Unrecognized placeholders are left as-is.
/// Already-substituted content is never re-scanned, preventing
/// double-substitution attacks.
pub fn substitute_variables(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '{' {
            let mut key = String::new();
            let mut found_close = false;
            for inner_ch in chars.by_ref() {
                if inner_ch == '}' {
                    found_close = true;
                    break;
                }
                key.push(inner_ch);
            }
            if found_close {
                if let Some(value) = variables.get(&key) {
                    result.push_str(&shell_escape(value));
                } else {
                    result.push('{');
                    result.push_str(&key);
                    result.push('}');
                }
            } else {
                result.push('{');
                result.push_str(&key);
            }
        } else {
            result.push(ch);
        }
    }
    result
}

#[derive(Debug, Clone)]
pub enum HookFailure {
    SpawnFailed(String),
    NonZeroExit(i32),
    TimedOut(u64),
}

impl std::fmt::Display for HookFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookFailure::SpawnFailed(e) => write!(f, "failed to spawn hook: {e}"),
            HookFailure::NonZeroExit(code) => write!(f, "hook exited with code {code}"),
            HookFailure::TimedOut(secs) => write!(f, "hook timed out after {secs}s"),
        }
    }
}

/// Run a single hook command to completion or timeout.
///
/// Spawns via `sh -c` in its own process group so a timeout can kill the
/// whole group rather than orphaning children the hook script spawned.
/// stdout/stderr are captured, not forwarded to the client (spec §4.5: "a
/// hook's stderr is captured into structured logs but not forwarded to the
/// client").
pub async fn run_hook(
    command_template: &str,
    timeout_secs: u64,
    variables: &HashMap<String, String>,
) -> Result<(), HookFailure> {
    let expanded_command = substitute_variables(command_template, variables);

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&expanded_command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| HookFailure::SpawnFailed(e.to_string()))?;

    let timeout = Duration::from_secs(timeout_secs);
    let start = Instant::now();

    loop {
        match child.try_wait().map_err(|e| HookFailure::SpawnFailed(e.to_string()))? {
            Some(status) => {
                if status.success() {
                    tracing::debug!(command = %expanded_command, "hook completed successfully");
                    return Ok(());
                }
                let exit_code = status.code().unwrap_or(-1);
                tracing::warn!(command = %expanded_command, exit_code, "hook exited non-zero");
                return Err(HookFailure::NonZeroExit(exit_code));
            }
            None => {
                if start.elapsed() >= timeout {
                    #[cfg(unix)]
                    {
                        // SAFETY: kill() is async-signal-safe; negative PID
                        // targets the whole process group created above.
                        if let Some(pid) = child.id() {
                            unsafe {
                                libc::kill(-(pid as i32), libc::SIGKILL);
                            }
                        }
                    }
                    #[cfg(not(unix))]
                    {
                        let _ = child.start_kill();
                    }
                    let _ = child.wait().await;
                    tracing::warn!(command = %expanded_command, timeout_secs, "hook timed out");
                    return Err(HookFailure::TimedOut(timeout_secs));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
