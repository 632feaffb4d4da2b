use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Hard ceiling on a single subprocess invocation.
pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-stream output capture bound. Truncation beyond this is not fatal.
const MAX_CAPTURED_BYTES: usize = 10 * 1024 * 1024;

/// Send `SIGKILL` to the process group rooted at `pid` (each child is
/// spawned as its own group leader via `process_group(0)`). A negative pid
/// targets the whole group rather than just the leader, so helper processes
/// forked by GUI-library-backed converters die with their parent.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Successful subprocess output, captured and possibly truncated.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Failure from running a subprocess: either it exited non-zero or it was
/// killed for exceeding the hard timeout. The two are kept distinguishable
/// so callers can map them to different error codes.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command `{command}` timed out after {timeout_secs}s")]
    TimedOut { command: String, timeout_secs: u64 },

    #[error("command `{command}` exited with status {status}: {message}")]
    NonZeroExit {
        command: String,
        status: i32,
        message: String,
    },

    #[error("failed to spawn command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::TimedOut { .. })
    }
}

/// Runs external commands (geometry converters, the slicer binary) with a
/// hard timeout, bounded output capture, and debug command-echoing gated by
/// configuration.
pub struct SubprocessRunner {
    debug_command_logs: bool,
    timeout: Duration,
}

impl SubprocessRunner {
    pub fn new(debug_command_logs: bool, timeout: Duration) -> Self {
        Self {
            debug_command_logs,
            timeout,
        }
    }

    /// Run `program` with `args`, optionally in `working_dir`.
    ///
    /// The child is spawned as the leader of its own process group (Unix).
    /// Slicer/converter binaries can be backed by GUI libraries that fork
    /// helper processes; on timeout we signal the whole group, not just the
    /// leader, so none of those helpers are left orphaned.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        working_dir: Option<&Path>,
    ) -> Result<CommandOutput, RunnerError> {
        let command_line = format!("{program} {}", args.join(" "));
        if self.debug_command_logs {
            debug!(command = %command_line, "invoking subprocess");
        }

        let mut command = Command::new(program);
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        let pid = child.id();

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(out) = stdout_handle.as_mut() {
                let _ = out
                    .take(MAX_CAPTURED_BYTES as u64)
                    .read_to_end(&mut buf)
                    .await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(err) = stderr_handle.as_mut() {
                let _ = err
                    .take(MAX_CAPTURED_BYTES as u64)
                    .read_to_end(&mut buf)
                    .await;
            }
            buf
        });

        match timeout(self.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| RunnerError::Spawn {
                    command: command_line.clone(),
                    source,
                })?;

                let stdout_buf = stdout_task.await.unwrap_or_default();
                let stderr_buf = stderr_task.await.unwrap_or_default();
                let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
                let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();

                if status.success() {
                    Ok(CommandOutput { stdout, stderr })
                } else {
                    let message = if stderr.trim().is_empty() {
                        stdout.clone()
                    } else {
                        stderr.clone()
                    };
                    Err(RunnerError::NonZeroExit {
                        command: command_line,
                        status: status.code().unwrap_or(-1),
                        message,
                    })
                }
            }
            Err(_) => {
                kill_process_group(pid);
                let _ = child.kill().await;
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                Err(RunnerError::TimedOut {
                    command: command_line,
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let runner = SubprocessRunner::new(false, Duration::from_secs(5));
        let output = runner.run("echo", &["hello"], None).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn surfaces_non_zero_exit() {
        let runner = SubprocessRunner::new(false, Duration::from_secs(5));
        let result = runner.run("false", &[], None).await;
        assert!(matches!(result, Err(RunnerError::NonZeroExit { .. })));
    }

    #[tokio::test]
    async fn times_out_long_running_commands() {
        let runner = SubprocessRunner::new(false, Duration::from_millis(50));
        let result = runner.run("sleep", &["5"], None).await;
        assert!(matches!(result, Err(RunnerError::TimedOut { .. })));
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn rejects_unknown_binary() {
        let runner = SubprocessRunner::new(false, Duration::from_secs(5));
        let result = runner
            .run("definitely-not-a-real-binary", &[], None)
            .await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }
}
