//! Bounded subprocess execution with captured output.
//!
//! Children that outlive their time limit are interrupted (SIGINT), given a
//! grace period, then killed. The child is always reaped.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::utils::error::{LintError, Result};

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// 超時後先送 SIGINT，等待此時間再強制終止
const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was killed (timeout or signal).
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run a command to completion, capturing stdout and stderr.
///
/// Output is drained concurrently with the wait so a chatty child can never
/// block on a full pipe. On timeout the child is terminated and whatever
/// output was captured so far is returned with `timed_out` set.
pub async fn run_command(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    cwd: Option<&Path>,
    time_limit: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!("Spawning subprocess: {} {}", program, args.join(" "));

    let mut child = cmd.spawn().map_err(|e| LintError::ProcessError {
        command: program.to_string(),
        message: e.to_string(),
    })?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| LintError::ProcessError {
        command: program.to_string(),
        message: "stdout pipe missing".to_string(),
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| LintError::ProcessError {
        command: program.to_string(),
        message: "stderr pipe missing".to_string(),
    })?;

    let mut stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let mut stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let (exit_code, timed_out) = match timed_wait(&mut child, time_limit).await? {
        Some(status) => (status.code(), false),
        None => {
            tracing::warn!(
                "Subprocess '{}' exceeded {:?}, terminating",
                program,
                time_limit
            );
            let status = interrupt_then_kill(&mut child, INTERRUPT_GRACE).await?;
            (status.code(), true)
        }
    };

    // 被終止的 child 可能留下孤兒持有管線，讀取必須設限
    let (stdout, stderr) = if timed_out {
        let stdout = match timeout(Duration::from_secs(1), &mut stdout_task).await {
            Ok(buf) => buf.unwrap_or_default(),
            Err(_) => {
                stdout_task.abort();
                Vec::new()
            }
        };
        let stderr = match timeout(Duration::from_secs(1), &mut stderr_task).await {
            Ok(buf) => buf.unwrap_or_default(),
            Err(_) => {
                stderr_task.abort();
                Vec::new()
            }
        };
        (stdout, stderr)
    } else {
        (
            stdout_task.await.unwrap_or_default(),
            stderr_task.await.unwrap_or_default(),
        )
    };

    Ok(CommandOutput {
        exit_code,
        timed_out,
        stdout,
        stderr,
    })
}

/// Wait for the child up to `dur`. Returns `None` when it is still running.
pub async fn timed_wait(child: &mut Child, dur: Duration) -> Result<Option<ExitStatus>> {
    match timeout(dur, child.wait()).await {
        Ok(status) => Ok(Some(status?)),
        Err(_) => Ok(None),
    }
}

/// Interrupt the child, wait out the grace period, then kill it.
#[cfg(unix)]
pub async fn interrupt_then_kill(child: &mut Child, grace: Duration) -> Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // 已結束，只需回收
        return Ok(child.wait().await?);
    };

    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(child.wait().await?);
        }
        return Err(LintError::ProcessError {
            command: format!("pid {}", pid),
            message: format!("failed to send SIGINT: {}", e),
        });
    }

    if let Ok(status) = timeout(grace, child.wait()).await {
        return Ok(status?);
    }

    // 寬限期內沒有退出，強制終止
    child.kill().await?;
    Ok(child.wait().await?)
}

#[cfg(not(unix))]
pub async fn interrupt_then_kill(child: &mut Child, _grace: Duration) -> Result<ExitStatus> {
    child.kill().await?;
    Ok(child.wait().await?)
}
