//! Cancellable execution of a single external command.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::command::{CommandLine, ExecOptions};
use crate::error::{ProcessError, Result};

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code (always 0 for a returned result).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,
}

fn build(command: &CommandLine, options: &ExecOptions) -> Command {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args).kill_on_drop(true);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }
    cmd
}

/// Execute a command to completion.
///
/// - Fails fast with [`ProcessError::Cancelled`] if the token is already
///   cancelled; nothing is spawned.
/// - If the token is cancelled while the child runs, the child is killed and
///   the call returns `Cancelled`, never a non-zero exit.
/// - A non-zero exit returns [`ProcessError::Command`] with captured stderr.
pub async fn execute(command: &CommandLine, options: &ExecOptions) -> Result<ExecutionResult> {
    if options.signal.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let start = Instant::now();
    let shown = command.to_string();
    debug!(command = %shown, cwd = ?options.cwd, "Executing command");

    let mut child = build(command, options)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: shown.clone(),
            source,
        })?;

    let stdout = tokio::spawn(capture(child.stdout.take(), options.verbose, false));
    let stderr = tokio::spawn(capture(child.stderr.take(), options.verbose, true));

    let waited = tokio::select! {
        biased;
        _ = options.signal.cancelled() => None,
        status = child.wait() => Some(status),
    };

    let status = match waited {
        Some(status) => status?,
        None => {
            debug!(command = %shown, "Cancellation observed, killing child");
            let _ = child.kill().await;
            stdout.abort();
            stderr.abort();
            return Err(ProcessError::Cancelled);
        }
    };

    let stdout = stdout.await.unwrap_or_default();
    let stderr = stderr.await.unwrap_or_default();

    // A child that finished while the run was being cancelled still reports
    // cancellation.
    if options.signal.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let exit_code = status.code().unwrap_or(-1);
    debug!(
        command = %shown,
        exit_code,
        duration_ms = start.elapsed().as_millis() as u64,
        "Command finished"
    );

    if !status.success() {
        return Err(ProcessError::Command {
            command: shown,
            exit_code,
            stderr,
        });
    }

    Ok(ExecutionResult {
        exit_code,
        stdout,
        stderr,
    })
}

/// Spawn a long-running command without waiting for it.
///
/// Output is inherited when `verbose` is set and discarded otherwise. The
/// caller owns the returned child; register it with the lifecycle manager so
/// it is stopped on termination.
pub fn spawn(command: &CommandLine, options: &ExecOptions) -> Result<Child> {
    if options.signal.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let (out, err) = if options.verbose {
        (Stdio::inherit(), Stdio::inherit())
    } else {
        (Stdio::null(), Stdio::null())
    };

    debug!(command = %command, cwd = ?options.cwd, "Spawning command");
    build(command, options)
        .stdin(Stdio::null())
        .stdout(out)
        .stderr(err)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        })
}

async fn capture<R>(reader: Option<R>, echo: bool, is_stderr: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    // Read raw bytes: output is not guaranteed to be UTF-8, and the pipe must
    // be drained to EOF or the child can die of SIGPIPE.
    let mut captured = String::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "Stopped reading command output");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if echo {
            if is_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
        captured.push_str(line);
        captured.push('\n');
    }
    captured
}
