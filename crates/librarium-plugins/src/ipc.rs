//! One-shot subprocess IPC: spawn, write one envelope, read one envelope.
//!
//! Each plugin operation is its own process. The child gets the request
//! on stdin (stdin is closed afterwards so `cat`-style plugins
//! terminate), must write its response to stdout, and is killed on
//! timeout or cancellation. stderr is captured and logged, never parsed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::PluginError;

/// Default timeout for `describe`, `poll`, and `test`.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for `retrieve`.
pub const RETRIEVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum timeout for `execute` and `submit`.
pub const MIN_EXECUTE_TIMEOUT: Duration = Duration::from_secs(1);

/// How a plugin child process is started.
#[derive(Clone, Debug)]
pub struct IpcCommand {
    /// Executable to spawn.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment merged over the process environment.
    pub env: BTreeMap<String, String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
}

/// Run one operation: spawn, send `input`, collect stdout.
///
/// The child is killed (not signalled gracefully) when `timeout` elapses
/// or `cancel` fires.
pub async fn run_once(
    command: &IpcCommand,
    operation: &'static str,
    input: &str,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<String, PluginError> {
    let mut cmd = tokio::process::Command::new(&command.command);
    let _ = cmd
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &command.env {
        let _ = cmd.env(key, value);
    }
    if let Some(cwd) = &command.cwd {
        let _ = cmd.current_dir(cwd);
    }

    debug!(command = %command.command, operation, "spawning plugin process");

    let mut child = cmd.spawn().map_err(|e| PluginError::Spawn {
        command: command.command.clone(),
        message: e.to_string(),
    })?;

    // Feed the request and close stdin so the child sees EOF.
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        drop(stdin);
    }

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_handle = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stdout_pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_handle = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            let stdout_bytes = stdout_handle.await.unwrap_or_default();
            let stderr_bytes = stderr_handle.await.unwrap_or_default();

            if !stderr_bytes.is_empty() {
                debug!(
                    command = %command.command,
                    operation,
                    stderr = %String::from_utf8_lossy(&stderr_bytes),
                    "plugin wrote to stderr"
                );
            }
            if !status.success() {
                warn!(
                    command = %command.command,
                    operation,
                    code = status.code().unwrap_or(-1),
                    "plugin exited non-zero"
                );
            }
            Ok(String::from_utf8_lossy(&stdout_bytes).into_owned())
        }
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            stdout_handle.abort();
            stderr_handle.abort();
            warn!(command = %command.command, operation, timeout_ms = timeout.as_millis() as u64, "plugin timed out, killed");
            Err(PluginError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
        () = cancelled => {
            let _ = child.kill().await;
            stdout_handle.abort();
            stderr_handle.abort();
            debug!(command = %command.command, operation, "plugin cancelled, killed");
            Err(PluginError::Cancelled)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sh(script: &str) -> IpcCommand {
        IpcCommand {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn echoes_stdout() {
        let output = run_once(
            &sh("cat >/dev/null; printf '{\"ok\":true}'"),
            "test",
            "{}",
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();
        assert_eq!(output, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn child_sees_request_on_stdin() {
        // The child echoes its stdin back
        let output = run_once(&sh("cat"), "test", r#"{"probe":1}"#, Duration::from_secs(5), None)
            .await
            .unwrap();
        assert!(output.contains(r#"{"probe":1}"#));
    }

    #[tokio::test]
    async fn merged_env_reaches_child() {
        let mut command = sh("cat >/dev/null; printf '%s' \"$PLUGIN_PROBE\"");
        let _ = command.env.insert("PLUGIN_PROBE".into(), "present".into());
        let output = run_once(&command, "test", "{}", Duration::from_secs(5), None)
            .await
            .unwrap();
        assert_eq!(output, "present");
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let error = run_once(
            &sh("sleep 30"),
            "describe",
            "{}",
            Duration::from_millis(100),
            None,
        )
        .await
        .unwrap_err();
        assert_matches!(
            error,
            PluginError::Timeout { operation: "describe", timeout_ms: 100 }
        );
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let token = CancellationToken::new();
        let child_token = token.clone();
        let handle = tokio::spawn(async move {
            run_once(
                &sh("sleep 30"),
                "execute",
                "{}",
                Duration::from_secs(30),
                Some(&child_token),
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let error = handle.await.unwrap().unwrap_err();
        assert_matches!(error, PluginError::Cancelled);
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_error() {
        let command = IpcCommand {
            command: "/nonexistent/plugin-binary".into(),
            args: vec![],
            env: BTreeMap::new(),
            cwd: None,
        };
        let error = run_once(&command, "describe", "{}", Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert_matches!(error, PluginError::Spawn { .. });
    }

    #[tokio::test]
    async fn nonzero_exit_still_returns_stdout() {
        // A crash after printing is surfaced to the protocol layer, which
        // will fail on the (invalid) payload rather than here.
        let output = run_once(
            &sh("cat >/dev/null; printf 'partial'; exit 3"),
            "execute",
            "{}",
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();
        assert_eq!(output, "partial");
    }
}
