//! Child processes bound to a lifecycle token.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use super::{ByteStream, StdinSource};
use crate::CapabilityError;

/// Spawns `command` with its stdout piped and ties the child to `lifecycle`.
///
/// When `input` is given it becomes the child's stdin: process output is
/// handed over as a descriptor, anything else is copied in by a task. A
/// reaper task kills and waits for the child once `lifecycle` is cancelled,
/// or just waits if the child exits first.
pub(crate) fn spawn_bound(
    name: &str,
    mut command: Command,
    input: Option<ByteStream>,
    lifecycle: &CancellationToken,
) -> Result<ChildStdout, CapabilityError> {
    let pump = match input {
        None => {
            command.stdin(Stdio::null());
            None
        }
        Some(stream) => {
            let stdin = stream
                .into_stdin()
                .map_err(|source| CapabilityError::Stdin {
                    name: name.to_string(),
                    source,
                })?;
            match stdin {
                StdinSource::Direct(stdio) => {
                    command.stdin(stdio);
                    None
                }
                StdinSource::Pump(reader) => {
                    command.stdin(Stdio::piped());
                    Some(reader)
                }
            }
        }
    };

    command
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|source| CapabilityError::spawn(name, source))?;

    // Dropping `child` on these paths kills it.
    let Some(stdout) = child.stdout.take() else {
        return Err(CapabilityError::MissingPipe {
            name: name.to_string(),
            pipe: "stdout",
        });
    };

    if let Some(mut reader) = pump {
        let Some(mut stdin) = child.stdin.take() else {
            return Err(CapabilityError::MissingPipe {
                name: name.to_string(),
                pipe: "stdin",
            });
        };
        let token = lifecycle.clone();
        let pump_name = name.to_string();
        let pump_task = async move {
            tokio::select! {
                () = token.cancelled() => {}
                copied = tokio::io::copy(&mut reader, &mut stdin) => match copied {
                    Ok(bytes) => {
                        debug!(capability = %pump_name, bytes, "input drained");
                        let _ = stdin.shutdown().await;
                    }
                    Err(e) => debug!(capability = %pump_name, error = %e, "input pump stopped"),
                },
            }
        };
        tokio::spawn(pump_task.in_current_span());
    }

    debug!(capability = %name, pid = ?child.id(), "process spawned");
    tokio::spawn(reap(name.to_string(), child, lifecycle.clone()).in_current_span());

    Ok(stdout)
}

async fn reap(name: String, mut child: Child, lifecycle: CancellationToken) {
    let pid = child.id();
    tokio::select! {
        () = lifecycle.cancelled() => match child.kill().await {
            Ok(()) => debug!(capability = %name, ?pid, "process killed"),
            Err(e) => warn!(capability = %name, ?pid, error = %e, "failed to kill process"),
        },
        status = child.wait() => match status {
            Ok(status) => debug!(capability = %name, ?pid, %status, "process exited"),
            Err(e) => warn!(capability = %name, ?pid, error = %e, "failed to wait for process"),
        },
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    #[tokio::test]
    async fn test_stdout_is_readable() {
        let token = CancellationToken::new();
        let mut stdout = spawn_bound("echo", sh("printf hello"), None, &token).unwrap();

        let mut out = String::new();
        stdout.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_process_output_chains_into_next_process() {
        let token = CancellationToken::new();
        let first = spawn_bound("first", sh("printf chained"), None, &token).unwrap();
        let mut second = spawn_bound(
            "second",
            Command::new("cat"),
            Some(ByteStream::from_child(first)),
            &token,
        )
        .unwrap();

        let mut out = String::new();
        second.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "chained");
    }

    #[tokio::test]
    async fn test_reader_input_is_pumped() {
        let token = CancellationToken::new();
        let input = ByteStream::from_reader(&b"pumped"[..]);
        let mut stdout = spawn_bound("cat", Command::new("cat"), Some(input), &token).unwrap();

        let mut out = String::new();
        stdout.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "pumped");
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let token = CancellationToken::new();
        let mut stdout = spawn_bound("sleeper", sh("exec sleep 30"), None, &token).unwrap();

        token.cancel();

        let mut out = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), stdout.read_to_end(&mut out)).await;
        assert!(read.is_ok(), "stdout should close once the process is killed");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let token = CancellationToken::new();
        let err = spawn_bound(
            "ghost",
            Command::new("definitely-not-a-real-binary-4711"),
            None,
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, CapabilityError::Spawn { .. }));
    }
}
