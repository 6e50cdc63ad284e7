//! Where snapshots come from.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use super::{parse_snapshot, Route};
use crate::{SnapshotError, StreamAppAudioError};

/// Something that can list the audio server's current routes.
///
/// The watcher calls [`snapshot`](SnapshotSource::snapshot) once per poll
/// tick. Implementations return freshly parsed records every time.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use stream_app_audio::{parse_snapshot, Route, SnapshotError, SnapshotSource};
///
/// struct Fixed(&'static str);
///
/// #[async_trait]
/// impl SnapshotSource for Fixed {
///     async fn snapshot(&self) -> Result<Vec<Route>, SnapshotError> {
///         parse_snapshot(self.0)
///     }
/// }
/// ```
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Takes one snapshot of the route listing.
    async fn snapshot(&self) -> Result<Vec<Route>, SnapshotError>;
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    async fn snapshot(&self) -> Result<Vec<Route>, SnapshotError> {
        (**self).snapshot().await
    }
}

/// Lists routes by running `pactl list sink-inputs`.
///
/// The command runs with `LC_ALL=C` so the listing keywords are not
/// translated. If the snapshot future is dropped mid-run the command is
/// killed.
#[derive(Debug, Clone)]
pub struct PactlSnapshot {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl PactlSnapshot {
    /// Creates a source running `pactl list sink-inputs`.
    pub fn new() -> Self {
        Self::with_command("pactl", ["list", "sink-inputs"]).env("LC_ALL", "C")
    }

    /// Creates a source running an arbitrary command that prints a listing.
    pub fn with_command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Sets an environment variable for the command.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Default for PactlSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for PactlSnapshot {
    async fn snapshot(&self) -> Result<Vec<Route>, SnapshotError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SnapshotError::Unavailable {
                command: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SnapshotError::CommandFailed {
                command: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_snapshot(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Takes one snapshot and returns the first route belonging to `app_name`.
///
/// Matching ignores case.
///
/// # Errors
///
/// Returns [`StreamAppAudioError::Snapshot`] if the snapshot fails, or
/// [`StreamAppAudioError::RouteNotFound`] if no listed route matches.
pub async fn find_route(
    source: &dyn SnapshotSource,
    app_name: &str,
) -> Result<Route, StreamAppAudioError> {
    let routes = source.snapshot().await?;
    routes
        .into_iter()
        .find(|route| route.belongs_to(app_name))
        .ok_or_else(|| StreamAppAudioError::RouteNotFound {
            app_name: app_name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl SnapshotSource for Fixed {
        async fn snapshot(&self) -> Result<Vec<Route>, SnapshotError> {
            parse_snapshot(self.0)
        }
    }

    const LISTING: &str = "\
Sink Input #3
\tProperties:
\t\tapplication.name = \"mpv\"
Sink Input #5
\tProperties:
\t\tapplication.name = \"Firefox\"
";

    #[tokio::test]
    async fn test_find_route_matches_case_insensitively() {
        let route = find_route(&Fixed(LISTING), "firefox").await.unwrap();
        assert_eq!(route.id, 5);
    }

    #[tokio::test]
    async fn test_find_route_not_found() {
        let err = find_route(&Fixed(LISTING), "chromium").await.unwrap_err();
        assert!(matches!(err, StreamAppAudioError::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_find_route_propagates_snapshot_errors() {
        let err = find_route(&Fixed("Sink Input #x"), "mpv").await.unwrap_err();
        assert!(matches!(
            err,
            StreamAppAudioError::Snapshot(SnapshotError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn test_pactl_defaults() {
        let source = PactlSnapshot::new();
        assert_eq!(source.program, "pactl");
        assert_eq!(source.args, vec!["list", "sink-inputs"]);
        assert_eq!(source.envs, vec![("LC_ALL".to_string(), "C".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let source =
            PactlSnapshot::with_command("definitely-not-a-real-binary-4711", Vec::<String>::new());
        let err = source.snapshot().await.unwrap_err();
        assert!(matches!(err, SnapshotError::Unavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let source =
            PactlSnapshot::with_command("sh", ["-c", "echo 'Connection refused' >&2; exit 1"]);
        let err = source.snapshot().await.unwrap_err();
        match err {
            SnapshotError::CommandFailed { stderr, .. } => assert_eq!(stderr, "Connection refused"),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_parsed() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LISTING.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let source = PactlSnapshot::with_command("cat", [path]);
        let routes = source.snapshot().await.unwrap();
        assert_eq!(routes.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 5]);
    }
}
