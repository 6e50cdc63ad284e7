//! Process-backed capture.

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::process::spawn_bound;
use super::{ByteStream, Capture};
use crate::CapabilityError;

/// Captures a route by running a recorder process and reading its stdout.
///
/// Every argument has `{route}` replaced by the route id.
///
/// # Example
///
/// ```
/// use stream_app_audio::ProcessCapture;
///
/// let capture = ProcessCapture::new("pw-record", ["--target={route}", "-"]);
/// assert_eq!(capture.args_for(7), vec!["--target=7", "-"]);
/// ```
#[derive(Debug, Clone)]
pub struct ProcessCapture {
    name: String,
    program: String,
    args: Vec<String>,
}

impl ProcessCapture {
    /// Placeholder substituted with the route id in every argument.
    pub const ROUTE_PLACEHOLDER: &'static str = "{route}";

    /// Creates a capture running `program` with `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        Self {
            name: program.clone(),
            program,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Records the route's monitor with `parec` at 100 ms latency.
    ///
    /// Output is raw signed 16-bit little-endian stereo at 44.1 kHz.
    pub fn parec() -> Self {
        Self::new("parec", ["--monitor-stream={route}", "--latency-msec=100"])
    }

    /// Overrides the name used in logs and errors.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Arguments the process is started with for `route_id`.
    pub fn args_for(&self, route_id: u32) -> Vec<String> {
        let id = route_id.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(Self::ROUTE_PLACEHOLDER, &id))
            .collect()
    }
}

impl Default for ProcessCapture {
    fn default() -> Self {
        Self::parec()
    }
}

impl Capture for ProcessCapture {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(
        &self,
        route_id: u32,
        lifecycle: &CancellationToken,
    ) -> Result<ByteStream, CapabilityError> {
        let mut command = Command::new(&self.program);
        command.args(self.args_for(route_id));
        let stdout = spawn_bound(&self.name, command, None, lifecycle)?;
        Ok(ByteStream::from_child(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parec_arguments() {
        let capture = ProcessCapture::parec();
        assert_eq!(capture.name(), "parec");
        assert_eq!(
            capture.args_for(42),
            vec!["--monitor-stream=42", "--latency-msec=100"]
        );
    }

    #[test]
    fn test_with_name() {
        let capture = ProcessCapture::new("rec", Vec::<String>::new()).with_name("recorder");
        assert_eq!(capture.name(), "recorder");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_reads_route_output() {
        use tokio::io::AsyncReadExt;

        let capture = ProcessCapture::new("sh", ["-c", "printf route-{route}"]);
        let token = CancellationToken::new();
        let mut stream = capture.start(9, &token).unwrap();
        assert!(stream.is_process_output());

        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "route-9");
    }

    #[tokio::test]
    async fn test_start_missing_program() {
        let capture = ProcessCapture::new("definitely-not-a-real-binary-4711", ["{route}"]);
        let token = CancellationToken::new();
        let err = capture.start(1, &token).unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-binary-4711"));
    }
}
