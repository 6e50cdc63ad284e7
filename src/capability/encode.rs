//! Process-backed encoding.

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::process::spawn_bound;
use super::{ByteStream, Encode};
use crate::CapabilityError;

/// Encodes by piping the input through an encoder process.
#[derive(Debug, Clone)]
pub struct ProcessEncoder {
    name: String,
    program: String,
    args: Vec<String>,
    resample_khz: Option<f32>,
}

impl ProcessEncoder {
    /// Creates an encoder running `program` with `args`.
    ///
    /// The process must read raw input on stdin and write encoded output on
    /// stdout.
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
            resample_khz: None,
        }
    }

    /// MP3 encoding with `lame`, reading raw little-endian PCM.
    pub fn lame() -> Self {
        Self::new("lame", ["-r", "-f", "-", "-"])
    }

    /// Asks the encoder to resample its output to `khz` kHz.
    ///
    /// The value is passed as `--resample <khz>` ahead of the stdin/stdout
    /// arguments.
    #[must_use]
    pub fn with_resample_khz(mut self, khz: f32) -> Self {
        self.resample_khz = Some(khz);
        self
    }

    /// Overrides the name used in logs and errors.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Arguments the process is started with.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(khz) = self.resample_khz {
            // Trailing `- -` must stay last for lame.
            let at = args
                .iter()
                .position(|arg| arg == "-")
                .unwrap_or(args.len());
            args.splice(at..at, ["--resample".to_string(), khz.to_string()]);
        }
        args
    }
}

impl Default for ProcessEncoder {
    fn default() -> Self {
        Self::lame()
    }
}

impl Encode for ProcessEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(
        &self,
        input: ByteStream,
        lifecycle: &CancellationToken,
    ) -> Result<ByteStream, CapabilityError> {
        let mut command = Command::new(&self.program);
        command.args(self.args());
        let stdout = spawn_bound(&self.name, command, Some(input), lifecycle)?;
        Ok(ByteStream::from_child(stdout))
    }
}
