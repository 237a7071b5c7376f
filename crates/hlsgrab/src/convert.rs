// Container conversion: optional `.ts` to `.mp4` re-encapsulation after a completed download.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ConvertError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[async_trait]
pub trait ContainerConverter: Send + Sync {
    /// Extension of the produced file, without the dot.
    fn target_extension(&self) -> &str;

    fn content_type(&self) -> &str;

    /// Re-encapsulate a merged transport stream.
    async fn convert(&self, input: Bytes) -> Result<Bytes, ConvertError>;
}

/// Remuxes MPEG-TS into fragment-free MP4 with an external ffmpeg, without re-encoding.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    program: PathBuf,
    timeout: Duration,
}

impl Default for FfmpegRemuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRemuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_args(input: &str, output: &str) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            input,
            "-c",
            "copy",
            "-bsf:a",
            "aac_adtstoasc",
            "-movflags",
            "+faststart",
            "-y",
            output,
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

#[async_trait]
impl ContainerConverter for FfmpegRemuxer {
    fn target_extension(&self) -> &str {
        "mp4"
    }

    fn content_type(&self) -> &str {
        "video/mp4"
    }

    async fn convert(&self, input: Bytes) -> Result<Bytes, ConvertError> {
        let workdir = tempfile::tempdir()?;
        let input_path = workdir.path().join("input.ts");
        let output_path = workdir.path().join("output.mp4");
        tokio::fs::write(&input_path, &input).await?;

        let args = Self::build_args(
            &input_path.to_string_lossy(),
            &output_path.to_string_lossy(),
        );
        debug!(program = %self.program.display(), ?args, "Starting remux");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ConvertError::Unavailable(format!(
                    "{} not found",
                    self.program.display()
                )),
                _ => ConvertError::from(e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConvertError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(ConvertError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let converted = tokio::fs::read(&output_path).await?;
        info!(
            input_bytes = input.len(),
            output_bytes = converted.len(),
            "Remux finished"
        );
        Ok(Bytes::from(converted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_copy_streams_and_faststart() {
        let args = FfmpegRemuxer::build_args("in.ts", "out.mp4");
        let joined = args.join(" ");
        assert!(joined.contains("-i in.ts"));
        assert!(joined.contains("-c copy"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let remuxer = FfmpegRemuxer::new("nonexistent_remuxer_xyz_12345");
        let err = remuxer
            .convert(Bytes::from_static(&[0x47; 188]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Unavailable(_)));
    }

    #[test]
    fn test_target_metadata() {
        let remuxer = FfmpegRemuxer::default();
        assert_eq!(remuxer.target_extension(), "mp4");
        assert_eq!(remuxer.content_type(), "video/mp4");
    }
}
