// Output handoff: the persistence capability and its filesystem implementation.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::PersistError;

const MAX_FILENAME_CHARS: usize = 200;
const MAX_UNIQUIFY_ATTEMPTS: u32 = 1000;

static ILLEGAL_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"|?*\\/\x00-\x1f]"#).unwrap());
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Identifier the sink assigns to a persisted artifact (for [`FileSink`], the final path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PersistId(pub String);

impl fmt::Display for PersistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Store `data` under `filename`. The sink may pick a different final name on conflict.
    async fn persist(
        &self,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<PersistId, PersistError>;
}

/// Make a title safe to use as a file name on every common platform.
///
/// Reserved and control characters are removed, whitespace runs become `_`,
/// trailing dots are dropped and the result is capped at 200 characters.
pub fn sanitize_filename(title: &str) -> String {
    let stripped = ILLEGAL_CHARS_REGEX.replace_all(title, "");
    let underscored = WHITESPACE_REGEX.replace_all(&stripped, "_");
    let trimmed = underscored.trim_end_matches('.');
    let name: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    if name.is_empty() {
        "video".to_string()
    } else {
        name
    }
}

/// Writes artifacts into a directory, creating it on first use.
///
/// An existing file is never overwritten: `clip.ts` becomes `clip (1).ts`, `clip (2).ts`, ...
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate(&self, filename: &str, attempt: u32) -> PathBuf {
        if attempt == 0 {
            return self.dir.join(filename);
        }
        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match path.extension() {
            Some(ext) => self
                .dir
                .join(format!("{stem} ({attempt}).{}", ext.to_string_lossy())),
            None => self.dir.join(format!("{stem} ({attempt})")),
        }
    }

    async fn create_unique(&self, filename: &str) -> Result<(PathBuf, tokio::fs::File), PersistError> {
        for attempt in 0..MAX_UNIQUIFY_ATTEMPTS {
            let path = self.candidate(filename, attempt);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Output name taken, trying next");
                }
                Err(e) => return Err(io_error(&path, e)),
            }
        }
        Err(PersistError::Rejected(format!(
            "no free name for {filename} after {MAX_UNIQUIFY_ATTEMPTS} attempts"
        )))
    }
}

fn io_error(path: &Path, source: io::Error) -> PersistError {
    PersistError::Io {
        path: path.display().to_string(),
        source: Arc::new(source),
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn persist(
        &self,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<PersistId, PersistError> {
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename == "."
            || filename == ".."
        {
            return Err(PersistError::InvalidFilename(filename.to_string()));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let (path, mut file) = self.create_unique(filename).await?;
        file.write_all(&data).await.map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))?;

        info!(
            path = %path.display(),
            bytes = data.len(),
            content_type,
            "Output saved"
        );
        Ok(PersistId(path.display().to_string()))
    }
}
