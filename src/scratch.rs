//! Temporary storage for uploaded documents.
//!
//! Every upload gets its own file named by a fresh UUID so concurrent requests never share a
//! path. The [`ScratchFile`] guard deletes the file when dropped, which covers success, error
//! returns, and unwinding panics alike.

use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FILE_PREFIX: &str = "financial_document_";
const DEFAULT_EXTENSION: &str = "pdf";

/// Directory holding in-flight uploads.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Point at `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist `bytes` under a freshly generated name, creating the directory if absent.
    ///
    /// The extension is taken from `original_name` when it has one.
    pub async fn persist(
        &self,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<ScratchFile> {
        tokio::fs::create_dir_all(&self.root).await?;
        let id = Uuid::new_v4();
        let path = self
            .root
            .join(format!("{FILE_PREFIX}{id}.{}", extension_for(original_name)));

        // Guard exists before the write; a partial file is removed on failure.
        let file = ScratchFile {
            id,
            path: path.clone(),
        };
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Scratch file written");
        Ok(file)
    }
}

fn extension_for(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Uploaded document on disk, removed when the guard goes out of scope.
#[derive(Debug)]
pub struct ScratchFile {
    id: Uuid,
    path: PathBuf,
}

impl ScratchFile {
    /// Unique token naming this upload.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Location handed to the pipeline.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Scratch file removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove scratch file"
            ),
        }
    }
}
