use crate::tools::{Tool, ToolError, required_str, schemas};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Upper bound on the bytes handed back to the model for a single read.
const MAX_CONTENT_BYTES: usize = 512 * 1024;

/// Reads documents from the scratch directory.
pub struct FileReadTool {
    root: PathBuf,
}

impl FileReadTool {
    /// Create a reader confined to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let path = Path::new(requested);
        if path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(ToolError::InvalidArguments(format!(
                "path '{requested}' must not contain '..'"
            )));
        }
        if !path.starts_with(&self.root) {
            return Err(ToolError::NotFound(format!(
                "{requested} (only documents under {} are readable)",
                self.root.display()
            )));
        }
        Ok(path.to_path_buf())
    }

    /// Read a document and decode it as text.
    pub async fn read(&self, requested: &str) -> Result<String, ToolError> {
        let path = self.resolve(requested)?;
        let bytes = tokio::fs::read(&path).await.map_err(|error| match error.kind() {
            ErrorKind::NotFound => ToolError::NotFound(requested.to_string()),
            _ => ToolError::ServiceUnavailable(format!("failed to read {requested}: {error}")),
        })?;

        let truncated = bytes.len() > MAX_CONTENT_BYTES;
        let slice = &bytes[..bytes.len().min(MAX_CONTENT_BYTES)];
        let mut content = String::from_utf8_lossy(slice).into_owned();
        if truncated {
            content.push_str("\n\n[content truncated]");
        }
        tracing::debug!(
            path = requested,
            bytes = bytes.len(),
            truncated,
            "Document read"
        );
        Ok(content)
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the full textual content of the uploaded financial document at the given path."
    }

    fn parameters_schema(&self) -> Value {
        schemas::object_schema(&[(
            "path",
            schemas::string_schema("Path of the document exactly as given in the task"),
        )])
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let path = required_str(&args, "path")?;
        self.read(path).await
    }
}
