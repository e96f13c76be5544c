//! Local filesystem storage for uploaded bytes.

use std::path::PathBuf;

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;

/// Writes each upload to a fresh, uniquely named file under one directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Store `data` under `<uuid>_<original name>` and return the full path.
    ///
    /// The directory is created on demand. Only the last component of
    /// `original_name` is kept so the file always lands inside `base_path`.
    pub async fn store(&self, original_name: &str, data: &[u8]) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.base_path).await?;

        let key = format!("{}_{}", Uuid::new_v4(), safe_file_name(original_name));
        let path = self.base_path.join(key);

        fs::write(&path, data).await?;
        debug!("Stored {} bytes at {}", data.len(), path.display());

        Ok(path)
    }
}

fn safe_file_name(original_name: &str) -> &str {
    // Handle both separators; clients on Windows send backslashes.
    original_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("upload")
}
