use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

/// Successful login result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Token identifying the user on later visits.
    pub user_token: String,
    #[serde(default)]
    pub referral_code: String,
}

/// A local archive offered for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    /// File name presented to the service.
    pub name: String,
    pub path: PathBuf,
    /// Size as reported by the source listing; checked against the limits.
    pub size_bytes: u64,
}

impl UploadSource {
    /// Builds a source from a path, reading its size from disk.
    pub fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let size_bytes = std::fs::metadata(&path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            path,
            size_bytes,
        })
    }
}

/// Progress of an upload or download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes sent or written so far; never decreases within a transfer.
    pub transferred: u64,
    /// Expected total, when known.
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Completion percentage, if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some(self.transferred as f64 / total as f64 * 100.0),
            None => None,
        }
    }
}

/// Progress callback shared with the transfer task.
pub type ProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Response of `/instance/start`.
#[derive(Debug, Deserialize)]
pub(crate) struct StartResponse {
    #[serde(rename = "launchId")]
    pub launch_id: serde_json::Value,
}

impl StartResponse {
    pub(crate) fn launch_id(&self) -> Option<String> {
        match &self.launch_id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
