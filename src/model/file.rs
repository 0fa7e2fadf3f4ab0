// src/model/file.rs

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a file a task requires or produces, without binding it to a
/// concrete location on a compute node.
///
/// Specifiers either come from the job's uploaded inputs (with origin path,
/// hash and timestamp filled in) or are synthesized by the graph builder to
/// name the output of an upstream stage (name only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpecifier {
    /// Logical file name, e.g. `brain.nii`.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<PathBuf>,

    /// Hex blake3 digest of the contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl FileSpecifier {
    /// A specifier carrying only a logical name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            original_path: None,
            hash: None,
            timestamp: None,
        }
    }

    /// A specifier for a local file; the logical name is its file name.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Self {
            name,
            original_path: Some(path.to_path_buf()),
            hash: None,
            timestamp: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
