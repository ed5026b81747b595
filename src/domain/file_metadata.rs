//! Backend-sourced file/folder metadata (§3 "File Metadata").

use chrono::{DateTime, Utc};

/// Metadata for a single backend file or folder. `display_name` is already
/// disambiguated (see `pathmap::disambiguate`) by the time it reaches a
/// resource handler. Scoped to the cache entry or outstanding resource
/// handle that produced it — not meant to be held across requests.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub backend_file_id: u64,
    pub display_name: String,
    pub parent_id: Option<u64>,
    pub is_directory: bool,
    pub size: u64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileMetadata {
    pub fn root_folder(username: &str) -> Self {
        let now = Utc::now();
        Self {
            backend_file_id: 0,
            display_name: username.to_string(),
            parent_id: None,
            is_directory: true,
            size: 0,
            content_type: "httpd/unix-directory".to_string(),
            created_at: now,
            modified_at: now,
        }
    }
}
