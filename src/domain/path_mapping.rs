//! The `path -> id` / `id -> path` mapping record (§3 "Path Mapping").

use chrono::{DateTime, Utc};

/// One resolved mapping between a normalized WebDAV path and a backend file
/// id, scoped to a single user. `(user_id, full_path)` is unique within the
/// path->id cache; `backend_file_id` is unique within the id->path cache.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMapping {
    pub full_path: String,
    pub backend_file_id: u64,
    pub user_id: u64,
    pub original_name: String,
    pub webdav_name: String,
    pub parent_id: Option<u64>,
    pub is_directory: bool,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl PathMapping {
    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }
}
