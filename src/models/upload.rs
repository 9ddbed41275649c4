use serde::Serialize;

use super::job::JobState;

/// A unit of precomputed code intelligence for one
/// (repository, commit, indexer, root).
#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub id: i64,
    pub repository_id: i64,
    pub commit: String,
    /// Directory the upload covers, without leading/trailing slashes ("" = whole repository).
    pub root: String,
    pub indexer: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub is_latest: bool,
    pub uploaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// 1-based position among queued uploads, oldest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_in_queue: Option<u32>,
}

/// Fields supplied when a bundle is accepted.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub repository_id: i64,
    pub commit: String,
    pub root: String,
    pub indexer: String,
}

impl NewUpload {
    #[must_use]
    pub fn new(repository_id: i64, commit: &str, root: &str, indexer: &str) -> Self {
        Self {
            repository_id,
            commit: commit.to_string(),
            root: normalize_root(root),
            indexer: indexer.to_string(),
        }
    }
}

/// Listing filter for uploads.
#[derive(Debug, Clone, Default)]
pub struct UploadFilter {
    pub repository_id: Option<i64>,
    /// Whitespace-separated terms matched against commit, indexer, root and failure.
    pub query: Option<String>,
    /// `None` means any state.
    pub state: Option<JobState>,
    pub is_latest: Option<bool>,
    pub limit: Option<u32>,
    /// Opaque token from a previous page.
    pub after: Option<String>,
}

/// Strip leading and trailing slashes so `/lib/`, `lib` and `lib/` compare equal.
#[must_use]
pub fn normalize_root(root: &str) -> String {
    root.trim_matches('/').to_string()
}
