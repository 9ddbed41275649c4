use serde::Serialize;

use super::job::JobState;

/// A request to generate an upload through the indexing pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Index {
    pub id: i64,
    pub repository_id: i64,
    pub commit: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub queued_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_in_queue: Option<u32>,
}

/// Listing filter for index jobs.
#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    pub repository_id: Option<i64>,
    pub query: Option<String>,
    pub state: Option<JobState>,
    pub limit: Option<u32>,
    pub after: Option<String>,
}
