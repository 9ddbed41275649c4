use serde::Serialize;

/// A repository known to the registry and the working copy git runs in.
#[derive(Debug, Clone, Serialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip_updated_at: Option<String>,
}
