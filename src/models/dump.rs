use serde::Serialize;

use super::upload::Upload;

/// Read-only view of a completed upload, as used during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dump {
    /// Upload id; also the artifact store reference.
    pub id: i64,
    pub repository_id: i64,
    pub commit: String,
    pub root: String,
    pub indexer: String,
    pub finished_at: String,
}

impl Dump {
    #[must_use]
    pub fn from_upload(upload: &Upload) -> Self {
        Self {
            id: upload.id,
            repository_id: upload.repository_id,
            commit: upload.commit.clone(),
            root: upload.root.clone(),
            indexer: upload.indexer.clone(),
            finished_at: upload.finished_at.clone().unwrap_or_default(),
        }
    }

    /// Whether this dump's root contains `path`.
    #[must_use]
    pub fn covers(&self, path: &str) -> bool {
        root_covers(&self.root, path)
    }

    /// `path` expressed relative to the dump root, as stored in its bundle.
    #[must_use]
    pub fn path_in_bundle<'a>(&self, path: &'a str) -> &'a str {
        let path = path.trim_start_matches('/');
        if self.root.is_empty() {
            return path;
        }
        path.strip_prefix(self.root.as_str())
            .map_or(path, |rest| rest.trim_start_matches('/'))
    }

    /// Inverse of [`Dump::path_in_bundle`].
    #[must_use]
    pub fn path_in_repo(&self, bundle_path: &str) -> String {
        if self.root.is_empty() {
            bundle_path.to_string()
        } else {
            format!("{}/{}", self.root, bundle_path)
        }
    }
}

/// A root covers a path when it is empty, equal to it, or a directory prefix of it.
#[must_use]
pub fn root_covers(root: &str, path: &str) -> bool {
    let root = root.trim_matches('/');
    let path = path.trim_start_matches('/');
    if root.is_empty() {
        return true;
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
