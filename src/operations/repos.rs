//! Repository registration and commit selection.

use std::path::Path;

use crate::context::RequestContext;
use crate::db::Database;
use crate::error::{CodeIntelError, Result};
use crate::models::Repository;
use crate::vcs::{validate_revision, VersionControl};

/// Register `name` with the working copy at `path`, resolving it to an
/// absolute path when it exists.
pub fn add_repository(db: &Database, name: &str, path: &str) -> Result<Repository> {
    if name.trim().is_empty() {
        return Err(CodeIntelError::InvalidArgument(
            "repository name must not be empty".into(),
        ));
    }
    let path = Path::new(path)
        .canonicalize()
        .map_or_else(|_| path.to_string(), |p| p.to_string_lossy().into_owned());
    let id = db.upsert_repository(name, &path)?;
    tracing::info!(repository_id = id, %name, %path, "repository registered");
    db.require_repository(id)
}

/// The full commit id a query runs against: the explicit revision resolved
/// through version control, else the stored tip, else the current head
/// (which is then stored as tip).
pub fn resolve_commit(
    ctx: &RequestContext,
    db: &Database,
    vcs: &dyn VersionControl,
    repo: &Repository,
    explicit: Option<&str>,
) -> Result<String> {
    if let Some(rev) = explicit {
        validate_revision(rev)?;
        return vcs.resolve_revision(ctx, repo, rev);
    }
    if let Some(tip) = &repo.tip_commit {
        return Ok(tip.clone());
    }
    let head = vcs.head(ctx, repo)?;
    db.set_tip_commit(repo.id, &head)?;
    Ok(head)
}
