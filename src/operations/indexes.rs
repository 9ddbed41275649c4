//! Index job administration.

use crate::config::PaginationSettings;
use crate::context::RequestContext;
use crate::db::Database;
use crate::error::{CodeIntelError, Result};
use crate::models::{Index, IndexFilter, JobState};
use crate::pagination::{CursorCodec, Page};
use crate::vcs::validate_commit;

pub fn create_index(db: &Database, repository_id: i64, commit: &str) -> Result<Index> {
    validate_commit(commit)?;
    db.require_repository(repository_id)?;
    let id = db.insert_index(repository_id, commit)?;
    tracing::info!(index_id = id, %commit, "index job queued");
    get_index(db, id)
}

pub fn get_index(db: &Database, id: i64) -> Result<Index> {
    db.get_index_by_id(id)?
        .ok_or(CodeIntelError::NotFound { what: "index", id })
}

pub fn list_indexes(
    db: &Database,
    filter: &IndexFilter,
    codec: &CursorCodec,
    pagination: &PaginationSettings,
) -> Result<Page<Index>> {
    db.list_indexes(filter, codec, pagination)
}

pub fn mark_index(db: &Database, id: i64, to: JobState, reason: Option<&str>) -> Result<Index> {
    match to {
        JobState::Processing => db.mark_index_processing(id)?,
        JobState::Completed => db.mark_index_completed(id)?,
        JobState::Errored => db.mark_index_errored(
            id,
            reason.ok_or_else(|| {
                CodeIntelError::InvalidArgument("an errored index job needs a reason".into())
            })?,
        )?,
        JobState::Queued => {
            return Err(CodeIntelError::InvalidTransition {
                kind: "index",
                id,
                to: to.as_str(),
            })
        }
    }
    get_index(db, id)
}

/// Delete an index job. Nothing else depends on it.
pub fn delete_index(ctx: &RequestContext, db: &Database, id: i64) -> Result<bool> {
    ctx.check()?;
    let deleted = db.delete_index_by_id(id)?;
    if deleted {
        tracing::info!(index_id = id, "index job deleted");
    }
    Ok(deleted)
}
