//! Upload administration, including the deletion consistency rules.

use std::path::Path;

use crate::config::PaginationSettings;
use crate::context::RequestContext;
use crate::db::Database;
use crate::error::{CodeIntelError, Result};
use crate::models::{JobState, NewUpload, Upload, UploadFilter};
use crate::pagination::{CursorCodec, Page};
use crate::store::BundleStore;
use crate::vcs::{validate_commit, VersionControl};

/// Accept a new upload in state `queued`, storing its bundle if given.
///
/// If the bundle cannot be stored the record is removed again.
pub fn create_upload(
    db: &mut Database,
    store: &BundleStore,
    upload: &NewUpload,
    bundle: Option<&Path>,
) -> Result<Upload> {
    validate_commit(&upload.commit)?;
    if upload.indexer.trim().is_empty() {
        return Err(CodeIntelError::InvalidArgument(
            "indexer must not be empty".into(),
        ));
    }
    db.require_repository(upload.repository_id)?;

    let id = db.insert_upload(upload)?;
    if let Some(source) = bundle {
        if let Err(e) = store.save_bundle(id, source) {
            db.delete_upload_by_id(id)?;
            return Err(e);
        }
    }
    tracing::info!(upload_id = id, commit = %upload.commit, indexer = %upload.indexer, "upload queued");
    get_upload(db, id)
}

pub fn get_upload(db: &Database, id: i64) -> Result<Upload> {
    db.get_upload_by_id(id)?
        .ok_or(CodeIntelError::NotFound { what: "upload", id })
}

pub fn list_uploads(
    db: &Database,
    filter: &UploadFilter,
    codec: &CursorCodec,
    pagination: &PaginationSettings,
) -> Result<Page<Upload>> {
    db.list_uploads(filter, codec, pagination)
}

/// Move an upload to `to`. Errored uploads need a failure message.
pub fn mark_upload(db: &mut Database, id: i64, to: JobState, reason: Option<&str>) -> Result<Upload> {
    match to {
        JobState::Processing => db.mark_upload_processing(id)?,
        JobState::Completed => db.mark_upload_completed(id)?,
        JobState::Errored => {
            let reason = reason.ok_or_else(|| {
                CodeIntelError::InvalidArgument("an errored upload needs a reason".into())
            })?;
            db.mark_upload_errored(id, reason)?;
        }
        JobState::Queued => {
            return Err(CodeIntelError::InvalidTransition {
                kind: "upload",
                id,
                to: to.as_str(),
            })
        }
    }
    get_upload(db, id)
}

/// Delete an upload and refresh its repository's tip commit.
///
/// `Ok(false)` when there was nothing to delete; `tip` is then never called.
/// Otherwise `tip` runs exactly once with the repository id. If it fails,
/// the deletion still stands and the failure is returned as
/// [`CodeIntelError::TipRecomputation`].
pub fn delete_upload<F>(ctx: &RequestContext, db: &mut Database, id: i64, tip: F) -> Result<bool>
where
    F: FnOnce(&Database, i64) -> Result<String>,
{
    ctx.check()?;
    let Some(repository_id) = db.delete_upload_by_id(id)? else {
        tracing::debug!(upload_id = id, "upload already gone");
        return Ok(false);
    };
    tracing::info!(upload_id = id, repository_id, "upload deleted");

    let refreshed = tip(&*db, repository_id).and_then(|commit| {
        db.set_tip_commit(repository_id, &commit)?;
        Ok(commit)
    });
    match refreshed {
        Ok(commit) => {
            tracing::debug!(repository_id, %commit, "tip commit updated");
            Ok(true)
        }
        Err(e) => Err(CodeIntelError::TipRecomputation {
            upload_id: id,
            source: Box::new(e),
        }),
    }
}

/// Tip strategy asking version control for the repository's head.
pub fn head_tip<'a>(
    ctx: &'a RequestContext,
    vcs: &'a dyn VersionControl,
) -> impl FnOnce(&Database, i64) -> Result<String> + 'a {
    move |db, repository_id| {
        let repo = db.require_repository(repository_id)?;
        vcs.head(ctx, &repo)
    }
}
