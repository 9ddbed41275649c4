//! Change statistics between two commits.

use crate::config::VcsSettings;
use crate::context::RequestContext;
use crate::error::Result;
use crate::models::Repository;
use crate::vcs::{validate_range, DiffOptions, DiffStat, MultiFileDiffReader, VersionControl};

/// Count added, changed and deleted lines over `base...head`.
///
/// The range is validated before git is invoked; any read or parse
/// failure aborts the whole computation.
pub fn compute_diff_stat(
    ctx: &RequestContext,
    vcs: &dyn VersionControl,
    repo: &Repository,
    base: &str,
    head: &str,
    settings: &VcsSettings,
) -> Result<DiffStat> {
    let range = format!("{base}...{head}");
    validate_range(&range)?;

    let output = vcs.exec_diff(ctx, repo, &range, &DiffOptions::for_stats(settings))?;
    let mut total = DiffStat::default();
    let mut files = 0usize;
    for file in MultiFileDiffReader::new(output) {
        ctx.check()?;
        total.accumulate(file?.stat());
        files += 1;
    }
    tracing::debug!(repo = %repo.name, %range, files, ?total, "diff stat computed");
    Ok(total)
}
