//! Merging per-dump answers into one response at the requested commit.

use std::collections::HashSet;

use rayon::prelude::*;

use crate::context::RequestContext;
use crate::error::Result;
use crate::models::{Diagnostic, Dump, ItemKind, Located, Location, Position, Repository};
use crate::store::ArtifactStore;
use crate::vcs::VersionControl;

use super::translate::RequestCache;

/// Everything needed to answer one query about one repository at one commit.
pub struct Aggregator<'a> {
    pub ctx: &'a RequestContext,
    pub cache: &'a RequestCache,
    pub vcs: &'a dyn VersionControl,
    pub store: &'a dyn ArtifactStore,
    pub repo: &'a Repository,
}

impl Aggregator<'_> {
    /// Diagnostics for `path` from every dump, in dump order.
    ///
    /// A diagnostic whose severity cannot be mapped becomes an `Err` entry of
    /// its own; the rest of the batch is unaffected.
    pub fn diagnostics(&self, dumps: &[Dump], path: &str) -> Result<Vec<Result<Diagnostic>>> {
        let path = path.trim_start_matches('/');
        let batches: Vec<Result<_>> = dumps
            .par_iter()
            .map(|dump| {
                self.ctx.check()?;
                let raw = self.store.diagnostics(dump, dump.path_in_bundle(path))?;
                self.to_requested(dump, raw, ItemKind::Diagnostic)
            })
            .collect();

        let mut out = Vec::new();
        for (dump, batch) in dumps.iter().zip(batches) {
            for raw in batch? {
                let diagnostic = raw.into_diagnostic(dump.id);
                if let Err(e) = &diagnostic {
                    tracing::warn!(upload_id = dump.id, error = %e, "dropping malformed diagnostic");
                }
                out.push(diagnostic);
            }
        }
        Ok(out)
    }

    /// Definitions of the symbol at `position`, from the first dump that
    /// knows any.
    pub fn definitions(&self, dumps: &[Dump], path: &str, position: Position) -> Result<Vec<Location>> {
        let path = path.trim_start_matches('/');
        for dump in dumps {
            self.ctx.check()?;
            let Some(at) = self.to_dump(dump, path, position)? else {
                continue;
            };
            let found = self.store.definitions(dump, dump.path_in_bundle(path), at)?;
            let found = self.to_requested(dump, found, ItemKind::Definition)?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    /// References to the symbol at `position` across all dumps, without duplicates.
    pub fn references(&self, dumps: &[Dump], path: &str, position: Position) -> Result<Vec<Location>> {
        let path = path.trim_start_matches('/');
        let batches: Vec<Result<Vec<Location>>> = dumps
            .par_iter()
            .map(|dump| {
                self.ctx.check()?;
                let Some(at) = self.to_dump(dump, path, position)? else {
                    return Ok(Vec::new());
                };
                let found = self.store.references(dump, dump.path_in_bundle(path), at)?;
                self.to_requested(dump, found, ItemKind::Reference)
            })
            .collect();

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for batch in batches {
            for loc in batch? {
                if seen.insert(loc.clone()) {
                    out.push(loc);
                }
            }
        }
        Ok(out)
    }

    /// Map a requested-commit position into the dump's commit.
    fn to_dump(&self, dump: &Dump, path: &str, position: Position) -> Result<Option<Position>> {
        let translation = self
            .cache
            .translation(self.ctx, self.vcs, self.repo, &dump.commit, path)?;
        let mapped = translation.backward_position(position);
        if mapped.is_none() {
            tracing::debug!(upload_id = dump.id, %path, line = position.line, "position has no counterpart in dump");
        }
        Ok(mapped)
    }

    /// Re-root bundle-relative items and move them to the requested commit,
    /// dropping those that fall on changed lines.
    fn to_requested<T: Located>(&self, dump: &Dump, items: Vec<T>, kind: ItemKind) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let path = dump.path_in_repo(item.path());
            let translation = self
                .cache
                .translation(self.ctx, self.vcs, self.repo, &dump.commit, &path)?;
            match translation.forward_range(item.range()) {
                Some(range) => out.push(item.relocated(path, range)),
                None => tracing::debug!(
                    kind = kind.as_str(),
                    upload_id = dump.id,
                    %path,
                    "item dropped; its lines changed since the dump"
                ),
            }
        }
        Ok(out)
    }
}
