//! In-test collaborators.

use std::collections::HashMap;
use std::io::{BufRead, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use crate::context::RequestContext;
use crate::error::{CodeIntelError, Result};
use crate::models::{Location, Range, Repository};
use crate::store::bundle::BundleDiagnostic;
use crate::store::{Bundle, BundleStore, Document, RangeEntry};
use crate::vcs::{CommitGraph, DiffOptions, VersionControl};

/// Commit graph and canned diffs held in memory.
#[derive(Debug, Default)]
pub(crate) struct FakeVcs {
    parents: HashMap<String, Vec<String>>,
    diffs: HashMap<String, String>,
    head: Option<String>,
    /// Symbolic names on top of the commits themselves and `HEAD`.
    refs: HashMap<String, String>,
    pub graph_loads: AtomicUsize,
    pub diff_calls: AtomicUsize,
}

impl FakeVcs {
    /// A linear history: each commit's parent is the one before it.
    pub(crate) fn line(commits: &[&str]) -> Self {
        let mut vcs = Self::default();
        for pair in commits.windows(2) {
            vcs.parents
                .insert(pair[1].to_string(), vec![pair[0].to_string()]);
        }
        vcs.head = commits.last().map(|c| (*c).to_string());
        vcs
    }

    pub(crate) fn with_diff(mut self, range: &str, diff: &str) -> Self {
        self.diffs.insert(range.to_string(), diff.to_string());
        self
    }

    pub(crate) fn with_ref(mut self, name: &str, commit: &str) -> Self {
        self.refs.insert(name.to_string(), commit.to_string());
        self
    }

    fn knows(&self, commit: &str) -> bool {
        self.parents.contains_key(commit)
            || self.parents.values().flatten().any(|p| p == commit)
            || self.head.as_deref() == Some(commit)
    }

    pub(crate) fn without_head(mut self) -> Self {
        self.head = None;
        self
    }
}

impl VersionControl for FakeVcs {
    fn exec_diff(
        &self,
        ctx: &RequestContext,
        _repo: &Repository,
        range: &str,
        _options: &DiffOptions,
    ) -> Result<Box<dyn BufRead + Send>> {
        ctx.check()?;
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        let text = self.diffs.get(range).cloned().unwrap_or_default();
        Ok(Box::new(Cursor::new(text.into_bytes())))
    }

    fn commit_graph(&self, ctx: &RequestContext, _repo: &Repository) -> Result<CommitGraph> {
        ctx.check()?;
        self.graph_loads.fetch_add(1, Ordering::SeqCst);
        let mut commits: Vec<(&String, &Vec<String>)> = self.parents.iter().collect();
        commits.sort();
        let mut graph = CommitGraph::default();
        for (commit, parents) in commits {
            let parents: Vec<&str> = parents.iter().map(String::as_str).collect();
            graph.add_commit(commit, &parents);
        }
        Ok(graph)
    }

    fn head(&self, _ctx: &RequestContext, _repo: &Repository) -> Result<String> {
        self.head.clone().ok_or_else(|| CodeIntelError::Vcs {
            command: "git rev-parse".into(),
            detail: "no HEAD".into(),
        })
    }

    fn resolve_revision(&self, ctx: &RequestContext, repo: &Repository, rev: &str) -> Result<String> {
        ctx.check()?;
        if rev == "HEAD" {
            return self.head(ctx, repo);
        }
        if let Some(commit) = self.refs.get(rev) {
            return Ok(commit.clone());
        }
        if self.knows(rev) {
            return Ok(rev.to_string());
        }
        Err(CodeIntelError::InvalidRevision {
            rev: rev.to_string(),
        })
    }
}

pub(crate) fn repository(id: i64) -> Repository {
    Repository {
        id,
        name: "github.com/test/repo".into(),
        path: "/src/repo".into(),
        tip_commit: None,
        tip_updated_at: None,
    }
}

/// A bundle store in a temporary directory.
pub(crate) fn temp_store() -> (TempDir, BundleStore) {
    let tmp = TempDir::new().unwrap();
    let store = BundleStore::new(tmp.path().join("bundles"));
    (tmp, store)
}

/// Builder for bundle contents.
#[derive(Default)]
pub(crate) struct BundleBuilder {
    bundle: Bundle,
}

impl BundleBuilder {
    pub(crate) fn file(mut self, path: &str) -> Self {
        self.bundle.documents.entry(path.to_string()).or_default();
        self
    }

    pub(crate) fn diagnostic(mut self, path: &str, severity: i64, line: u32, message: &str) -> Self {
        self.doc(path).diagnostics.push(BundleDiagnostic {
            severity,
            code: String::new(),
            source: "lint".into(),
            message: message.into(),
            range: Range::new(line, 0, line, 5),
        });
        self
    }

    /// A symbol at `line` with one definition and the given references.
    pub(crate) fn symbol(
        mut self,
        path: &str,
        line: u32,
        definition: Option<Location>,
        references: Vec<Location>,
    ) -> Self {
        self.doc(path).ranges.push(RangeEntry {
            range: Range::new(line, 0, line, 10),
            definitions: definition.into_iter().collect(),
            references,
        });
        self
    }

    fn doc(&mut self, path: &str) -> &mut Document {
        self.bundle.documents.entry(path.to_string()).or_default()
    }

    pub(crate) fn store(self, store: &BundleStore, upload_id: i64) {
        store.put_bundle(upload_id, self.bundle).unwrap();
    }
}

pub(crate) fn loc(path: &str, line: u32) -> Location {
    Location {
        path: path.into(),
        range: Range::new(line, 0, line, 10),
    }
}
