//! Version-control collaborator: the only place commit graphs and diffs
//! come from.

pub mod diff;
pub mod git;

use std::collections::HashMap;
use std::io::BufRead;

use crate::config::VcsSettings;
use crate::context::RequestContext;
use crate::error::{CodeIntelError, Result};
use crate::models::Repository;

pub use diff::{DiffStat, FileDiff, Hunk, MultiFileDiffReader};
pub use git::GitCli;

/// Immediate neighbours of a commit in the commit graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitNeighbors {
    pub parents: Vec<String>,
    pub children: Vec<String>,
}

/// Parent and child edges of every commit reachable from a ref.
///
/// Loaded once per resolution so a breadth-first walk costs one
/// version-control call regardless of how many commits it visits.
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    parents: HashMap<String, Vec<String>>,
    children: HashMap<String, Vec<String>>,
}

impl CommitGraph {
    /// Record `commit` with its parents, in parent order.
    pub fn add_commit(&mut self, commit: &str, parents: &[&str]) {
        for parent in parents {
            self.children
                .entry((*parent).to_string())
                .or_default()
                .push(commit.to_string());
        }
        self.parents.insert(
            commit.to_string(),
            parents.iter().map(|p| (*p).to_string()).collect(),
        );
    }

    /// Immediate neighbours of `commit`; unknown commits have none.
    #[must_use]
    pub fn neighbors(&self, commit: &str) -> CommitNeighbors {
        CommitNeighbors {
            parents: self.parents.get(commit).cloned().unwrap_or_default(),
            children: self.children.get(commit).cloned().unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Flags for a diff invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub find_renames: bool,
    pub full_index: bool,
    pub inter_hunk_context: u32,
    pub no_prefix: bool,
    /// Pathspecs after `--`; empty means the whole tree.
    pub paths: Vec<String>,
}

impl DiffOptions {
    /// Options used for change statistics.
    #[must_use]
    pub fn for_stats(settings: &VcsSettings) -> Self {
        Self {
            find_renames: true,
            full_index: true,
            inter_hunk_context: settings.inter_hunk_context,
            no_prefix: true,
            paths: settings.path_scope.clone(),
        }
    }

    /// Options used to translate positions within one file.
    #[must_use]
    pub fn for_file(path: &str) -> Self {
        Self {
            find_renames: false,
            full_index: true,
            inter_hunk_context: 0,
            no_prefix: true,
            paths: vec![path.to_string()],
        }
    }

    /// Full `git diff` argument list for `range`.
    #[must_use]
    pub fn to_args(&self, range: &str) -> Vec<String> {
        let mut args = vec!["diff".to_string()];
        if self.find_renames {
            args.push("--find-renames".into());
        }
        if self.full_index {
            args.push("--full-index".into());
        }
        args.push(format!("--inter-hunk-context={}", self.inter_hunk_context));
        if self.no_prefix {
            args.push("--no-prefix".into());
        }
        args.push(range.to_string());
        args.push("--".into());
        args.extend(self.paths.iter().cloned());
        args
    }
}

/// Operations the core needs from version control.
pub trait VersionControl: Send + Sync {
    /// Run a diff over `range` and hand back its raw output.
    fn exec_diff(
        &self,
        ctx: &RequestContext,
        repo: &Repository,
        range: &str,
        options: &DiffOptions,
    ) -> Result<Box<dyn BufRead + Send>>;

    /// Adjacency of the whole commit graph; query it with
    /// [`CommitGraph::neighbors`].
    fn commit_graph(&self, ctx: &RequestContext, repo: &Repository) -> Result<CommitGraph>;

    /// Commit the repository's default branch points at.
    fn head(&self, ctx: &RequestContext, repo: &Repository) -> Result<String>;

    /// Full commit id named by `rev` (a branch, tag, `HEAD` or abbreviated
    /// id). Unknown revisions are `InvalidRevision`.
    fn resolve_revision(&self, ctx: &RequestContext, repo: &Repository, rev: &str) -> Result<String>;
}

/// Reject range expressions git would parse as options or relative paths.
pub fn validate_range(range: &str) -> Result<()> {
    if range.starts_with('-') || range.starts_with('.') {
        return Err(CodeIntelError::InvalidRange {
            range: range.to_string(),
        });
    }
    Ok(())
}

/// Reject revisions that could be taken as options or split into several arguments.
pub fn validate_revision(rev: &str) -> Result<()> {
    if rev.is_empty() || rev.starts_with('-') || rev.chars().any(char::is_whitespace) {
        return Err(CodeIntelError::InvalidRevision {
            rev: rev.to_string(),
        });
    }
    Ok(())
}

/// Whether `rev` is already a full 40-character hexadecimal commit id.
#[must_use]
pub fn is_full_commit(rev: &str) -> bool {
    rev.len() == 40 && rev.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Require a full 40-character hexadecimal commit id.
pub fn validate_commit(commit: &str) -> Result<()> {
    if is_full_commit(commit) {
        Ok(())
    } else {
        Err(CodeIntelError::InvalidArgument(format!(
            "commit must be a 40-character hex id: {commit:?}"
        )))
    }
}
