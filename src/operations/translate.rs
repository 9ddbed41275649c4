//! Moving line positions between two commits of the same file.
//!
//! A [`LineMap`] is built from the file's hunks in `old..new`. Lines outside
//! any hunk shift by the net size change of the hunks above them; lines in a
//! hunk map through its context lines. Removed lines have no counterpart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::context::RequestContext;
use crate::error::Result;
use crate::models::{Position, Range, Repository};
use crate::vcs::{validate_range, DiffOptions, FileDiff, Hunk, MultiFileDiffReader, VersionControl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Remove,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    orig_start: u32,
    orig_lines: u32,
    new_start: u32,
    new_lines: u32,
    ops: Vec<Op>,
}

impl Span {
    fn from_hunk(hunk: &Hunk) -> Self {
        let ops = hunk
            .body
            .iter()
            .filter_map(|line| match line.as_bytes().first() {
                Some(b'+') => Some(Op::Insert),
                Some(b'-') => Some(Op::Remove),
                Some(b'\\') => None,
                _ => Some(Op::Keep),
            })
            .collect();
        Self {
            orig_start: hunk.orig_start,
            orig_lines: hunk.orig_lines,
            new_start: hunk.new_start,
            new_lines: hunk.new_lines,
            ops,
        }
    }

    fn inverted(&self) -> Self {
        Self {
            orig_start: self.new_start,
            orig_lines: self.new_lines,
            new_start: self.orig_start,
            new_lines: self.orig_lines,
            ops: self
                .ops
                .iter()
                .map(|op| match op {
                    Op::Insert => Op::Remove,
                    Op::Remove => Op::Insert,
                    Op::Keep => Op::Keep,
                })
                .collect(),
        }
    }

    /// First original line (1-based) this span touches. An empty original
    /// side means lines are inserted after `orig_start`.
    fn first_line(&self) -> u32 {
        if self.orig_lines == 0 {
            self.orig_start.saturating_add(1)
        } else {
            self.orig_start
        }
    }

    /// One past the last original line (1-based) this span covers.
    fn end_line(&self) -> u64 {
        u64::from(self.first_line()) + u64::from(self.orig_lines)
    }

    /// Map a 1-based line known to lie inside this span.
    fn map_inside(&self, line: u32) -> Option<u32> {
        let (mut o, mut n) = (self.orig_start, self.new_start);
        for op in &self.ops {
            match op {
                Op::Keep => {
                    if o == line {
                        return Some(n);
                    }
                    o = o.checked_add(1)?;
                    n = n.checked_add(1)?;
                }
                Op::Remove => {
                    if o == line {
                        return None;
                    }
                    o = o.checked_add(1)?;
                }
                Op::Insert => n = n.checked_add(1)?,
            }
        }
        None
    }
}

/// Line mapping for one file from an old to a new revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    spans: Vec<Span>,
}

impl LineMap {
    #[must_use]
    pub fn from_file_diff(file: &FileDiff) -> Self {
        Self {
            spans: file.hunks.iter().map(Span::from_hunk).collect(),
        }
    }

    /// The same mapping in the other direction.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            spans: self.spans.iter().map(Span::inverted).collect(),
        }
    }

    /// Map a zero-based line; `None` when the line was removed or rewritten.
    #[must_use]
    pub fn map_line(&self, line: u32) -> Option<u32> {
        let l = line.checked_add(1)?;
        let mut offset: i64 = 0;
        for span in &self.spans {
            if l < span.first_line() {
                break;
            }
            if u64::from(l) < span.end_line() {
                return span.map_inside(l).and_then(|n| n.checked_sub(1));
            }
            offset += i64::from(span.new_lines) - i64::from(span.orig_lines);
        }
        u32::try_from(i64::from(line) + offset).ok()
    }
}

/// How one file's positions move from a dump's commit to the requested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTranslation {
    /// Same commit, or the file did not change.
    Identity,
    /// The file no longer exists at the requested commit.
    Deleted,
    Lines(LineMap),
}

impl FileTranslation {
    /// Dump-side range to the requested commit.
    #[must_use]
    pub fn forward_range(&self, range: Range) -> Option<Range> {
        match self {
            Self::Identity => Some(range),
            Self::Deleted => None,
            Self::Lines(map) => Some(Range {
                start: Position::new(map.map_line(range.start.line)?, range.start.character),
                end: Position::new(map.map_line(range.end.line)?, range.end.character),
            }),
        }
    }

    /// Requested-commit position to the dump side.
    #[must_use]
    pub fn backward_position(&self, position: Position) -> Option<Position> {
        match self {
            Self::Identity => Some(position),
            Self::Deleted => None,
            Self::Lines(map) => Some(Position::new(
                map.inverted().map_line(position.line)?,
                position.character,
            )),
        }
    }
}

type CacheKey = (i64, String, String);

/// Translation tables computed while serving one request.
///
/// Keyed by (repository, dump commit, path); the requested commit is fixed
/// for the lifetime of the cache.
#[derive(Debug)]
pub struct RequestCache {
    requested_commit: String,
    entries: Mutex<HashMap<CacheKey, Arc<FileTranslation>>>,
}

impl RequestCache {
    pub fn new(requested_commit: impl Into<String>) -> Self {
        Self {
            requested_commit: requested_commit.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Translation of `path` from `dump_commit` to the requested commit.
    pub fn translation(
        &self,
        ctx: &RequestContext,
        vcs: &dyn VersionControl,
        repo: &Repository,
        dump_commit: &str,
        path: &str,
    ) -> Result<Arc<FileTranslation>> {
        if dump_commit == self.requested_commit {
            return Ok(Arc::new(FileTranslation::Identity));
        }
        let key = (repo.id, dump_commit.to_string(), path.to_string());
        if let Some(hit) = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        // Computed without the lock held; a racing duplicate is harmless.
        let translation = Arc::new(self.compute(ctx, vcs, repo, dump_commit, path)?);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&translation));
        Ok(translation)
    }

    fn compute(
        &self,
        ctx: &RequestContext,
        vcs: &dyn VersionControl,
        repo: &Repository,
        dump_commit: &str,
        path: &str,
    ) -> Result<FileTranslation> {
        let range = format!("{dump_commit}..{}", self.requested_commit);
        validate_range(&range)?;
        let output = vcs.exec_diff(ctx, repo, &range, &DiffOptions::for_file(path))?;
        for file in MultiFileDiffReader::new(output) {
            let file = file?;
            if file.orig_name != path && file.new_name != path {
                continue;
            }
            tracing::debug!(%path, %range, hunks = file.hunks.len(), "file changed between commits");
            if file.is_deleted() {
                return Ok(FileTranslation::Deleted);
            }
            if file.is_binary {
                return Ok(FileTranslation::Identity);
            }
            return Ok(FileTranslation::Lines(LineMap::from_file_diff(&file)));
        }
        Ok(FileTranslation::Identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::testing::{repository, FakeVcs};
    use std::sync::atomic::Ordering;

    fn hunk(orig: (u32, u32), new: (u32, u32), body: &[&str]) -> Hunk {
        Hunk {
            orig_start: orig.0,
            orig_lines: orig.1,
            new_start: new.0,
            new_lines: new.1,
            section: String::new(),
            body: body.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn map(hunks: Vec<Hunk>) -> LineMap {
        LineMap::from_file_diff(&FileDiff {
            orig_name: "f".into(),
            new_name: "f".into(),
            hunks,
            ..Default::default()
        })
    }

    #[test]
    fn lines_shift_below_insertions() {
        // two lines inserted after line 3 (1-based)
        let m = map(vec![hunk(
            (2, 3),
            (2, 5),
            &[" b", " c", "+x", "+y", " d"],
        )]);
        assert_eq!(m.map_line(0), Some(0));
        assert_eq!(m.map_line(1), Some(1));
        assert_eq!(m.map_line(2), Some(2));
        assert_eq!(m.map_line(3), Some(5));
        assert_eq!(m.map_line(10), Some(12));
    }

    #[test]
    fn removed_lines_do_not_map() {
        let m = map(vec![hunk((1, 3), (1, 2), &[" a", "-b", " c"])]);
        assert_eq!(m.map_line(0), Some(0));
        assert_eq!(m.map_line(1), None);
        assert_eq!(m.map_line(2), Some(1));
        assert_eq!(m.map_line(7), Some(6));
    }

    #[test]
    fn lines_at_the_u32_limit_do_not_overflow() {
        let grown = map(vec![hunk((1, 1), (1, 3), &[" a", "+x", "+y"])]);
        assert_eq!(grown.map_line(u32::MAX), None);
        assert_eq!(grown.map_line(u32::MAX - 1), None);

        let shrunk = map(vec![hunk((1, 2), (1, 1), &[" a", "-b"])]);
        assert_eq!(shrunk.map_line(u32::MAX - 1), Some(u32::MAX - 2));

        let far = map(vec![hunk((u32::MAX, 0), (u32::MAX, 1), &["+x"])]);
        assert_eq!(far.map_line(u32::MAX - 1), Some(u32::MAX));
        assert_eq!(far.map_line(0), Some(0));
    }

    #[test]
    fn zero_context_insertion_keeps_anchor_line() {
        // insert after line 5 with no context
        let m = map(vec![hunk((5, 0), (6, 2), &["+x", "+y"])]);
        assert_eq!(m.map_line(4), Some(4));
        assert_eq!(m.map_line(5), Some(7));
    }

    #[test]
    fn inverse_maps_back() {
        let m = map(vec![hunk(
            (2, 3),
            (2, 5),
            &[" b", " c", "+x", "+y", " d"],
        )]);
        let back = m.inverted();
        assert_eq!(back.map_line(5), Some(3));
        assert_eq!(back.map_line(3), None);
        assert_eq!(back.map_line(12), Some(10));
    }

    const CHANGED: &str = "\
diff --git f.go f.go
index 1111111111111111111111111111111111111111..2222222222222222222222222222222222222222 100644
--- f.go
+++ f.go
@@ -1,3 +1,4 @@
 package f
+// added
 func a() {}
-func b() {}
+func b2() {}
";

    #[test]
    fn cache_memoizes_per_commit_and_path() {
        let vcs = FakeVcs::default().with_diff("old..new", CHANGED);
        let cache = RequestCache::new("new");
        let ctx = RequestContext::new();
        let repo = repository(1);

        let t = cache.translation(&ctx, &vcs, &repo, "old", "f.go").unwrap();
        assert_eq!(t.forward_range(Range::new(1, 0, 1, 4)), Some(Range::new(2, 0, 2, 4)));
        assert_eq!(t.forward_range(Range::new(2, 0, 2, 4)), None);
        assert_eq!(t.backward_position(Position::new(2, 3)), Some(Position::new(1, 3)));

        cache.translation(&ctx, &vcs, &repo, "old", "f.go").unwrap();
        assert_eq!(vcs.diff_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        let same = cache.translation(&ctx, &vcs, &repo, "new", "f.go").unwrap();
        assert_eq!(*same, FileTranslation::Identity);
        assert_eq!(vcs.diff_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn untouched_and_deleted_files() {
        let deleted = "\
diff --git gone.go gone.go
deleted file mode 100644
index 1111111111111111111111111111111111111111..0000000000000000000000000000000000000000
--- gone.go
+++ /dev/null
@@ -1 +0,0 @@
-package gone
";
        let vcs = FakeVcs::default().with_diff("old..new", deleted);
        let cache = RequestCache::new("new");
        let ctx = RequestContext::new();
        let repo = repository(1);

        let t = cache.translation(&ctx, &vcs, &repo, "old", "gone.go").unwrap();
        assert_eq!(*t, FileTranslation::Deleted);
        assert_eq!(t.forward_range(Range::new(0, 0, 0, 1)), None);

        let other = cache.translation(&ctx, &vcs, &repo, "old", "kept.go").unwrap();
        assert_eq!(*other, FileTranslation::Identity);
    }
}
