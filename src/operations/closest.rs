//! Closest-dump resolution over the commit graph.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::config::ResolutionSettings;
use crate::context::RequestContext;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Dump, Repository};
use crate::store::ArtifactStore;
use crate::vcs::{is_full_commit, validate_revision, CommitGraph, VersionControl};

/// Completed dumps nearest to `commit` that can answer queries about `path`.
///
/// Walks parents and children breadth-first and stops at the first distance
/// where any dump qualifies, so every result is equally close. Symbolic
/// revisions are resolved to a commit id first. Returns an empty list when
/// nothing is found within the configured bounds.
#[allow(clippy::too_many_arguments)]
pub fn find_closest_dumps(
    ctx: &RequestContext,
    db: &Database,
    vcs: &dyn VersionControl,
    store: &dyn ArtifactStore,
    repo: &Repository,
    commit: &str,
    path: &str,
    indexer: Option<&str>,
    settings: &ResolutionSettings,
) -> Result<Vec<Dump>> {
    validate_revision(commit)?;
    let path = path.trim_start_matches('/');

    // The only registry read of this call.
    let snapshot = db.completed_latest_uploads(repo.id, indexer)?;
    let mut by_commit: HashMap<&str, Vec<Dump>> = HashMap::new();
    for upload in &snapshot {
        let dump = Dump::from_upload(upload);
        if dump.covers(path) {
            by_commit.entry(upload.commit.as_str()).or_default().push(dump);
        }
    }
    if by_commit.is_empty() {
        tracing::debug!(repo = %repo.name, %path, "no upload covers path");
        return Ok(Vec::new());
    }

    let resolved;
    let commit = if is_full_commit(commit) {
        commit
    } else {
        resolved = vcs.resolve_revision(ctx, repo, commit)?;
        resolved.as_str()
    };

    // Loaded on the first expansion; a hit at distance zero needs no graph.
    let mut graph: Option<CommitGraph> = None;
    let mut visited: HashSet<String> = HashSet::from([commit.to_string()]);
    let mut frontier = vec![commit.to_string()];
    let mut distance = 0u32;
    loop {
        ctx.check()?;
        let mut candidates = Vec::new();
        for c in &frontier {
            for dump in by_commit.get(c.as_str()).into_iter().flatten() {
                if store.exists(dump, dump.path_in_bundle(path))? {
                    candidates.push(dump.clone());
                }
            }
        }
        if !candidates.is_empty() {
            let dumps = select(candidates);
            tracing::debug!(
                repo = %repo.name,
                %commit,
                distance,
                found = dumps.len(),
                visited = visited.len(),
                "closest dumps resolved"
            );
            return Ok(dumps);
        }

        if distance >= settings.max_traversal_distance {
            break;
        }
        if graph.is_none() {
            graph = Some(vcs.commit_graph(ctx, repo)?);
        }
        let Some(graph) = graph.as_ref() else {
            break;
        };
        let mut next = Vec::new();
        'expand: for c in &frontier {
            let neighbors = graph.neighbors(c);
            for n in neighbors.parents.into_iter().chain(neighbors.children) {
                if visited.len() >= settings.max_visited_commits {
                    tracing::debug!(limit = settings.max_visited_commits, "commit visit limit reached");
                    break 'expand;
                }
                if visited.insert(n.clone()) {
                    next.push(n);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
        distance += 1;
    }

    tracing::debug!(repo = %repo.name, %commit, %path, distance, "no dump within bounds");
    Ok(Vec::new())
}

/// Most specific root first, then most recent.
fn preference(a: &Dump, b: &Dump) -> Ordering {
    b.root
        .len()
        .cmp(&a.root.len())
        .then_with(|| b.finished_at.cmp(&a.finished_at))
        .then_with(|| b.id.cmp(&a.id))
}

/// Keep the best dump per indexer.
fn select(mut candidates: Vec<Dump>) -> Vec<Dump> {
    candidates.sort_by(preference);
    let mut scopes: HashSet<(String, String, String)> = HashSet::new();
    let mut indexers: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for dump in candidates {
        let scope = (dump.commit.clone(), dump.indexer.clone(), dump.root.clone());
        if !scopes.insert(scope) {
            tracing::error!(
                upload_id = dump.id,
                commit = %dump.commit,
                indexer = %dump.indexer,
                root = %dump.root,
                "several latest uploads for one scope; keeping the most recent"
            );
            continue;
        }
        if indexers.insert(dump.indexer.clone()) {
            out.push(dump);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::uploads::tests::{completed_upload, test_db};
    use crate::error::CodeIntelError;
    use crate::operations::testing::{repository, temp_store, BundleBuilder, FakeVcs};
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn resolve(
        db: &Database,
        vcs: &FakeVcs,
        store: &dyn ArtifactStore,
        commit: &str,
        path: &str,
        settings: &ResolutionSettings,
    ) -> Result<Vec<Dump>> {
        find_closest_dumps(
            &RequestContext::new(),
            db,
            vcs,
            store,
            &repository(1),
            commit,
            path,
            None,
            settings,
        )
    }

    #[test]
    fn line_graph_finds_dump_from_both_directions() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let b = completed_upload(&mut db, repo, "B", "/", "lsif-go");
        BundleBuilder::default().file("x.go").store(&store, b);
        let vcs = FakeVcs::line(&["A", "B", "C", "D"]);
        let settings = ResolutionSettings::default();

        for start in ["D", "A", "B"] {
            let dumps = resolve(&db, &vcs, &store, start, "x.go", &settings).unwrap();
            assert_eq!(dumps.len(), 1, "from {start}");
            assert_eq!(dumps[0].id, b);
        }
    }

    #[test]
    fn no_dumps_is_empty_not_error() {
        let (db, _) = test_db();
        let (_tmp, store) = temp_store();
        let vcs = FakeVcs::line(&["A", "B"]);
        let dumps = resolve(&db, &vcs, &store, "B", "x.go", &ResolutionSettings::default()).unwrap();
        assert!(dumps.is_empty());
        assert_eq!(vcs.graph_loads.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn graph_is_loaded_once_per_resolution() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let a = completed_upload(&mut db, repo, "A", "", "lsif-go");
        BundleBuilder::default().file("x.go").store(&store, a);
        let vcs = FakeVcs::line(&["A", "B", "C", "D", "E"]);

        let dumps = resolve(&db, &vcs, &store, "E", "x.go", &ResolutionSettings::default()).unwrap();
        assert_eq!(dumps[0].id, a);
        assert_eq!(vcs.graph_loads.load(AtomicOrdering::SeqCst), 1);

        resolve(&db, &vcs, &store, "A", "x.go", &ResolutionSettings::default()).unwrap();
        assert_eq!(vcs.graph_loads.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn symbolic_revision_finds_dump_at_its_commit() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let parent = completed_upload(&mut db, repo, "A", "", "lsif-go");
        let tip = completed_upload(&mut db, repo, "B", "", "lsif-go");
        BundleBuilder::default().file("x.go").store(&store, parent);
        BundleBuilder::default().file("x.go").store(&store, tip);
        let vcs = FakeVcs::line(&["A", "B"]).with_ref("main", "B");

        for rev in ["HEAD", "main", "B"] {
            let dumps = resolve(&db, &vcs, &store, rev, "x.go", &ResolutionSettings::default())
                .unwrap();
            assert_eq!(dumps.len(), 1, "at {rev}");
            assert_eq!(dumps[0].id, tip, "at {rev}");
        }
        let err = resolve(&db, &vcs, &store, "nope", "x.go", &ResolutionSettings::default())
            .unwrap_err();
        assert!(matches!(err, CodeIntelError::InvalidRevision { .. }));
    }

    #[test]
    fn more_specific_root_wins_at_equal_distance() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let lib = completed_upload(&mut db, repo, "B", "/lib", "lsif-go");
        let sub = completed_upload(&mut db, repo, "B", "/lib/sub", "lsif-go");
        BundleBuilder::default().file("sub/x.go").store(&store, lib);
        BundleBuilder::default().file("x.go").store(&store, sub);
        let vcs = FakeVcs::line(&["A", "B", "C"]);

        let dumps = resolve(&db, &vcs, &store, "C", "/lib/sub/x.go", &ResolutionSettings::default())
            .unwrap();
        assert_eq!(dumps.len(), 1);
        assert_eq!(dumps[0].id, sub);
        assert_eq!(dumps[0].root, "lib/sub");
    }

    #[test]
    fn one_dump_per_indexer_ordered_by_root_length() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let go = completed_upload(&mut db, repo, "B", "", "lsif-go");
        let ts = completed_upload(&mut db, repo, "B", "cmd", "lsif-tsc");
        BundleBuilder::default().file("cmd/x.go").store(&store, go);
        BundleBuilder::default().file("x.go").store(&store, ts);
        let vcs = FakeVcs::line(&["B"]);

        let dumps = resolve(&db, &vcs, &store, "B", "cmd/x.go", &ResolutionSettings::default()).unwrap();
        let ids: Vec<i64> = dumps.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![ts, go]);
    }

    #[test]
    fn nearer_commit_beats_more_specific_root() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let near = completed_upload(&mut db, repo, "C", "", "lsif-go");
        let far = completed_upload(&mut db, repo, "A", "lib", "lsif-go");
        BundleBuilder::default().file("lib/x.go").store(&store, near);
        BundleBuilder::default().file("x.go").store(&store, far);
        let vcs = FakeVcs::line(&["A", "B", "C", "D"]);

        let dumps = resolve(&db, &vcs, &store, "D", "lib/x.go", &ResolutionSettings::default()).unwrap();
        assert_eq!(dumps.len(), 1);
        assert_eq!(dumps[0].id, near);
    }

    #[test]
    fn dumps_without_the_file_are_skipped() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let c = completed_upload(&mut db, repo, "C", "", "lsif-go");
        let b = completed_upload(&mut db, repo, "B", "", "lsif-go");
        BundleBuilder::default().file("other.go").store(&store, c);
        BundleBuilder::default().file("x.go").store(&store, b);
        let vcs = FakeVcs::line(&["A", "B", "C", "D"]);

        let dumps = resolve(&db, &vcs, &store, "D", "x.go", &ResolutionSettings::default()).unwrap();
        assert_eq!(dumps[0].id, b);
    }

    #[test]
    fn traversal_distance_bounds_search() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let a = completed_upload(&mut db, repo, "A", "", "lsif-go");
        BundleBuilder::default().file("x.go").store(&store, a);
        let vcs = FakeVcs::line(&["A", "B", "C", "D"]);

        let near = ResolutionSettings {
            max_traversal_distance: 2,
            ..Default::default()
        };
        assert!(resolve(&db, &vcs, &store, "D", "x.go", &near).unwrap().is_empty());
        let far = ResolutionSettings {
            max_traversal_distance: 3,
            ..Default::default()
        };
        assert_eq!(resolve(&db, &vcs, &store, "D", "x.go", &far).unwrap().len(), 1);

        let few = ResolutionSettings {
            max_visited_commits: 2,
            ..Default::default()
        };
        assert!(resolve(&db, &vcs, &store, "D", "x.go", &few).unwrap().is_empty());
    }

    #[test]
    fn duplicate_latest_scope_keeps_most_recent() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        let older = completed_upload(&mut db, repo, "B", "", "lsif-go");
        let newer = completed_upload(&mut db, repo, "B", "", "lsif-go");
        db.conn()
            .execute("UPDATE uploads SET is_latest = 1", [])
            .unwrap();
        db.conn()
            .execute(
                "UPDATE uploads SET finished_at = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
                rusqlite::params![older],
            )
            .unwrap();
        BundleBuilder::default().file("x.go").store(&store, older);
        BundleBuilder::default().file("x.go").store(&store, newer);
        let vcs = FakeVcs::line(&["B"]);

        let dumps = resolve(&db, &vcs, &store, "B", "x.go", &ResolutionSettings::default()).unwrap();
        assert_eq!(dumps.len(), 1);
        assert_eq!(dumps[0].id, newer);
    }

    #[test]
    fn option_like_commit_is_rejected() {
        let (db, _) = test_db();
        let (_tmp, store) = temp_store();
        let vcs = FakeVcs::default();
        let err = resolve(&db, &vcs, &store, "--all", "x.go", &ResolutionSettings::default())
            .unwrap_err();
        assert!(matches!(err, CodeIntelError::InvalidRevision { .. }));
    }

    #[test]
    fn canceled_context_stops_walk() {
        let (mut db, repo) = test_db();
        let (_tmp, store) = temp_store();
        completed_upload(&mut db, repo, "A", "", "lsif-go");
        let vcs = FakeVcs::line(&["A", "B"]);
        let ctx = RequestContext::new();
        ctx.cancel();
        let err = find_closest_dumps(
            &ctx,
            &db,
            &vcs,
            &store,
            &repository(1),
            "B",
            "x.go",
            None,
            &ResolutionSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CodeIntelError::Canceled));
    }
}
