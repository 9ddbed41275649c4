use rusqlite::{params, OptionalExtension};

use crate::config::PaginationSettings;
use crate::error::Result;
use crate::models::{JobState, NewUpload, Upload, UploadFilter};
use crate::pagination::{CursorCodec, ListingFilter, ListingKind, Page};

use super::queries::{
    self, fetch_page, filter_state, place_in_queue_sql, state_column, ListQuery, ListSpec,
};
use super::Database;

const UPLOAD_COLUMNS: &str = "t.id, t.repository_id, t.commit_hash, t.root, t.indexer, t.state, \
     t.failure_message, t.is_latest, t.uploaded_at, t.started_at, t.finished_at";

fn upload_select() -> String {
    format!(
        "{UPLOAD_COLUMNS}, {}",
        place_in_queue_sql("uploads", "uploaded_at")
    )
}

fn map_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<Upload> {
    Ok(Upload {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        commit: row.get(2)?,
        root: row.get(3)?,
        indexer: row.get(4)?,
        state: state_column(row, 5)?,
        failure_message: row.get(6)?,
        is_latest: row.get(7)?,
        uploaded_at: row.get(8)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
        place_in_queue: row.get::<_, Option<i64>>(11)?.map(|p| p as u32),
    })
}

impl Database {
    // ─── Upload records ───

    /// Record a newly accepted bundle in state `queued`. Returns the row ID.
    pub fn insert_upload(&self, upload: &NewUpload) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO uploads (repository_id, commit_hash, root, indexer) VALUES (?1, ?2, ?3, ?4)",
            params![
                upload.repository_id,
                upload.commit,
                upload.root,
                upload.indexer
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_upload_by_id(&self, id: i64) -> Result<Option<Upload>> {
        let sql = format!("SELECT {} FROM uploads t WHERE t.id = ?1", upload_select());
        Ok(self
            .conn()
            .query_row(&sql, params![id], map_upload)
            .optional()?)
    }

    /// One page of uploads, newest first.
    ///
    /// With `filter.after` set the listing continues under the filter the
    /// token was issued with; fields restated in `filter` must match it.
    pub fn list_uploads(
        &self,
        filter: &UploadFilter,
        codec: &CursorCodec,
        pagination: &PaginationSettings,
    ) -> Result<Page<Upload>> {
        let requested = ListingFilter {
            repository_id: filter.repository_id,
            query: ListingFilter::normalize_query(filter.query.as_deref()),
            state: filter.state.map(|s| s.as_str().to_string()),
            is_latest: filter.is_latest,
            limit: filter.limit.map(|l| pagination.clamp_limit(Some(l))),
        };
        let (effective, position) =
            codec.resume(filter.after.as_deref(), ListingKind::Uploads, requested)?;

        let mut query = ListQuery::default();
        if let Some(repository_id) = effective.repository_id {
            query.eq("repository_id", repository_id);
        }
        if let Some(state) = filter_state(&effective)? {
            query.eq("state", state.as_str().to_string());
        }
        if let Some(is_latest) = effective.is_latest {
            query.eq("is_latest", i64::from(is_latest));
        }
        if let Some(text) = &effective.query {
            query.text_terms(text, &["commit_hash", "indexer", "root", "failure_message"]);
        }

        let select = upload_select();
        let spec = ListSpec {
            kind: ListingKind::Uploads,
            table: "uploads",
            select: &select,
            ts_column: "uploaded_at",
        };
        fetch_page(
            self.conn(),
            &spec,
            query,
            position.as_ref(),
            &effective,
            pagination.clamp_limit(effective.limit),
            codec,
            map_upload,
            |u: &Upload| (u.uploaded_at.clone(), u.id),
        )
    }

    // ─── State transitions ───

    pub fn mark_upload_processing(&self, id: i64) -> Result<()> {
        queries::transition(self.conn(), "uploads", "upload", id, JobState::Processing, None)?;
        tracing::info!(upload_id = id, "upload processing");
        Ok(())
    }

    pub fn mark_upload_errored(&self, id: i64, failure_message: &str) -> Result<()> {
        queries::transition(
            self.conn(),
            "uploads",
            "upload",
            id,
            JobState::Errored,
            Some(failure_message),
        )?;
        tracing::info!(upload_id = id, failure_message, "upload errored");
        Ok(())
    }

    /// Complete an upload and make it the latest for its
    /// (repository, commit, indexer, root) scope, superseding older ones.
    pub fn mark_upload_completed(&mut self, id: i64) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        queries::transition(&tx, "uploads", "upload", id, JobState::Completed, None)?;
        let superseded = tx.execute(
            "UPDATE uploads SET is_latest = 0
             WHERE id != ?1 AND is_latest = 1 AND (repository_id, commit_hash, indexer, root) =
                 (SELECT repository_id, commit_hash, indexer, root FROM uploads WHERE id = ?1)",
            params![id],
        )?;
        tx.execute("UPDATE uploads SET is_latest = 1 WHERE id = ?1", params![id])?;
        tx.commit()?;
        tracing::info!(upload_id = id, superseded, "upload completed");
        Ok(())
    }

    /// Delete an upload. Returns its repository when a row was removed.
    ///
    /// If the upload was the latest for its scope, the most recently finished
    /// remaining completed upload of that scope becomes latest.
    pub fn delete_upload_by_id(&mut self, id: i64) -> Result<Option<i64>> {
        let tx = self.conn_mut().transaction()?;
        let row: Option<(i64, String, String, String, bool)> = tx
            .query_row(
                "SELECT repository_id, commit_hash, indexer, root, is_latest FROM uploads WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()?;
        let Some((repository_id, commit, indexer, root, was_latest)) = row else {
            return Ok(None);
        };

        tx.execute("DELETE FROM uploads WHERE id = ?1", params![id])?;
        if was_latest {
            let promoted = tx.execute(
                "UPDATE uploads SET is_latest = 1 WHERE id = (
                     SELECT id FROM uploads
                     WHERE repository_id = ?1 AND commit_hash = ?2 AND indexer = ?3 AND root = ?4
                       AND state = 'completed'
                     ORDER BY finished_at DESC, id DESC LIMIT 1)",
                params![repository_id, commit, indexer, root],
            )?;
            tracing::debug!(upload_id = id, promoted, "latest upload replaced");
        }
        tx.commit()?;
        Ok(Some(repository_id))
    }

    // ─── Resolution snapshot ───

    /// All completed, latest uploads of a repository in one statement.
    ///
    /// The closest-dump search reads this once per call so that it never
    /// mixes two generations of `is_latest` state.
    pub fn completed_latest_uploads(
        &self,
        repository_id: i64,
        indexer: Option<&str>,
    ) -> Result<Vec<Upload>> {
        let sql = format!(
            "SELECT {UPLOAD_COLUMNS}, NULL FROM uploads t
             WHERE t.repository_id = ?1 AND t.state = 'completed' AND t.is_latest = 1
               AND (?2 IS NULL OR t.indexer = ?2)
             ORDER BY t.finished_at DESC, t.id DESC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![repository_id, indexer], map_upload)?;
        let mut uploads = Vec::new();
        for r in rows {
            uploads.push(r?);
        }
        Ok(uploads)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::CodeIntelError;

    pub(crate) fn test_db() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let repo = db.upsert_repository("github.com/test/repo", "/src/repo").unwrap();
        (db, repo)
    }

    /// Insert an upload and drive it to `completed`.
    pub(crate) fn completed_upload(
        db: &mut Database,
        repo: i64,
        commit: &str,
        root: &str,
        indexer: &str,
    ) -> i64 {
        let id = db
            .insert_upload(&NewUpload::new(repo, commit, root, indexer))
            .unwrap();
        db.mark_upload_processing(id).unwrap();
        db.mark_upload_completed(id).unwrap();
        id
    }

    fn set_uploaded_at(db: &Database, id: i64, ts: &str) {
        db.conn()
            .execute(
                "UPDATE uploads SET uploaded_at = ?1 WHERE id = ?2",
                params![ts, id],
            )
            .unwrap();
    }

    fn codec() -> CursorCodec {
        CursorCodec::new("test-secret")
    }

    fn page_ids(page: &Page<Upload>) -> Vec<i64> {
        page.items.iter().map(|u| u.id).collect()
    }

    #[test]
    fn insert_and_get_upload() {
        let (db, repo) = test_db();
        let id = db
            .insert_upload(&NewUpload::new(repo, "deadbeef", "/cmd/", "lsif-go"))
            .unwrap();
        let got = db.get_upload_by_id(id).unwrap().unwrap();
        assert_eq!(got.state, JobState::Queued);
        assert_eq!(got.root, "cmd");
        assert!(!got.is_latest);
        assert_eq!(got.place_in_queue, Some(1));
        assert!(db.get_upload_by_id(id + 100).unwrap().is_none());
    }

    #[test]
    fn place_in_queue_counts_older_queued() {
        let (db, repo) = test_db();
        let a = db.insert_upload(&NewUpload::new(repo, "a", "", "x")).unwrap();
        let b = db.insert_upload(&NewUpload::new(repo, "b", "", "x")).unwrap();
        set_uploaded_at(&db, a, "2024-01-01T00:00:00.000Z");
        set_uploaded_at(&db, b, "2024-01-01T00:00:01.000Z");
        assert_eq!(db.get_upload_by_id(b).unwrap().unwrap().place_in_queue, Some(2));
        db.mark_upload_processing(a).unwrap();
        let a_row = db.get_upload_by_id(a).unwrap().unwrap();
        assert_eq!(a_row.place_in_queue, None);
        assert!(a_row.started_at.is_some());
        assert_eq!(db.get_upload_by_id(b).unwrap().unwrap().place_in_queue, Some(1));
    }

    #[test]
    fn completion_supersedes_same_scope() {
        let (mut db, repo) = test_db();
        let first = completed_upload(&mut db, repo, "c1", "", "lsif-go");
        let other_root = completed_upload(&mut db, repo, "c1", "sub", "lsif-go");
        let second = completed_upload(&mut db, repo, "c1", "", "lsif-go");

        assert!(!db.get_upload_by_id(first).unwrap().unwrap().is_latest);
        assert!(db.get_upload_by_id(second).unwrap().unwrap().is_latest);
        assert!(db.get_upload_by_id(other_root).unwrap().unwrap().is_latest);

        let snapshot = db.completed_latest_uploads(repo, None).unwrap();
        let ids: Vec<i64> = snapshot.iter().map(|u| u.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&second) && ids.contains(&other_root));
    }

    #[test]
    fn snapshot_filters_by_indexer() {
        let (mut db, repo) = test_db();
        completed_upload(&mut db, repo, "c1", "", "lsif-go");
        let ts = completed_upload(&mut db, repo, "c1", "", "lsif-tsc");
        let only_ts = db.completed_latest_uploads(repo, Some("lsif-tsc")).unwrap();
        assert_eq!(only_ts.len(), 1);
        assert_eq!(only_ts[0].id, ts);
    }

    #[test]
    fn terminal_transitions_are_exclusive() {
        let (mut db, repo) = test_db();
        let id = db.insert_upload(&NewUpload::new(repo, "c", "", "x")).unwrap();

        // cannot complete straight from queued
        assert!(matches!(
            db.mark_upload_completed(id),
            Err(CodeIntelError::InvalidTransition { .. })
        ));
        db.mark_upload_processing(id).unwrap();
        db.mark_upload_errored(id, "bad bundle").unwrap();
        assert!(matches!(
            db.mark_upload_completed(id),
            Err(CodeIntelError::InvalidTransition { .. })
        ));

        let got = db.get_upload_by_id(id).unwrap().unwrap();
        assert_eq!(got.state, JobState::Errored);
        assert_eq!(got.failure_message.as_deref(), Some("bad bundle"));
        assert!(!got.is_latest);
        assert!(got.finished_at.is_some());
    }

    #[test]
    fn transition_on_missing_row_is_not_found() {
        let (db, _) = test_db();
        assert!(matches!(
            db.mark_upload_processing(404),
            Err(CodeIntelError::NotFound { what: "upload", id: 404 })
        ));
    }

    #[test]
    fn delete_promotes_previous_latest() {
        let (mut db, repo) = test_db();
        let older = completed_upload(&mut db, repo, "c1", "", "lsif-go");
        let newer = completed_upload(&mut db, repo, "c1", "", "lsif-go");

        assert_eq!(db.delete_upload_by_id(newer).unwrap(), Some(repo));
        assert!(db.get_upload_by_id(newer).unwrap().is_none());
        assert!(db.get_upload_by_id(older).unwrap().unwrap().is_latest);
        assert_eq!(db.delete_upload_by_id(newer).unwrap(), None);
    }

    #[test]
    fn pagination_is_stable_under_inserts() {
        let (db, repo) = test_db();
        let mut ids = Vec::new();
        for (i, commit) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            let id = db.insert_upload(&NewUpload::new(repo, commit, "", "x")).unwrap();
            set_uploaded_at(&db, id, &format!("2024-01-01T00:00:0{i}.000Z"));
            ids.push(id);
        }
        let settings = PaginationSettings::default();
        let mut filter = UploadFilter {
            limit: Some(2),
            ..Default::default()
        };

        let first = db.list_uploads(&filter, &codec(), &settings).unwrap();
        assert_eq!(page_ids(&first), vec![ids[4], ids[3]]);
        assert_eq!(first.total_count, 5);
        assert!(first.next_cursor.is_some());

        // a sixth, newer record arrives between page fetches
        let late = db.insert_upload(&NewUpload::new(repo, "f", "", "x")).unwrap();
        set_uploaded_at(&db, late, "2024-01-01T00:00:09.000Z");

        filter.after = first.next_cursor.clone();
        let second = db.list_uploads(&filter, &codec(), &settings).unwrap();
        assert_eq!(page_ids(&second), vec![ids[2], ids[1]]);

        filter.after = second.next_cursor.clone();
        let third = db.list_uploads(&filter, &codec(), &settings).unwrap();
        assert_eq!(page_ids(&third), vec![ids[0]]);
        assert!(third.next_cursor.is_none());
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let (db, repo) = test_db();
        let mut ids = Vec::new();
        for commit in ["a", "b", "c"] {
            let id = db.insert_upload(&NewUpload::new(repo, commit, "", "x")).unwrap();
            set_uploaded_at(&db, id, "2024-01-01T00:00:00.000Z");
            ids.push(id);
        }
        let settings = PaginationSettings::default();
        let mut filter = UploadFilter {
            limit: Some(1),
            ..Default::default()
        };
        let mut seen = Vec::new();
        loop {
            let page = db.list_uploads(&filter, &codec(), &settings).unwrap();
            seen.extend(page_ids(&page));
            if page.next_cursor.is_none() {
                break;
            }
            filter.after = page.next_cursor;
        }
        assert_eq!(seen, vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn list_filters_combine() {
        let (mut db, repo) = test_db();
        let other = db.upsert_repository("github.com/test/other", "/src/other").unwrap();
        let go = completed_upload(&mut db, repo, "aaaa1111", "", "lsif-go");
        db.insert_upload(&NewUpload::new(repo, "bbbb2222", "", "lsif-tsc")).unwrap();
        completed_upload(&mut db, other, "aaaa1111", "", "lsif-go");
        let settings = PaginationSettings::default();

        let filter = UploadFilter {
            repository_id: Some(repo),
            state: Some(JobState::Completed),
            is_latest: Some(true),
            query: Some("aaaa LSIF-GO".into()),
            ..Default::default()
        };
        let page = db.list_uploads(&filter, &codec(), &settings).unwrap();
        assert_eq!(page_ids(&page), vec![go]);
        assert_eq!(page.total_count, 1);

        let filter = UploadFilter {
            query: Some("nomatch".into()),
            ..Default::default()
        };
        assert!(db.list_uploads(&filter, &codec(), &settings).unwrap().items.is_empty());
    }

    #[test]
    fn cursor_keeps_the_filter_it_was_issued_with() {
        let (mut db, repo) = test_db();
        let first_done = completed_upload(&mut db, repo, "c1", "", "lsif-go");
        db.insert_upload(&NewUpload::new(repo, "c2", "", "lsif-go")).unwrap();
        let last_done = completed_upload(&mut db, repo, "c3", "", "lsif-go");
        let settings = PaginationSettings::default();

        let filter = UploadFilter {
            state: Some(JobState::Completed),
            limit: Some(1),
            ..Default::default()
        };
        let first = db.list_uploads(&filter, &codec(), &settings).unwrap();
        assert_eq!(page_ids(&first), vec![last_done]);

        // only the token is sent back
        let next = UploadFilter {
            after: first.next_cursor.clone(),
            ..Default::default()
        };
        let second = db.list_uploads(&next, &codec(), &settings).unwrap();
        assert_eq!(page_ids(&second), vec![first_done]);
        assert_eq!(second.total_count, 2);
        assert!(second.next_cursor.is_none());

        let conflicting = UploadFilter {
            state: Some(JobState::Queued),
            after: first.next_cursor,
            ..Default::default()
        };
        assert!(matches!(
            db.list_uploads(&conflicting, &codec(), &settings),
            Err(CodeIntelError::InvalidCursor { .. })
        ));
    }

    #[test]
    fn foreign_or_garbled_cursor_is_invalid() {
        let (db, repo) = test_db();
        db.insert_upload(&NewUpload::new(repo, "a", "", "x")).unwrap();
        let filter = UploadFilter {
            after: Some("not-a-cursor".into()),
            ..Default::default()
        };
        let err = db
            .list_uploads(&filter, &codec(), &PaginationSettings::default())
            .unwrap_err();
        assert!(matches!(err, CodeIntelError::InvalidCursor { .. }));
    }
}
