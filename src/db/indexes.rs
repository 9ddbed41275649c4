use rusqlite::{params, OptionalExtension};

use crate::config::PaginationSettings;
use crate::error::Result;
use crate::models::{Index, IndexFilter, JobState};
use crate::pagination::{CursorCodec, ListingFilter, ListingKind, Page};

use super::queries::{
    self, fetch_page, filter_state, place_in_queue_sql, state_column, ListQuery, ListSpec,
};
use super::Database;

fn index_select() -> String {
    format!(
        "t.id, t.repository_id, t.commit_hash, t.state, t.failure_message, \
         t.queued_at, t.started_at, t.finished_at, {}",
        place_in_queue_sql("indexes", "queued_at")
    )
}

fn map_index(row: &rusqlite::Row<'_>) -> rusqlite::Result<Index> {
    Ok(Index {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        commit: row.get(2)?,
        state: state_column(row, 3)?,
        failure_message: row.get(4)?,
        queued_at: row.get(5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
        place_in_queue: row.get::<_, Option<i64>>(8)?.map(|p| p as u32),
    })
}

impl Database {
    // ─── Index jobs ───

    /// Queue an indexing job. Returns the row ID.
    pub fn insert_index(&self, repository_id: i64, commit: &str) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO indexes (repository_id, commit_hash) VALUES (?1, ?2)",
            params![repository_id, commit],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_index_by_id(&self, id: i64) -> Result<Option<Index>> {
        let sql = format!("SELECT {} FROM indexes t WHERE t.id = ?1", index_select());
        Ok(self
            .conn()
            .query_row(&sql, params![id], map_index)
            .optional()?)
    }

    /// One page of index jobs, newest first.
    pub fn list_indexes(
        &self,
        filter: &IndexFilter,
        codec: &CursorCodec,
        pagination: &PaginationSettings,
    ) -> Result<Page<Index>> {
        let requested = ListingFilter {
            repository_id: filter.repository_id,
            query: ListingFilter::normalize_query(filter.query.as_deref()),
            state: filter.state.map(|s| s.as_str().to_string()),
            is_latest: None,
            limit: filter.limit.map(|l| pagination.clamp_limit(Some(l))),
        };
        let (effective, position) =
            codec.resume(filter.after.as_deref(), ListingKind::Indexes, requested)?;

        let mut query = ListQuery::default();
        if let Some(repository_id) = effective.repository_id {
            query.eq("repository_id", repository_id);
        }
        if let Some(state) = filter_state(&effective)? {
            query.eq("state", state.as_str().to_string());
        }
        if let Some(text) = &effective.query {
            query.text_terms(text, &["commit_hash", "failure_message"]);
        }

        let select = index_select();
        let spec = ListSpec {
            kind: ListingKind::Indexes,
            table: "indexes",
            select: &select,
            ts_column: "queued_at",
        };
        fetch_page(
            self.conn(),
            &spec,
            query,
            position.as_ref(),
            &effective,
            pagination.clamp_limit(effective.limit),
            codec,
            map_index,
            |i: &Index| (i.queued_at.clone(), i.id),
        )
    }

    pub fn mark_index_processing(&self, id: i64) -> Result<()> {
        queries::transition(self.conn(), "indexes", "index", id, JobState::Processing, None)
    }

    pub fn mark_index_completed(&self, id: i64) -> Result<()> {
        queries::transition(self.conn(), "indexes", "index", id, JobState::Completed, None)
    }

    pub fn mark_index_errored(&self, id: i64, failure_message: &str) -> Result<()> {
        queries::transition(
            self.conn(),
            "indexes",
            "index",
            id,
            JobState::Errored,
            Some(failure_message),
        )
    }

    /// Delete an index job. Returns whether a row existed.
    pub fn delete_index_by_id(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM indexes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::uploads::tests::test_db;
    use crate::error::CodeIntelError;

    #[test]
    fn index_lifecycle() {
        let (db, repo) = test_db();
        let id = db.insert_index(repo, "cafebabe").unwrap();
        let got = db.get_index_by_id(id).unwrap().unwrap();
        assert_eq!(got.state, JobState::Queued);
        assert_eq!(got.place_in_queue, Some(1));

        db.mark_index_processing(id).unwrap();
        db.mark_index_completed(id).unwrap();
        let got = db.get_index_by_id(id).unwrap().unwrap();
        assert_eq!(got.state, JobState::Completed);
        assert!(got.finished_at.is_some());
        assert!(matches!(
            db.mark_index_errored(id, "late failure"),
            Err(CodeIntelError::InvalidTransition { kind: "index", .. })
        ));
    }

    #[test]
    fn delete_index_reports_existence() {
        let (db, repo) = test_db();
        let id = db.insert_index(repo, "c").unwrap();
        assert!(db.delete_index_by_id(id).unwrap());
        assert!(!db.delete_index_by_id(id).unwrap());
        assert!(db.get_index_by_id(id).unwrap().is_none());
    }

    #[test]
    fn list_indexes_pages_and_filters() {
        let (db, repo) = test_db();
        for commit in ["a1", "b2", "c3"] {
            db.insert_index(repo, commit).unwrap();
        }
        let failed = db.insert_index(repo, "d4").unwrap();
        db.mark_index_processing(failed).unwrap();
        db.mark_index_errored(failed, "docker pull timed out").unwrap();

        let codec = CursorCodec::new("k");
        let settings = PaginationSettings::default();
        let filter = IndexFilter {
            query: Some("timed".into()),
            ..Default::default()
        };
        let page = db.list_indexes(&filter, &codec, &settings).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, failed);

        let mut filter = IndexFilter {
            state: Some(JobState::Queued),
            limit: Some(2),
            ..Default::default()
        };
        let first = db.list_indexes(&filter, &codec, &settings).unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total_count, 3);
        filter.after = first.next_cursor;
        let second = db.list_indexes(&filter, &codec, &settings).unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn upload_cursor_rejected_for_indexes() {
        let (db, repo) = test_db();
        for commit in ["a", "b"] {
            db.insert_upload(&crate::models::NewUpload::new(repo, commit, "", "x"))
                .unwrap();
        }
        let codec = CursorCodec::new("k");
        let settings = PaginationSettings::default();
        let uploads = db
            .list_uploads(
                &crate::models::UploadFilter {
                    limit: Some(1),
                    ..Default::default()
                },
                &codec,
                &settings,
            )
            .unwrap();
        let filter = IndexFilter {
            after: uploads.next_cursor,
            ..Default::default()
        };
        assert!(matches!(
            db.list_indexes(&filter, &codec, &settings),
            Err(CodeIntelError::InvalidCursor { .. })
        ));
    }
}
