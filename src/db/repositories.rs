use rusqlite::params;

use crate::error::{CodeIntelError, Result};
use crate::models::Repository;

use super::schema::NOW;
use super::Database;

fn map_repository(row: &rusqlite::Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        tip_commit: row.get(3)?,
        tip_updated_at: row.get(4)?,
    })
}

impl Database {
    /// Register a repository, or update the path of an existing one. Returns its ID.
    pub fn upsert_repository(&self, name: &str, path: &str) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO repositories (name, path) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET path = ?2",
            params![name, path],
        )?;
        // last_insert_rowid() is unreliable for ON CONFLICT DO UPDATE
        let id: i64 = self.conn().query_row(
            "SELECT id FROM repositories WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_repository(&self, id: i64) -> Result<Option<Repository>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, path, tip_commit, tip_updated_at FROM repositories WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], map_repository)?;
        match rows.next() {
            Some(r) => Ok(Some(r?)),
            None => Ok(None),
        }
    }

    /// Like [`Database::get_repository`] but absence is an error.
    pub fn require_repository(&self, id: i64) -> Result<Repository> {
        self.get_repository(id)?.ok_or(CodeIntelError::NotFound {
            what: "repository",
            id,
        })
    }

    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, path, tip_commit, tip_updated_at FROM repositories ORDER BY name",
        )?;
        let rows = stmt.query_map([], map_repository)?;
        let mut repos = Vec::new();
        for r in rows {
            repos.push(r?);
        }
        Ok(repos)
    }

    /// Persist the tip commit marker. Last writer wins.
    pub fn set_tip_commit(&self, repository_id: i64, commit: &str) -> Result<()> {
        let updated = self.conn().execute(
            &format!(
                "UPDATE repositories SET tip_commit = ?1, tip_updated_at = {NOW} WHERE id = ?2"
            ),
            params![commit, repository_id],
        )?;
        if updated == 0 {
            return Err(CodeIntelError::NotFound {
                what: "repository",
                id: repository_id,
            });
        }
        Ok(())
    }
}
