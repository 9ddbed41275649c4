//! Filtered, keyset-paginated listing shared by uploads and index jobs.

use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::error::{CodeIntelError, Result};
use crate::models::JobState;
use crate::pagination::{CursorCodec, CursorPosition, ListingFilter, ListingKind, Page};

use super::schema::NOW;

/// Static description of one listable table.
pub(crate) struct ListSpec<'a> {
    pub kind: ListingKind,
    /// Table name, aliased as `t` in `select`.
    pub table: &'static str,
    /// Column list selected for each row.
    pub select: &'a str,
    /// Enqueue timestamp column used as the primary sort key.
    pub ts_column: &'static str,
}

/// Accumulates `WHERE` conditions and their bind values.
#[derive(Debug, Clone, Default)]
pub(crate) struct ListQuery {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl ListQuery {
    pub fn eq(&mut self, column: &str, value: impl Into<Value>) {
        self.params.push(value.into());
        self.conditions
            .push(format!("t.{column} = ?{}", self.params.len()));
    }

    /// Every whitespace-separated term must occur in at least one column.
    pub fn text_terms(&mut self, query: &str, columns: &[&str]) {
        for term in query.split_whitespace() {
            self.params.push(Value::Text(format!("%{}%", escape_like(term))));
            let n = self.params.len();
            let ors: Vec<String> = columns
                .iter()
                .map(|c| format!("COALESCE(t.{c}, '') LIKE ?{n} ESCAPE '\\'"))
                .collect();
            self.conditions.push(format!("({})", ors.join(" OR ")));
        }
    }

    /// Rows strictly after `(ts, id)` in `(ts DESC, id DESC)` order.
    fn after(&mut self, ts_column: &str, position: &CursorPosition) {
        self.params.push(Value::Text(position.timestamp.clone()));
        let ts = self.params.len();
        self.params.push(Value::Integer(position.id));
        let id = self.params.len();
        self.conditions.push(format!(
            "(t.{ts_column} < ?{ts} OR (t.{ts_column} = ?{ts} AND t.id < ?{id}))"
        ));
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Run one page of a listing.
///
/// `query` must have been built from `filter`, which the next cursor
/// carries. The count is taken without the cursor condition and is only a
/// snapshot; rows inserted between pages are never returned twice because
/// each page starts strictly after the previous page's last key.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fetch_page<T>(
    conn: &Connection,
    spec: &ListSpec<'_>,
    mut query: ListQuery,
    position: Option<&CursorPosition>,
    filter: &ListingFilter,
    limit: u32,
    codec: &CursorCodec,
    map_row: impl Fn(&Row<'_>) -> rusqlite::Result<T>,
    sort_key: impl Fn(&T) -> (String, i64),
) -> Result<Page<T>> {
    let count_sql = format!(
        "SELECT COUNT(*) FROM {} t{}",
        spec.table,
        query.where_clause()
    );
    let total_count: i64 =
        conn.query_row(&count_sql, params_from_iter(query.params.iter()), |r| {
            r.get(0)
        })?;

    if let Some(position) = position {
        query.after(spec.ts_column, position);
    }

    let sql = format!(
        "SELECT {} FROM {} t{} ORDER BY t.{} DESC, t.id DESC LIMIT {}",
        spec.select,
        spec.table,
        query.where_clause(),
        spec.ts_column,
        u64::from(limit) + 1
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(query.params.iter()), map_row)?;
    let mut items = Vec::new();
    for r in rows {
        items.push(r?);
    }

    let next_cursor = if items.len() > limit as usize {
        items.truncate(limit as usize);
        match items.last() {
            Some(last) => {
                let (timestamp, id) = sort_key(last);
                Some(codec.encode(&CursorPosition {
                    kind: spec.kind,
                    timestamp,
                    id,
                    filter: ListingFilter {
                        limit: Some(limit),
                        ..filter.clone()
                    },
                })?)
            }
            None => None,
        }
    } else {
        None
    };

    Ok(Page {
        items,
        next_cursor,
        total_count: total_count as u64,
    })
}

/// Job state stored in a cursor filter.
pub(crate) fn filter_state(filter: &ListingFilter) -> Result<Option<JobState>> {
    filter
        .state
        .as_deref()
        .map(|s| {
            JobState::parse(s).ok_or_else(|| CodeIntelError::InvalidCursor {
                reason: format!("unknown state {s:?}"),
            })
        })
        .transpose()
}

/// Read a job state column, rejecting values outside the state machine.
pub(crate) fn state_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<JobState> {
    let s: String = row.get(idx)?;
    JobState::parse(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown job state {s:?}").into(),
        )
    })
}

/// SQL expression for a queued row's 1-based place in its queue.
pub(crate) fn place_in_queue_sql(table: &str, ts_column: &str) -> String {
    format!(
        "CASE WHEN t.state = 'queued' THEN \
           (SELECT COUNT(*) FROM {table} q WHERE q.state = 'queued' \
              AND (q.{ts_column} < t.{ts_column} OR (q.{ts_column} = t.{ts_column} AND q.id <= t.id))) \
         END"
    )
}

/// Move one row along the job state machine with a single conditional update.
///
/// Only a row currently in the required predecessor state is touched, so two
/// racing terminal transitions cannot both succeed.
pub(crate) fn transition(
    conn: &Connection,
    table: &'static str,
    kind: &'static str,
    id: i64,
    to: JobState,
    failure_message: Option<&str>,
) -> Result<()> {
    let invalid = CodeIntelError::InvalidTransition {
        kind,
        id,
        to: to.as_str(),
    };
    let Some(from) = to.required_predecessor() else {
        return Err(invalid);
    };
    let sql = match to {
        JobState::Processing => format!(
            "UPDATE {table} SET state = ?1, started_at = {NOW} WHERE id = ?2 AND state = ?3"
        ),
        _ => format!(
            "UPDATE {table} SET state = ?1, finished_at = {NOW}, failure_message = ?4 \
             WHERE id = ?2 AND state = ?3"
        ),
    };
    let updated = if to == JobState::Processing {
        conn.execute(&sql, params![to.as_str(), id, from.as_str()])?
    } else {
        conn.execute(&sql, params![to.as_str(), id, from.as_str(), failure_message])?
    };
    if updated == 1 {
        return Ok(());
    }

    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
        params![id],
        |r| r.get(0),
    )?;
    if exists {
        Err(invalid)
    } else {
        Err(CodeIntelError::NotFound { what: kind, id })
    }
}
