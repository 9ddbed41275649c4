//! Opaque keyset-pagination cursors.
//!
//! A cursor remembers the sort key of the last row a page returned
//! (enqueue timestamp and id) together with the listing it belongs to and
//! the filter the listing ran with, so later pages need only the token.
//! Tokens are `base64url(payload).base64url(tag)` where the tag is a
//! truncated SHA-256 over a secret and the payload, so clients can only
//! hand back tokens they were given.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CodeIntelError, Result};

/// Bytes of the digest kept as tag.
const TAG_LEN: usize = 16;

/// Which listing a cursor was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Uploads,
    Indexes,
}

/// Normalized filter of a listing, carried inside its cursors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFilter {
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<i64>,
    /// Search terms joined by single spaces; never empty.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    pub is_latest: Option<bool>,
    /// Page size after clamping.
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ListingFilter {
    /// Collapse whitespace in a free-text query; blank queries become `None`.
    #[must_use]
    pub fn normalize_query(query: Option<&str>) -> Option<String> {
        let terms: Vec<&str> = query?.split_whitespace().collect();
        (!terms.is_empty()).then(|| terms.join(" "))
    }

    /// Fill unset fields from `issued`. A field set on both sides must agree.
    fn resume_from(self, issued: ListingFilter) -> Result<ListingFilter> {
        fn pick<T: PartialEq>(given: Option<T>, issued: Option<T>, field: &str) -> Result<Option<T>> {
            match (given, issued) {
                (Some(g), Some(i)) if g != i => Err(CodeIntelError::InvalidCursor {
                    reason: format!("{field} differs from the listing the token was issued for"),
                }),
                (Some(g), _) => Ok(Some(g)),
                (None, i) => Ok(i),
            }
        }
        Ok(ListingFilter {
            repository_id: pick(self.repository_id, issued.repository_id, "repository")?,
            query: pick(self.query, issued.query, "query")?,
            state: pick(self.state, issued.state, "state")?,
            is_latest: pick(self.is_latest, issued.is_latest, "latest")?,
            limit: pick(self.limit, issued.limit, "limit")?,
        })
    }
}

/// Resume point: rows strictly after `(timestamp, id)` in descending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    #[serde(rename = "k")]
    pub kind: ListingKind,
    #[serde(rename = "t")]
    pub timestamp: String,
    #[serde(rename = "i")]
    pub id: i64,
    #[serde(rename = "f", default)]
    pub filter: ListingFilter,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Best-effort snapshot of the total matching rows.
    pub total_count: u64,
}

/// Encodes and verifies cursors with one secret.
#[derive(Debug, Clone)]
pub struct CursorCodec {
    secret: String,
}

impl CursorCodec {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn tag(&self, payload: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update((self.secret.len() as u64).to_be_bytes());
        hasher.update(self.secret.as_bytes());
        hasher.update(payload);
        hasher.finalize()[..TAG_LEN].to_vec()
    }

    pub fn encode(&self, position: &CursorPosition) -> Result<String> {
        let payload = serde_json::to_vec(position)?;
        let tag = self.tag(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Decode a token issued for `expected` listings.
    pub fn decode(&self, token: &str, expected: ListingKind) -> Result<CursorPosition> {
        let invalid = |reason: &str| CodeIntelError::InvalidCursor {
            reason: reason.to_string(),
        };
        let (payload_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| invalid("malformed token"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| invalid("malformed token"))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| invalid("malformed token"))?;
        if tag != self.tag(&payload) {
            return Err(invalid("token was not issued by this server"));
        }
        let position: CursorPosition =
            serde_json::from_slice(&payload).map_err(|_| invalid("malformed payload"))?;
        if position.kind != expected {
            return Err(invalid("token belongs to a different listing"));
        }
        Ok(position)
    }

    /// Effective filter and resume point for one page request.
    ///
    /// Without a token the requested filter is used as is. With one, the
    /// filter it was issued under applies and the request may only restate it.
    pub fn resume(
        &self,
        token: Option<&str>,
        kind: ListingKind,
        requested: ListingFilter,
    ) -> Result<(ListingFilter, Option<CursorPosition>)> {
        let Some(token) = token else {
            return Ok((requested, None));
        };
        let position = self.decode(token, kind)?;
        let filter = requested.resume_from(position.filter.clone())?;
        Ok((filter, Some(position)))
    }
}

/// Derive a stable secret from some installation-specific seed.
#[must_use]
pub fn derive_secret(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"codeintel-cursor:");
    hasher.update(seed.as_bytes());
    format!("{:x}", hasher.finalize())
}
