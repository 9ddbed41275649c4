use thiserror::Error;

/// Coarse classification of every error the crate returns.
///
/// Callers (the API layer, the CLI) use this to decide between client
/// errors, retryable upstream failures and hard storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Upstream,
    Storage,
    Inconsistent,
    Canceled,
    Config,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Upstream => "upstream",
            Self::Storage => "storage",
            Self::Inconsistent => "inconsistent",
            Self::Canceled => "canceled",
            Self::Config => "config",
        }
    }
}

#[derive(Error, Debug)]
pub enum CodeIntelError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid diff range argument: {range:?}")]
    InvalidRange { range: String },

    #[error("invalid revision: {rev:?}")]
    InvalidRevision { rev: String },

    #[error("invalid cursor: {reason}")]
    InvalidCursor { reason: String },

    #[error("unknown diagnostic severity {severity}")]
    UnknownSeverity { severity: i64 },

    #[error("{kind} {id} cannot move to state {to}")]
    InvalidTransition {
        kind: &'static str,
        id: i64,
        to: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: i64 },

    #[error("{command} failed: {detail}")]
    Vcs { command: String, detail: String },

    #[error("diff parse error at line {line}: {detail}")]
    DiffParse { line: usize, detail: String },

    #[error("artifact store error: {0}")]
    ArtifactStore(String),

    #[error("upload {upload_id} deleted but tip commit recomputation failed: {source}")]
    TipRecomputation {
        upload_id: i64,
        #[source]
        source: Box<CodeIntelError>,
    },

    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("operation canceled")]
    Canceled,

    #[error("config error: {0}")]
    Config(String),
}

impl CodeIntelError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRange { .. }
            | Self::InvalidRevision { .. }
            | Self::InvalidCursor { .. }
            | Self::UnknownSeverity { .. }
            | Self::InvalidTransition { .. }
            | Self::InvalidArgument(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Vcs { .. }
            | Self::DiffParse { .. }
            | Self::ArtifactStore(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::TipRecomputation { .. } => ErrorKind::Upstream,
            Self::Database(_) => ErrorKind::Storage,
            Self::Inconsistent(_) => ErrorKind::Inconsistent,
            Self::Canceled => ErrorKind::Canceled,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, CodeIntelError>;
