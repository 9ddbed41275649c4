use serde::{Deserialize, Serialize};

use super::location::{Located, Range};
use crate::error::{CodeIntelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    /// Map the LSP integer encoding; anything outside 1..=4 is rejected.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Self::Error),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Information),
            4 => Ok(Self::Hint),
            other => Err(CodeIntelError::UnknownSeverity { severity: other }),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Information => "INFORMATION",
            Self::Hint => "HINT",
        }
    }
}

/// A diagnostic as stored in a bundle: severity still an integer,
/// path relative to the bundle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDiagnostic {
    pub path: String,
    pub severity: i64,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,
    pub range: Range,
}

impl Located for RawDiagnostic {
    fn path(&self) -> &str {
        &self.path
    }

    fn range(&self) -> Range {
        self.range
    }

    fn relocated(self, path: String, range: Range) -> Self {
        Self {
            path,
            range,
            ..self
        }
    }
}

/// A diagnostic ready to hand to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub range: Range,
    /// Upload the diagnostic came from.
    pub dump_id: i64,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl RawDiagnostic {
    /// Resolve the severity; on failure only this diagnostic is lost.
    pub fn into_diagnostic(self, dump_id: i64) -> Result<Diagnostic> {
        let severity = Severity::from_code(self.severity)?;
        Ok(Diagnostic {
            path: self.path,
            severity,
            code: non_empty(self.code),
            source: non_empty(self.source),
            message: non_empty(self.message),
            range: self.range,
            dump_id,
        })
    }
}
