use serde::Serialize;

use crate::error::CodeIntelError;

/// Format a result as compact JSON.
pub fn format_json<T: Serialize>(result: &T) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// One error as reported to callers.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub kind: &'static str,
}

impl From<&CodeIntelError> for ErrorReport {
    fn from(err: &CodeIntelError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().as_str(),
        }
    }
}

/// Format an error as JSON with its classification.
pub fn format_error(err: &CodeIntelError) -> String {
    format_json(&ErrorReport::from(err))
}
