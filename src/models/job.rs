use serde::Serialize;

/// Lifecycle state shared by uploads and index jobs.
///
/// `queued → processing → {completed, errored}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Errored,
}

impl JobState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "errored" => Some(Self::Errored),
            _ => None,
        }
    }

    /// The state a record must currently be in to move to `self`.
    #[must_use]
    pub fn required_predecessor(&self) -> Option<Self> {
        match self {
            Self::Queued => None,
            Self::Processing => Some(Self::Queued),
            Self::Completed | Self::Errored => Some(Self::Processing),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

/// A state filter as accepted by listings: a concrete state or `any`.
#[must_use]
pub fn parse_state_filter(s: &str) -> Option<Option<JobState>> {
    if s.eq_ignore_ascii_case("any") {
        return Some(None);
    }
    JobState::parse(s).map(Some)
}
