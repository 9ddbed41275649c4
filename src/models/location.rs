use serde::{Deserialize, Serialize};

/// Zero-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub fn new(start_line: u32, start_character: u32, end_line: u32, end_character: u32) -> Self {
        Self {
            start: Position::new(start_line, start_character),
            end: Position::new(end_line, end_character),
        }
    }

    #[must_use]
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }
}

/// A path and range inside one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub range: Range,
}

/// What a located item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Diagnostic,
    Definition,
    Reference,
}

impl ItemKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnostic => "diagnostic",
            Self::Definition => "definition",
            Self::Reference => "reference",
        }
    }
}

/// Anything the aggregator can re-root and move between commits.
pub trait Located: Sized {
    fn path(&self) -> &str;
    fn range(&self) -> Range;
    /// Same item at a different place.
    #[must_use]
    fn relocated(self, path: String, range: Range) -> Self;
}

impl Located for Location {
    fn path(&self) -> &str {
        &self.path
    }

    fn range(&self) -> Range {
        self.range
    }

    fn relocated(self, path: String, range: Range) -> Self {
        Self { path, range }
    }
}
