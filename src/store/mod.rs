//! Artifact store collaborator: where precomputed per-upload data lives.
//!
//! Every path crossing this boundary is relative to the dump root.

pub mod bundle;

use crate::error::Result;
use crate::models::{Dump, Location, Position, RawDiagnostic};

pub use bundle::{Bundle, BundleStore, Document, RangeEntry};

pub trait ArtifactStore: Send + Sync {
    /// Whether the dump has data for exactly this file.
    fn exists(&self, dump: &Dump, path: &str) -> Result<bool>;

    /// Diagnostics for `path`, or for every file below it when it names a
    /// directory. An empty path selects the whole dump.
    fn diagnostics(&self, dump: &Dump, path: &str) -> Result<Vec<RawDiagnostic>>;

    fn definitions(&self, dump: &Dump, path: &str, position: Position) -> Result<Vec<Location>>;

    fn references(&self, dump: &Dump, path: &str, position: Position) -> Result<Vec<Location>>;
}
