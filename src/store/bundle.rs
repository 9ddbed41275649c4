use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{CodeIntelError, Result};
use crate::models::dump::root_covers;
use crate::models::{Dump, Location, Position, Range, RawDiagnostic};

use super::ArtifactStore;

/// Contents of one upload's bundle file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bundle {
    /// Keyed by path relative to the upload root.
    #[serde(default)]
    pub documents: BTreeMap<String, Document>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub diagnostics: Vec<BundleDiagnostic>,
    #[serde(default)]
    pub ranges: Vec<RangeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDiagnostic {
    pub severity: i64,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,
    pub range: Range,
}

/// A symbol occurrence and what it links to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeEntry {
    pub range: Range,
    #[serde(default)]
    pub definitions: Vec<Location>,
    #[serde(default)]
    pub references: Vec<Location>,
}

impl Document {
    /// Innermost range containing `position`.
    fn range_at(&self, position: Position) -> Option<&RangeEntry> {
        self.ranges
            .iter()
            .filter(|r| r.range.contains(position))
            .max_by_key(|r| r.range.start)
    }
}

impl Bundle {
    /// Parse and sanity-check bundle JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bundle: Self = serde_json::from_slice(bytes)?;
        for (path, doc) in &bundle.documents {
            if path.starts_with('/') {
                return Err(CodeIntelError::ArtifactStore(format!(
                    "document path must be relative: {path}"
                )));
            }
            if let Some(bad) = doc.ranges.iter().find(|r| r.range.end < r.range.start) {
                return Err(CodeIntelError::ArtifactStore(format!(
                    "inverted range in {path} at line {}",
                    bad.range.start.line
                )));
            }
        }
        Ok(bundle)
    }
}

/// JSON bundles on disk, one `<upload id>.json` per upload.
///
/// Parsed bundles are kept for the lifetime of the store.
#[derive(Debug)]
pub struct BundleStore {
    dir: PathBuf,
    loaded: RwLock<HashMap<i64, Arc<Bundle>>>,
}

impl BundleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn bundle_path(&self, upload_id: i64) -> PathBuf {
        self.dir.join(format!("{upload_id}.json"))
    }

    /// Validate the bundle at `source` and store it for `upload_id`.
    pub fn save_bundle(&self, upload_id: i64, source: &Path) -> Result<()> {
        let bytes = fs::read(source)?;
        let bundle = Bundle::from_slice(&bytes)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.bundle_path(upload_id), &bytes)?;
        tracing::debug!(
            upload_id,
            documents = bundle.documents.len(),
            "bundle stored"
        );
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(upload_id, Arc::new(bundle));
        Ok(())
    }

    /// Store an in-memory bundle for `upload_id`.
    pub fn put_bundle(&self, upload_id: i64, bundle: Bundle) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.bundle_path(upload_id), serde_json::to_vec(&bundle)?)?;
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(upload_id, Arc::new(bundle));
        Ok(())
    }

    /// Remove an upload's bundle. Returns whether a file existed.
    pub fn remove_bundle(&self, upload_id: i64) -> Result<bool> {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&upload_id);
        match fs::remove_file(self.bundle_path(upload_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The bundle for `dump`; uploads without a bundle file read as empty.
    fn load(&self, dump: &Dump) -> Result<Arc<Bundle>> {
        if let Some(b) = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dump.id)
        {
            return Ok(Arc::clone(b));
        }

        let bundle = match fs::read(self.bundle_path(dump.id)) {
            Ok(bytes) => Bundle::from_slice(&bytes).map_err(|e| {
                CodeIntelError::ArtifactStore(format!("bundle for upload {}: {e}", dump.id))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(upload_id = dump.id, "no bundle on disk");
                Bundle::default()
            }
            Err(e) => return Err(e.into()),
        };
        let bundle = Arc::new(bundle);
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dump.id, Arc::clone(&bundle));
        Ok(bundle)
    }
}

impl ArtifactStore for BundleStore {
    fn exists(&self, dump: &Dump, path: &str) -> Result<bool> {
        Ok(self.load(dump)?.documents.contains_key(path))
    }

    fn diagnostics(&self, dump: &Dump, path: &str) -> Result<Vec<RawDiagnostic>> {
        let bundle = self.load(dump)?;
        let mut out = Vec::new();
        for (doc_path, doc) in &bundle.documents {
            if !root_covers(path, doc_path) {
                continue;
            }
            out.extend(doc.diagnostics.iter().map(|d| RawDiagnostic {
                path: doc_path.clone(),
                severity: d.severity,
                code: d.code.clone(),
                source: d.source.clone(),
                message: d.message.clone(),
                range: d.range,
            }));
        }
        Ok(out)
    }

    fn definitions(&self, dump: &Dump, path: &str, position: Position) -> Result<Vec<Location>> {
        let bundle = self.load(dump)?;
        Ok(bundle
            .documents
            .get(path)
            .and_then(|d| d.range_at(position))
            .map(|r| r.definitions.clone())
            .unwrap_or_default())
    }

    fn references(&self, dump: &Dump, path: &str, position: Position) -> Result<Vec<Location>> {
        let bundle = self.load(dump)?;
        Ok(bundle
            .documents
            .get(path)
            .and_then(|d| d.range_at(position))
            .map(|r| r.references.clone())
            .unwrap_or_default())
    }
}
