use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CodeIntelError, Result};

/// Default directory name for codeintel data.
const DATA_DIR: &str = ".codeintel";
/// Default database filename.
const DB_FILE: &str = "codeintel.db";
/// Config filename.
const CONFIG_FILE: &str = "config.toml";
/// Directory holding one JSON bundle per upload.
const BUNDLES_DIR: &str = "bundles";

/// Project-level configuration resolved from the working directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the `.codeintel/` data directory lives in.
    pub project_root: PathBuf,
    /// Path to the `.codeintel/` directory.
    pub data_dir: PathBuf,
    /// Path to the `SQLite` database.
    pub db_path: PathBuf,
    /// Path to the config file.
    pub config_path: PathBuf,
    /// Directory of the bundle artifact store.
    pub bundles_dir: PathBuf,
    /// User settings loaded from config.toml.
    pub settings: UserSettings,
}

/// User-configurable settings from .codeintel/config.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub resolution: ResolutionSettings,
    pub pagination: PaginationSettings,
    pub vcs: VcsSettings,
    pub logging: LoggingSettings,
}

/// Bounds for the closest-dump commit graph search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSettings {
    /// Maximum number of parent/child hops explored from the requested commit.
    pub max_traversal_distance: u32,
    /// Hard cap on distinct commits visited in one search.
    pub max_visited_commits: usize,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            max_traversal_distance: 100,
            max_visited_commits: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    /// Page size used when the caller gives none.
    pub default_limit: u32,
    /// Largest page size a caller may request.
    pub max_limit: u32,
    /// Key mixed into cursor tags. Derived from the project root when unset.
    pub cursor_secret: Option<String>,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 1000,
            cursor_secret: None,
        }
    }
}

impl PaginationSettings {
    /// Resolve a requested page size against the configured default and bounds.
    #[must_use]
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        let max = self.max_limit.max(1);
        requested.unwrap_or(self.default_limit).clamp(1, max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsSettings {
    /// Git executable to spawn.
    pub git_binary: String,
    /// Value passed as `--inter-hunk-context`.
    pub inter_hunk_context: u32,
    /// Paths the diff statistics are restricted to (empty = whole tree).
    pub path_scope: Vec<String>,
    /// Deadline applied to each CLI request; `None` disables it.
    pub command_timeout_secs: Option<u64>,
}

impl Default for VcsSettings {
    fn default() -> Self {
        Self {
            git_binary: "git".into(),
            inter_hunk_context: 3,
            path_scope: Vec::new(),
            command_timeout_secs: Some(60),
        }
    }
}

impl VcsSettings {
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "warn".into(),
        }
    }
}

impl Config {
    /// Create config for a given project root.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let data_dir = project_root.join(DATA_DIR);
        let db_path = data_dir.join(DB_FILE);
        let config_path = data_dir.join(CONFIG_FILE);
        let bundles_dir = data_dir.join(BUNDLES_DIR);

        // Try to load settings from config.toml
        let settings = Self::load_settings(&config_path).unwrap_or_default();

        Self {
            project_root,
            data_dir,
            db_path,
            config_path,
            bundles_dir,
            settings,
        }
    }

    /// Create config from the current working directory.
    pub fn from_cwd() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| CodeIntelError::Config(format!("cannot get cwd: {e}")))?;
        Ok(Self::new(cwd))
    }

    /// Load settings from config.toml if it exists.
    fn load_settings(config_path: &Path) -> Option<UserSettings> {
        if !config_path.exists() {
            return None;
        }
        let content = std::fs::read_to_string(config_path).ok()?;
        match toml::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "ignoring invalid config");
                None
            }
        }
    }

    /// Save current settings to config.toml.
    pub fn save_settings(&self) -> Result<()> {
        self.ensure_data_dir()?;
        let content = toml::to_string_pretty(&self.settings)
            .map_err(|e| CodeIntelError::Config(format!("failed to serialize settings: {e}")))?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Ensure the `.codeintel/` directory and its bundle store exist.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.bundles_dir)?;
        Ok(())
    }

    /// Check whether the database exists.
    #[must_use]
    pub fn db_exists(&self) -> bool {
        self.db_path.exists()
    }

    /// Secret used to tag pagination cursors.
    #[must_use]
    pub fn cursor_secret(&self) -> String {
        match &self.settings.pagination.cursor_secret {
            Some(secret) => secret.clone(),
            None => crate::pagination::derive_secret(&self.project_root.to_string_lossy()),
        }
    }
}
