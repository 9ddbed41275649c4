use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::JobState;

#[derive(Parser)]
#[command(
    name = "codeintel",
    version,
    about = "Code intelligence at any commit - closest-upload resolution, job registry and diff statistics",
    after_help = "Data lives in .codeintel/ under the current directory. \
                  Output is JSON on stdout; logs go to stderr (RUST_LOG or [logging] filter)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create .codeintel/ with a default config.toml and an empty database
    Init,

    /// Manage registered repositories
    Repo {
        #[command(subcommand)]
        action: RepoCommand,
    },

    /// Manage uploads of precomputed code intelligence
    Upload {
        #[command(subcommand)]
        action: UploadCommand,
    },

    /// Manage index jobs
    Index {
        #[command(subcommand)]
        action: IndexCommand,
    },

    /// Find the completed uploads nearest to a commit that cover a path
    Closest {
        #[command(flatten)]
        target: Target,
    },

    /// Diagnostics for a file or directory, translated to the requested commit
    Diagnostics {
        #[command(flatten)]
        target: Target,
        /// Fail if any diagnostic could not be decoded
        #[arg(long)]
        strict: bool,
    },

    /// Definitions of the symbol at a position
    Definitions {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// References to the symbol at a position
    References {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Added, changed and deleted line counts over BASE...HEAD
    DiffStat {
        #[arg(long)]
        repo: i64,
        #[arg(long)]
        base: String,
        #[arg(long)]
        head: String,
    },
}

/// Repository, commit and path a query is about.
#[derive(Args)]
pub struct Target {
    /// Repository id
    #[arg(long)]
    pub repo: i64,
    /// Repository-relative path
    #[arg(long)]
    pub path: String,
    /// Commit, branch, tag or short id to answer for (default: stored tip, else HEAD)
    #[arg(long)]
    pub commit: Option<String>,
    /// Only consider uploads from this indexer
    #[arg(long)]
    pub indexer: Option<String>,
}

#[derive(Args)]
pub struct PositionArgs {
    /// Zero-based line
    #[arg(long)]
    pub line: u32,
    /// Zero-based character
    #[arg(long)]
    pub character: u32,
}

#[derive(Subcommand)]
pub enum RepoCommand {
    /// Register a repository (or update its path)
    Add {
        #[arg(long)]
        name: String,
        /// Path of the git working copy
        #[arg(long)]
        path: String,
    },
    Get {
        id: i64,
    },
    List,
}

#[derive(Subcommand)]
pub enum UploadCommand {
    /// Queue a new upload
    Create {
        #[arg(long)]
        repo: i64,
        /// Full 40-character commit id
        #[arg(long)]
        commit: String,
        #[arg(long)]
        indexer: String,
        /// Directory the upload covers (default: whole repository)
        #[arg(long, default_value = "")]
        root: String,
        /// Bundle JSON file to store with the upload
        #[arg(long)]
        bundle: Option<PathBuf>,
    },
    Get {
        id: i64,
    },
    /// Delete an upload and recompute the repository tip
    Delete {
        id: i64,
    },
    /// Move an upload to another state
    Mark {
        id: i64,
        #[arg(value_parser = parse_job_state)]
        state: JobState,
        /// Failure message (required for errored)
        #[arg(long)]
        reason: Option<String>,
    },
    List {
        #[arg(long)]
        repo: Option<i64>,
        /// Whitespace-separated terms, all of which must match
        #[arg(long)]
        query: Option<String>,
        /// queued, processing, completed, errored or any
        #[arg(long, default_value = "any")]
        state: String,
        #[arg(long)]
        latest: Option<bool>,
        #[arg(long)]
        limit: Option<u32>,
        /// Cursor from a previous page
        #[arg(long)]
        after: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum IndexCommand {
    /// Queue an index job
    Create {
        #[arg(long)]
        repo: i64,
        #[arg(long)]
        commit: String,
    },
    Get {
        id: i64,
    },
    Delete {
        id: i64,
    },
    Mark {
        id: i64,
        #[arg(value_parser = parse_job_state)]
        state: JobState,
        #[arg(long)]
        reason: Option<String>,
    },
    List {
        #[arg(long)]
        repo: Option<i64>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value = "any")]
        state: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        after: Option<String>,
    },
}

fn parse_job_state(s: &str) -> Result<JobState, String> {
    JobState::parse(s).ok_or_else(|| {
        format!("unknown state '{s}' (expected queued, processing, completed or errored)")
    })
}
