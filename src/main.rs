// Inherit lint configuration from lib.rs for consistency
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::needless_pass_by_value
)]

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use codeintel::cli::commands::{
    Cli, Command, IndexCommand, PositionArgs, RepoCommand, Target, UploadCommand,
};
use codeintel::cli::output::{self, ErrorReport};
use codeintel::config::Config;
use codeintel::context::RequestContext;
use codeintel::db::Database;
use codeintel::error::{CodeIntelError, Result};
use codeintel::models::job::parse_state_filter;
use codeintel::models::{Diagnostic, Dump, IndexFilter, Location, NewUpload, Position, Repository, UploadFilter};
use codeintel::operations::{self, Aggregator, RequestCache};
use codeintel::pagination::CursorCodec;
use codeintel::store::BundleStore;
use codeintel::vcs::GitCli;

fn main() {
    let cli = Cli::parse();
    let config = match Config::from_cwd() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", output::format_error(&e));
            std::process::exit(1);
        }
    };
    init_logging(&config.settings.logging.filter);

    if let Err(e) = run(cli, &config) {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    match cli.command {
        Command::Init => cmd_init(config),
        Command::Repo { action } => cmd_repo(config, action),
        Command::Upload { action } => cmd_upload(config, action),
        Command::Index { action } => cmd_index(config, action),
        Command::Closest { target } => cmd_closest(config, &target),
        Command::Diagnostics { target, strict } => cmd_diagnostics(config, &target, strict),
        Command::Definitions { target, position } => {
            cmd_locations(config, &target, &position, false)
        }
        Command::References { target, position } => {
            cmd_locations(config, &target, &position, true)
        }
        Command::DiffStat { repo, base, head } => cmd_diff_stat(config, repo, &base, &head),
    }
}

fn print<T: Serialize>(value: &T) {
    println!("{}", output::format_json(value));
}

fn open_db(config: &Config) -> Result<Database> {
    config.ensure_data_dir()?;
    Database::open(&config.db_path)
}

fn request_context(config: &Config) -> RequestContext {
    RequestContext::with_optional_timeout(config.settings.vcs.command_timeout())
}

fn cursor_codec(config: &Config) -> CursorCodec {
    CursorCodec::new(config.cursor_secret())
}

fn cmd_init(config: &Config) -> Result<()> {
    if !config.config_path.exists() {
        config.save_settings()?;
    }
    open_db(config)?;
    #[derive(Serialize)]
    struct Initialized {
        data_dir: String,
    }
    print(&Initialized {
        data_dir: config.data_dir.display().to_string(),
    });
    Ok(())
}

fn cmd_repo(config: &Config, action: RepoCommand) -> Result<()> {
    let db = open_db(config)?;
    match action {
        RepoCommand::Add { name, path } => print(&operations::add_repository(&db, &name, &path)?),
        RepoCommand::Get { id } => print(&db.require_repository(id)?),
        RepoCommand::List => print(&db.list_repositories()?),
    }
    Ok(())
}

fn cmd_upload(config: &Config, action: UploadCommand) -> Result<()> {
    let mut db = open_db(config)?;
    let store = BundleStore::new(&config.bundles_dir);
    match action {
        UploadCommand::Create {
            repo,
            commit,
            indexer,
            root,
            bundle,
        } => {
            let new = NewUpload::new(repo, &commit, &root, &indexer);
            print(&operations::create_upload(&mut db, &store, &new, bundle.as_deref())?);
        }
        UploadCommand::Get { id } => print(&operations::get_upload(&db, id)?),
        UploadCommand::Delete { id } => {
            let ctx = request_context(config);
            let vcs = GitCli::from_settings(&config.settings.vcs);
            let deleted = match operations::delete_upload(&ctx, &mut db, id, operations::head_tip(&ctx, &vcs)) {
                Ok(deleted) => deleted,
                Err(e @ CodeIntelError::TipRecomputation { .. }) => {
                    tracing::warn!(error = %e, "tip commit left stale");
                    true
                }
                Err(e) => return Err(e),
            };
            if deleted {
                store.remove_bundle(id)?;
            }
            print(&Deleted { id, deleted });
        }
        UploadCommand::Mark { id, state, reason } => {
            print(&operations::mark_upload(&mut db, id, state, reason.as_deref())?);
        }
        UploadCommand::List {
            repo,
            query,
            state,
            latest,
            limit,
            after,
        } => {
            let filter = UploadFilter {
                repository_id: repo,
                query,
                state: state_filter(&state)?,
                is_latest: latest,
                limit,
                after,
            };
            print(&operations::list_uploads(
                &db,
                &filter,
                &cursor_codec(config),
                &config.settings.pagination,
            )?);
        }
    }
    Ok(())
}

fn cmd_index(config: &Config, action: IndexCommand) -> Result<()> {
    let db = open_db(config)?;
    match action {
        IndexCommand::Create { repo, commit } => print(&operations::create_index(&db, repo, &commit)?),
        IndexCommand::Get { id } => print(&operations::get_index(&db, id)?),
        IndexCommand::Delete { id } => {
            let deleted = operations::delete_index(&request_context(config), &db, id)?;
            print(&Deleted { id, deleted });
        }
        IndexCommand::Mark { id, state, reason } => {
            print(&operations::mark_index(&db, id, state, reason.as_deref())?);
        }
        IndexCommand::List {
            repo,
            query,
            state,
            limit,
            after,
        } => {
            let filter = IndexFilter {
                repository_id: repo,
                query,
                state: state_filter(&state)?,
                limit,
                after,
            };
            print(&operations::list_indexes(
                &db,
                &filter,
                &cursor_codec(config),
                &config.settings.pagination,
            )?);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Deleted {
    id: i64,
    deleted: bool,
}

fn state_filter(s: &str) -> Result<Option<codeintel::models::JobState>> {
    parse_state_filter(s).ok_or_else(|| CodeIntelError::InvalidArgument(format!("unknown state filter '{s}'")))
}

/// Everything a commit-scoped query needs, resolved once per invocation.
struct QueryScope {
    ctx: RequestContext,
    db: Database,
    vcs: GitCli,
    store: BundleStore,
    repo: Repository,
    commit: String,
}

impl QueryScope {
    fn open(config: &Config, target: &Target) -> Result<Self> {
        let ctx = request_context(config);
        let db = open_db(config)?;
        let vcs = GitCli::from_settings(&config.settings.vcs);
        let repo = db.require_repository(target.repo)?;
        let commit = operations::resolve_commit(&ctx, &db, &vcs, &repo, target.commit.as_deref())?;
        Ok(Self {
            ctx,
            db,
            vcs,
            store: BundleStore::new(&config.bundles_dir),
            repo,
            commit,
        })
    }

    fn closest(&self, config: &Config, target: &Target) -> Result<Vec<Dump>> {
        operations::find_closest_dumps(
            &self.ctx,
            &self.db,
            &self.vcs,
            &self.store,
            &self.repo,
            &self.commit,
            &target.path,
            target.indexer.as_deref(),
            &config.settings.resolution,
        )
    }
}

#[derive(Serialize)]
struct ClosestOutput {
    commit: String,
    dumps: Vec<Dump>,
}

fn cmd_closest(config: &Config, target: &Target) -> Result<()> {
    let scope = QueryScope::open(config, target)?;
    let dumps = scope.closest(config, target)?;
    print(&ClosestOutput {
        commit: scope.commit,
        dumps,
    });
    Ok(())
}

#[derive(Serialize)]
struct DiagnosticsOutput {
    commit: String,
    dumps: Vec<i64>,
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ErrorReport>,
}

fn cmd_diagnostics(config: &Config, target: &Target, strict: bool) -> Result<()> {
    let scope = QueryScope::open(config, target)?;
    let dumps = scope.closest(config, target)?;
    let cache = RequestCache::new(scope.commit.clone());
    let aggregator = Aggregator {
        ctx: &scope.ctx,
        cache: &cache,
        vcs: &scope.vcs,
        store: &scope.store,
        repo: &scope.repo,
    };

    let mut diagnostics = Vec::new();
    let mut errors = Vec::new();
    for entry in aggregator.diagnostics(&dumps, &target.path)? {
        match entry {
            Ok(d) => diagnostics.push(d),
            Err(e) if strict => return Err(e),
            Err(e) => errors.push(ErrorReport::from(&e)),
        }
    }
    print(&DiagnosticsOutput {
        dumps: dumps.iter().map(|d| d.id).collect(),
        commit: scope.commit.clone(),
        diagnostics,
        errors,
    });
    Ok(())
}

#[derive(Serialize)]
struct LocationsOutput {
    commit: String,
    dumps: Vec<i64>,
    locations: Vec<Location>,
}

fn cmd_locations(config: &Config, target: &Target, position: &PositionArgs, references: bool) -> Result<()> {
    let scope = QueryScope::open(config, target)?;
    let dumps = scope.closest(config, target)?;
    let cache = RequestCache::new(scope.commit.clone());
    let aggregator = Aggregator {
        ctx: &scope.ctx,
        cache: &cache,
        vcs: &scope.vcs,
        store: &scope.store,
        repo: &scope.repo,
    };
    let at = Position::new(position.line, position.character);
    let locations = if references {
        aggregator.references(&dumps, &target.path, at)?
    } else {
        aggregator.definitions(&dumps, &target.path, at)?
    };
    print(&LocationsOutput {
        dumps: dumps.iter().map(|d| d.id).collect(),
        commit: scope.commit.clone(),
        locations,
    });
    Ok(())
}

fn cmd_diff_stat(config: &Config, repo: i64, base: &str, head: &str) -> Result<()> {
    let db = open_db(config)?;
    let repo = db.require_repository(repo)?;
    let vcs = GitCli::from_settings(&config.settings.vcs);
    let stat = operations::compute_diff_stat(
        &request_context(config),
        &vcs,
        &repo,
        base,
        head,
        &config.settings.vcs,
    )?;
    print(&stat);
    Ok(())
}
