//! `git` subprocess backend.

use std::io::{BufRead, Cursor, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::config::VcsSettings;
use crate::context::RequestContext;
use crate::error::{CodeIntelError, Result};
use crate::models::Repository;

use super::{validate_range, validate_revision, CommitGraph, DiffOptions, VersionControl};

/// How often a running child is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runs the `git` binary in each repository's working copy.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
}

impl GitCli {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &VcsSettings) -> Self {
        Self::new(settings.git_binary.clone())
    }

    /// Run git with `args` in `dir`, returning stdout.
    ///
    /// The child is killed as soon as `ctx` is canceled or expires.
    fn run(&self, ctx: &RequestContext, dir: &Path, args: &[String]) -> Result<Vec<u8>> {
        ctx.check()?;
        let command = format!("git {}", args.first().map_or("", String::as_str));
        tracing::debug!(dir = %dir.display(), ?args, "running git");

        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CodeIntelError::Vcs {
                command: command.clone(),
                detail: format!("failed to start {}: {e}", self.binary),
            })?;

        let stdout = drain(&mut child, true);
        let stderr = drain(&mut child, false);

        let status = loop {
            if ctx.check().is_err() {
                // Already-exited children make kill fail; the wait below reaps either way.
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(%command, "git canceled");
                return Err(CodeIntelError::Canceled);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let out = join(stdout)?;
        let err = join(stderr)?;
        if !status.success() {
            return Err(CodeIntelError::Vcs {
                command,
                detail: String::from_utf8_lossy(&err).trim().to_string(),
            });
        }
        Ok(out)
    }

    fn run_text(&self, ctx: &RequestContext, dir: &Path, args: &[String]) -> Result<String> {
        let out = self.run(ctx, dir, args)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

type Drain = Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>;

/// Read one of the child's pipes to the end on a helper thread so a full
/// pipe buffer never blocks the child.
fn drain(child: &mut Child, stdout: bool) -> Drain {
    let pipe: Option<Box<dyn Read + Send>> = if stdout {
        child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    } else {
        child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    };
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            p.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join(handle: Drain) -> Result<Vec<u8>> {
    match handle {
        Some(h) => match h.join() {
            Ok(read) => Ok(read?),
            Err(_) => Err(CodeIntelError::Vcs {
                command: "git".into(),
                detail: "output reader panicked".into(),
            }),
        },
        None => Ok(Vec::new()),
    }
}

/// Build a graph from `rev-list --parents` lines: `<commit> <parent>...`.
fn parse_parent_lines(output: &str) -> CommitGraph {
    let mut graph = CommitGraph::default();
    for line in output.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if let Some((commit, parents)) = words.split_first() {
            graph.add_commit(commit, parents);
        }
    }
    graph
}

impl VersionControl for GitCli {
    fn exec_diff(
        &self,
        ctx: &RequestContext,
        repo: &Repository,
        range: &str,
        options: &DiffOptions,
    ) -> Result<Box<dyn BufRead + Send>> {
        validate_range(range)?;
        let out = self.run(ctx, Path::new(&repo.path), &options.to_args(range))?;
        Ok(Box::new(Cursor::new(out)))
    }

    fn commit_graph(&self, ctx: &RequestContext, repo: &Repository) -> Result<CommitGraph> {
        let out = self.run_text(
            ctx,
            Path::new(&repo.path),
            &["rev-list".into(), "--parents".into(), "--all".into()],
        )?;
        let graph = parse_parent_lines(&out);
        tracing::debug!(repo = %repo.name, commits = graph.len(), "commit graph loaded");
        Ok(graph)
    }

    fn head(&self, ctx: &RequestContext, repo: &Repository) -> Result<String> {
        let out = self.run_text(
            ctx,
            Path::new(&repo.path),
            &["rev-parse".into(), "HEAD".into()],
        )?;
        Ok(out.trim().to_string())
    }

    fn resolve_revision(&self, ctx: &RequestContext, repo: &Repository, rev: &str) -> Result<String> {
        validate_revision(rev)?;
        let args = [
            "rev-parse".to_string(),
            "--verify".into(),
            "--quiet".into(),
            format!("{rev}^{{commit}}"),
        ];
        match self.run_text(ctx, Path::new(&repo.path), &args) {
            Ok(out) => Ok(out.trim().to_string()),
            // --quiet leaves stderr empty only when the name does not resolve
            Err(CodeIntelError::Vcs { detail, .. }) if detail.is_empty() => {
                Err(CodeIntelError::InvalidRevision {
                    rev: rev.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}
