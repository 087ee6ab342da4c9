// Rust guideline compliant 2026-10-19

//! A watched remote repository backed by a private scratch clone.

use std::sync::Arc;

use git2::build::RepoBuilder;
use git2::{FetchOptions, Oid, RemoteCallbacks, Repository, Sort};
use tempfile::TempDir;

use crate::config::RepoConfig;
use crate::error::WatchError;

use super::{Commit, CommitSource};

const REMOTE: &str = "origin";

/// Polled during clone and fetch transfers; `true` aborts the transfer.
pub type Cancel = Arc<dyn Fn() -> bool + Send + Sync>;

/// Watches one branch of a remote repository for new commits.
///
/// The marker (`last_seen`) is a full commit id. It only moves to the branch
/// tip of a poll that reported at least one commit, so nothing is ever skipped
/// without having been returned.
pub struct RepositoryWatcher {
    name: String,
    url: String,
    branch: String,
    last_seen: Oid,
    cancel: Cancel,
    // Declared before `scratch` so the handle closes before the directory goes.
    repo: Repository,
    scratch: TempDir,
}

impl RepositoryWatcher {
    /// Clone the remote and establish the baseline marker.
    ///
    /// Without a configured starting commit the current branch tip becomes the
    /// baseline, so pre-existing history is never reported as new.
    ///
    /// # Errors
    ///
    /// Fails when the clone fails, the branch does not exist on the remote, or
    /// the starting commit cannot be resolved in the clone.
    pub fn open(config: &RepoConfig) -> Result<Self, WatchError> {
        Self::open_with_cancel(config, Arc::new(|| false))
    }

    /// Like [`RepositoryWatcher::open`], but `cancel` can abort the initial
    /// clone and every later fetch while objects are being transferred.
    pub fn open_with_cancel(config: &RepoConfig, cancel: Cancel) -> Result<Self, WatchError> {
        let scratch = tempfile::Builder::new()
            .prefix("commit-herald-")
            .tempdir()
            .map_err(WatchError::Scratch)?;
        let path = scratch.path().join("clone");

        tracing::info!("cloning {} from {}", config.name, config.url);
        let repo = RepoBuilder::new()
            .fetch_options(fetch_options(&cancel))
            .clone(&config.url, &path)
            .map_err(|source| WatchError::Clone {
                url: config.url.clone(),
                source,
            })?;

        let branch = match &config.branch {
            Some(branch) => branch.clone(),
            None => default_branch(&repo)?,
        };

        let last_seen = match &config.last_seen_commit_sha {
            Some(rev) => resolve_commit(&repo, rev)?,
            None => tip(&repo, &branch)?,
        };
        tracing::debug!("{}: tracking {} from {}", config.name, branch, last_seen);

        Ok(RepositoryWatcher {
            name: config.name.clone(),
            url: config.url.clone(),
            branch,
            last_seen,
            cancel,
            repo,
            scratch,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The newest commit already reported (or the baseline).
    pub fn last_seen(&self) -> Oid {
        self.last_seen
    }

    pub fn scratch_path(&self) -> &std::path::Path {
        self.scratch.path()
    }

    /// Fetch the remote and return commits that arrived since the last poll,
    /// oldest first.
    ///
    /// A failed fetch (unreachable host, DNS) is expected and yields an empty
    /// list; the next poll retries.
    ///
    /// # Errors
    ///
    /// Only when the local clone can no longer be read.
    pub fn get_new_commits(&mut self) -> Result<Vec<Commit>, WatchError> {
        if let Err(e) = self.fetch() {
            tracing::warn!("{}: fetch failed, will retry: {}", self.name, e.message());
            return Ok(Vec::new());
        }

        let tip = tip(&self.repo, &self.branch)?;
        if tip == self.last_seen {
            return Ok(Vec::new());
        }

        // Everything reachable from the tip but not from the marker, newest
        // first. Comparing reachability by id is exact and copes with merges.
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(tip)?;
        walk.hide(self.last_seen)?;

        let mut commits = Vec::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            commits.push(Commit::from_git(&self.repo, &commit)?);
        }

        if commits.is_empty() {
            // The branch moved behind the marker (reset or rewrite); keep the
            // marker where it is rather than moving it backwards.
            tracing::debug!("{}: tip {} already seen", self.name, tip);
            return Ok(commits);
        }

        self.last_seen = tip;
        commits.reverse();
        Ok(commits)
    }

    fn fetch(&self) -> Result<(), git2::Error> {
        let mut remote = self.repo.find_remote(REMOTE)?;
        let refspec = format!(
            "+refs/heads/{0}:refs/remotes/{1}/{0}",
            self.branch, REMOTE
        );
        remote.fetch(&[refspec], Some(&mut fetch_options(&self.cancel)), None)
    }
}

impl CommitSource for RepositoryWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_new_commits(&mut self) -> Result<Vec<Commit>, WatchError> {
        RepositoryWatcher::get_new_commits(self)
    }
}

fn fetch_options(cancel: &Cancel) -> FetchOptions<'static> {
    let cancel = Arc::clone(cancel);
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| !cancel());
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn default_branch(repo: &Repository) -> Result<String, WatchError> {
    let head = repo.head().map_err(|source| WatchError::Resolve {
        what: "default branch".to_string(),
        source,
    })?;
    head.shorthand().map(str::to_string).ok_or_else(|| WatchError::Resolve {
        what: "default branch".to_string(),
        source: git2::Error::from_str("HEAD is not valid UTF-8"),
    })
}

fn tip(repo: &Repository, branch: &str) -> Result<Oid, WatchError> {
    let refname = format!("refs/remotes/{}/{}", REMOTE, branch);
    repo.refname_to_id(&refname)
        .map_err(|source| WatchError::Resolve {
            what: refname,
            source,
        })
}

fn resolve_commit(repo: &Repository, rev: &str) -> Result<Oid, WatchError> {
    let resolve_err = |source| WatchError::Resolve {
        what: format!("commit {}", rev),
        source,
    };
    let object = repo.revparse_single(rev).map_err(resolve_err)?;
    let commit = object.peel_to_commit().map_err(resolve_err)?;
    Ok(commit.id())
}
