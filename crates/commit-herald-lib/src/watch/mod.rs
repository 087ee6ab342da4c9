//! Change detection for remote repositories.

pub mod commit;
pub mod repository;

pub use commit::Commit;
pub use repository::{Cancel, RepositoryWatcher};

use crate::error::WatchError;

/// Something that can be polled for newly-arrived commits.
pub trait CommitSource {
    /// Stable identifier used in announcements.
    fn name(&self) -> &str;

    /// Commits that arrived since the previous call, oldest first.
    fn get_new_commits(&mut self) -> Result<Vec<Commit>, WatchError>;
}
