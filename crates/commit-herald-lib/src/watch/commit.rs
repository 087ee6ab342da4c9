use chrono::{DateTime, FixedOffset, TimeZone};
use git2::Oid;

/// Length of the abbreviated id shown in announcements.
pub const SHORT_ID_LEN: usize = 8;

/// A commit as read from history. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: Oid,
    pub short_id: String,
    pub summary: String,
    pub author: String,
    /// Author time, seconds since the UNIX epoch.
    pub timestamp: i64,
    /// Author's UTC offset in minutes.
    pub offset_minutes: i32,
    pub insertions: usize,
    pub deletions: usize,
}

impl Commit {
    /// Read a commit and its line counts against its first parent.
    pub fn from_git(repo: &git2::Repository, commit: &git2::Commit<'_>) -> Result<Self, git2::Error> {
        let (insertions, deletions) = line_stats(repo, commit)?;
        let author = commit.author();
        let when = author.when();
        let id = commit.id();
        let hex = id.to_string();

        Ok(Commit {
            id,
            short_id: hex[..SHORT_ID_LEN.min(hex.len())].to_string(),
            summary: commit.summary().unwrap_or("").to_string(),
            author: author.name().unwrap_or("unknown").to_string(),
            timestamp: when.seconds(),
            offset_minutes: when.offset_minutes(),
            insertions,
            deletions,
        })
    }

    /// Author time in the author's own offset.
    pub fn authored_at(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)?;
        offset.timestamp_opt(self.timestamp, 0).single()
    }
}

fn line_stats(repo: &git2::Repository, commit: &git2::Commit<'_>) -> Result<(usize, usize), git2::Error> {
    let tree = commit.tree()?;
    // Root commits diff against the empty tree.
    let parent_tree = match commit.parents().next() {
        Some(parent) => Some(parent.tree()?),
        None => None,
    };
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    let stats = diff.stats()?;
    Ok((stats.insertions(), stats.deletions()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64, offset_minutes: i32) -> Commit {
        Commit {
            id: Oid::zero(),
            short_id: "00000000".into(),
            summary: "s".into(),
            author: "a".into(),
            timestamp,
            offset_minutes,
            insertions: 0,
            deletions: 0,
        }
    }

    #[test]
    fn authored_at_keeps_author_offset() {
        let at = sample(1_700_000_000, -300).authored_at().unwrap();
        assert_eq!(at.offset().local_minus_utc(), -300 * 60);
        assert_eq!(at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn authored_at_rejects_impossible_offsets() {
        assert!(sample(0, 60 * 48).authored_at().is_none());
    }
}
