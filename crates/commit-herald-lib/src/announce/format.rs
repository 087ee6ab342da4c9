//! Channel message formatting.
//!
//! Lines carry mIRC-style control codes: `\x02` toggles bold, `\x03NN` sets a
//! foreground colour and a bare `\x03` resets it.

use crate::watch::Commit;

const BOLD: char = '\x02';
const COLOR: char = '\x03';

const GREY: &str = "14";
const GREEN: &str = "03";
const ORANGE: &str = "07";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

fn bold(text: &str) -> String {
    format!("{BOLD}{text}{BOLD}")
}

fn colored(code: &str, text: &str) -> String {
    format!("{COLOR}{code}{text}{COLOR}")
}

/// `"<name> (<count>)"`, sent once ahead of a batch.
pub fn batch_summary(repo: &str, count: usize) -> String {
    format!("{} ({})", repo, count)
}

/// `"<name> <timestamp> [<author>] <short-hash> <summary> (+<ins> -<del>)"`,
/// with the name in bold and timestamp, author and hash coloured.
pub fn commit_line(repo: &str, commit: &Commit) -> String {
    let timestamp = match commit.authored_at() {
        Some(at) => at.format(TIMESTAMP_FORMAT).to_string(),
        None => commit.timestamp.to_string(),
    };
    format!(
        "{} {} {} {} {} (+{} -{})",
        bold(repo),
        colored(GREY, &timestamp),
        colored(GREEN, &format!("[{}]", commit.author)),
        colored(ORANGE, &commit.short_id),
        commit.summary,
        commit.insertions,
        commit.deletions,
    )
}

/// Remove control codes, leaving the visible text.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            BOLD => {}
            COLOR => {
                for _ in 0..2 {
                    match chars.peek() {
                        Some(d) if d.is_ascii_digit() => {
                            chars.next();
                        }
                        _ => break,
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}
