//! Error taxonomy for the protocol engine and the repository watcher.

use std::io;

use thiserror::Error;

/// Failures raised by the chat protocol engine.
#[derive(Debug, Error)]
pub enum IrcError {
    /// The stream could not be opened (refused, unresolvable, timed out).
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The server rejected our nickname and the collision policy is `abort`.
    #[error("nickname '{0}' is already in use")]
    NicknameInUse(String),

    /// An operation needed a stream but none is attached.
    #[error("not connected")]
    NotConnected,

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures raised by a repository watcher.
///
/// Ordinary network trouble during a poll is not an error; only a clone that
/// can no longer be read surfaces here.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to resolve {what}: {source}")]
    Resolve {
        what: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] io::Error),

    #[error(transparent)]
    Git(#[from] git2::Error),
}
