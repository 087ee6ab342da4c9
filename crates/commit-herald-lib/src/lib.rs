//! Library entry point for the commit herald.
//!
//! The crate pairs two long-lived components:
//!  - [`irc::Connection`]: a hand-rolled client for the line-oriented chat
//!    protocol (framing, sign-on handshake, keepalive replies and a locked
//!    outbound writer).
//!  - [`watch::RepositoryWatcher`]: a private clone of a remote repository that
//!    reports commits which arrived since the previous poll.
//!
//! [`announce::Orchestrator`] joins the two: it polls every watcher on a fixed
//! interval and announces each batch into the channel, rate-limiting large
//! batches.

// Public modules
pub mod announce;
pub mod config;
pub mod error;
pub mod irc;
pub mod watch;

// Re-export primary types for ergonomic use.
pub use announce::{ChannelSink, Orchestrator, StopReason, StopSignal};
pub use config::Config;
pub use error::{IrcError, WatchError};
pub use irc::Connection;
pub use watch::{Commit, CommitSource, RepositoryWatcher};
