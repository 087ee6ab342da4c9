//! Polling, formatting and rate-limited delivery of commit announcements.

pub mod format;
pub mod orchestrator;
pub mod stop;

pub use orchestrator::{ChannelSink, Orchestrator};
pub use stop::{StopReason, StopSignal};
