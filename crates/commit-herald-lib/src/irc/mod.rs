//! Client for the line-oriented chat protocol.
//!
//! - [`framing`]: CRLF frame extraction from a byte stream.
//! - [`message`]: typed parsing of inbound lines and outbound commands.
//! - [`handshake`]: the sign-on state machine.
//! - [`connection`]: the stream owner tying them together.

pub mod connection;
pub mod framing;
pub mod handshake;
pub mod message;

pub use connection::Connection;
pub use handshake::{Handshake, HandshakeState};
pub use message::Command;
