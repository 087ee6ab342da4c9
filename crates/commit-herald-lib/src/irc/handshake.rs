//! Sign-on state machine.
//!
//! The machine is pure: it consumes inbound lines and yields the commands to
//! send in response, leaving all I/O to [`super::Connection`]. Keepalive probes
//! are answered in every state without changing it.

use std::fmt;

use crate::config::NickCollisionPolicy;
use crate::error::IrcError;

use super::message::{
    ping_token, reply_code, Command, ERR_NICKNAMEINUSE, IDENT_NOTICE, RPL_ENDOFMOTD,
    RPL_ENDOFNAMES,
};

/// Suffix appended to the nickname on each collision under the rename policy.
pub const NICK_SUFFIX: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    Connecting,
    AwaitingLogin,
    AwaitingWelcome,
    JoiningChannel,
    Ready,
    /// Terminal; the nickname was taken and the policy is `abort`.
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeState::Disconnected => "disconnected",
            HandshakeState::Connecting => "connecting",
            HandshakeState::AwaitingLogin => "awaiting-login",
            HandshakeState::AwaitingWelcome => "awaiting-welcome",
            HandshakeState::JoiningChannel => "joining-channel",
            HandshakeState::Ready => "ready",
            HandshakeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    nickname: String,
    channel: String,
    policy: NickCollisionPolicy,
}

impl Handshake {
    pub fn new(
        nickname: impl Into<String>,
        channel: impl Into<String>,
        policy: NickCollisionPolicy,
    ) -> Self {
        Handshake {
            state: HandshakeState::Disconnected,
            nickname: nickname.into(),
            channel: channel.into(),
            policy,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Nickname currently in use (may carry rename suffixes).
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    pub fn begin_connect(&mut self) {
        self.transition(HandshakeState::Connecting);
    }

    /// The stream is open.
    pub fn stream_opened(&mut self) {
        self.transition(HandshakeState::AwaitingLogin);
    }

    pub fn reset(&mut self) {
        self.transition(HandshakeState::Disconnected);
    }

    /// Identification pair for the current nickname.
    pub fn identify(&mut self) -> Vec<Command> {
        tracing::info!("identifying as {}", self.nickname);
        if matches!(
            self.state,
            HandshakeState::Connecting | HandshakeState::AwaitingLogin
        ) {
            self.transition(HandshakeState::AwaitingWelcome);
        }
        vec![
            Command::Nick(self.nickname.clone()),
            Command::User(self.nickname.clone()),
        ]
    }

    /// Advance on one inbound line.
    ///
    /// # Errors
    ///
    /// Returns [`IrcError::NicknameInUse`] on a collision reply when the policy
    /// is `abort`; the machine is then in [`HandshakeState::Failed`].
    pub fn handle(&mut self, line: &str) -> Result<Vec<Command>, IrcError> {
        if let Some(token) = ping_token(line) {
            tracing::debug!("keepalive probe '{}'", token);
            return Ok(vec![Command::Pong(token.to_string())]);
        }

        if self.state == HandshakeState::Ready || self.state == HandshakeState::Failed {
            return Ok(Vec::new());
        }

        if line.contains(IDENT_NOTICE) {
            return Ok(self.identify());
        }

        match reply_code(line) {
            Some(ERR_NICKNAMEINUSE) => self.on_collision(),
            Some(RPL_ENDOFMOTD) => {
                tracing::info!("joining {}", self.channel);
                self.transition(HandshakeState::JoiningChannel);
                Ok(vec![Command::Join(self.channel.clone())])
            }
            Some(RPL_ENDOFNAMES) if self.state == HandshakeState::JoiningChannel => {
                self.transition(HandshakeState::Ready);
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn on_collision(&mut self) -> Result<Vec<Command>, IrcError> {
        match self.policy {
            NickCollisionPolicy::Abort => {
                tracing::error!("nickname {} already in use", self.nickname);
                self.transition(HandshakeState::Failed);
                Err(IrcError::NicknameInUse(self.nickname.clone()))
            }
            NickCollisionPolicy::Rename => {
                let taken = self.nickname.clone();
                self.nickname.push(NICK_SUFFIX);
                tracing::warn!("nickname {} already in use, retrying as {}", taken, self.nickname);
                Ok(self.identify())
            }
        }
    }

    fn transition(&mut self, next: HandshakeState) {
        if self.state != next {
            tracing::debug!("handshake {} -> {}", self.state, next);
            self.state = next;
        }
    }
}
