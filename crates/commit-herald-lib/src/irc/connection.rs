// Rust guideline compliant 2026-10-19

//! The protocol engine: one duplex stream, a receive loop and a locked writer.
//!
//! A `Connection` is shared between two threads behind an `Arc`. The receive
//! loop ([`Connection::run`]) owns the read half for the connection's
//! lifetime; any thread may send. Every outbound line is written while holding
//! the writer lock, so concurrent senders never interleave within a line.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::IrcConfig;
use crate::error::IrcError;

use super::framing::LineReader;
use super::handshake::{Handshake, HandshakeState};
use super::message::{encode, fit_privmsg, Command};

type Reader = LineReader<Box<dyn Read + Send>>;
type Writer = Box<dyn Write + Send>;

/// How long `disconnect` waits for a busy writer before skipping the farewell.
const FAREWELL_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

pub struct Connection {
    config: IrcConfig,
    handshake: Mutex<Handshake>,
    reader: Mutex<Option<Reader>>,
    writer: Mutex<Option<Writer>>,
    /// Kept to unblock the receive loop on shutdown.
    socket: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(config: IrcConfig) -> Self {
        let handshake = Handshake::new(
            config.nickname.clone(),
            config.channel.clone(),
            config.nick_collision,
        );
        Connection {
            config,
            handshake: Mutex::new(handshake),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            socket: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Build a connection over an already-open duplex pair.
    pub fn with_transport<R, W>(config: IrcConfig, reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let conn = Connection::new(config);
        conn.handshake.lock().begin_connect();
        conn.attach(Box::new(reader), Box::new(writer), None);
        conn
    }

    /// Open the TCP stream to the configured server.
    ///
    /// # Errors
    ///
    /// [`IrcError::Connect`] when the host does not resolve or every resolved
    /// address refuses or times out.
    pub fn connect(&self) -> Result<(), IrcError> {
        let address = self.config.address();
        tracing::info!("connecting to {}", address);
        self.handshake.lock().begin_connect();

        let connect_err = |source: io::Error| IrcError::Connect {
            address: address.clone(),
            source,
        };
        let addrs = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(&connect_err)?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout()) {
                Ok(stream) => {
                    let read_half = stream.try_clone().map_err(&connect_err)?;
                    let shutdown_handle = stream.try_clone().map_err(&connect_err)?;
                    self.attach(Box::new(read_half), Box::new(stream), Some(shutdown_handle));
                    tracing::info!("connected to {} ({})", address, addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        self.handshake.lock().reset();
        Err(connect_err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    fn attach(&self, reader: Box<dyn Read + Send>, writer: Writer, socket: Option<TcpStream>) {
        *self.reader.lock() = Some(LineReader::new(reader));
        *self.writer.lock() = Some(writer);
        *self.socket.lock() = socket;
        self.closed.store(false, Ordering::SeqCst);
        self.handshake.lock().stream_opened();
    }

    /// Run the handshake until the channel is joined.
    ///
    /// # Errors
    ///
    /// - [`IrcError::NicknameInUse`] under the `abort` collision policy; the
    ///   connection has been torn down.
    /// - [`IrcError::Closed`] if the server hangs up first.
    pub fn sign_in(&self) -> Result<(), IrcError> {
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(IrcError::NotConnected)?;

        if self.config.eager_identify {
            let commands = self.handshake.lock().identify();
            self.send_all(&commands)?;
        }

        loop {
            let line = reader.next_line()?.ok_or(IrcError::Closed)?;
            tracing::trace!("<< {}", line);

            let outcome = self.handshake.lock().handle(&line);
            match outcome {
                Ok(commands) => self.send_all(&commands)?,
                Err(e) => {
                    self.disconnect();
                    return Err(e);
                }
            }

            if self.is_ready() {
                tracing::info!("joined {} as {}", self.config.channel, self.nickname());
                return Ok(());
            }
        }
    }

    /// Receive loop: answer keepalives until the stream ends.
    ///
    /// Returns `Ok(())` when the stream ended because [`Connection::disconnect`]
    /// was called, and an error when the peer went away on its own.
    pub fn run(&self) -> Result<(), IrcError> {
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(IrcError::NotConnected)?;

        loop {
            let line = match reader.next_line() {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) if self.closed.load(Ordering::SeqCst) => return Ok(()),
                Ok(None) => return Err(IrcError::Closed),
                Err(e) => return Err(e.into()),
            };
            tracing::trace!("<< {}", line);
            self.dispatch(&line)?;
        }
    }

    fn dispatch(&self, line: &str) -> Result<(), IrcError> {
        let outcome = self.handshake.lock().handle(line);
        match outcome {
            Ok(commands) => self.send_all(&commands),
            // Only reachable if a collision arrives before sign-in completed
            // and the caller skipped `sign_in`.
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Write `"<name> <payload>\r\n"` atomically with respect to other senders.
    pub fn send_raw(&self, name: &str, payload: &str) -> Result<(), IrcError> {
        write_line(self.writer.lock().as_mut(), name, payload)
    }

    pub fn send(&self, command: &Command) -> Result<(), IrcError> {
        self.send_raw(command.name(), &command.payload())
    }

    fn send_all(&self, commands: &[Command]) -> Result<(), IrcError> {
        for command in commands {
            self.send(command)?;
        }
        Ok(())
    }

    /// Send a message to the configured channel.
    ///
    /// Messages sent before the handshake is complete are dropped.
    pub fn send_to_channel(&self, text: &str) -> Result<(), IrcError> {
        if !self.is_ready() {
            tracing::debug!("not in {} yet, dropping message", self.config.channel);
            return Ok(());
        }
        let text = fit_privmsg(&self.config.channel, text);
        self.send(&Command::Privmsg {
            target: self.config.channel.clone(),
            text,
        })
    }

    /// Say farewell and close the stream. Safe to call more than once and
    /// before sign-in completed.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // A sender stuck on a full socket holds the writer; shutting the socket
        // down below releases it, so the farewell is skipped rather than awaited.
        match self.writer.try_lock_for(FAREWELL_LOCK_TIMEOUT) {
            Some(mut guard) if guard.is_some() => {
                tracing::info!("disconnecting from {}", self.config.address());
                let quit = Command::Quit(self.config.farewell.clone());
                if let Err(e) = write_line(guard.as_mut(), quit.name(), &quit.payload()) {
                    tracing::debug!("farewell not delivered: {}", e);
                }
            }
            Some(_) => {}
            None => tracing::warn!("writer busy, closing without farewell"),
        }
        if let Some(socket) = self.socket.lock().take() {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                tracing::debug!("socket shutdown: {}", e);
            }
        }
        if let Some(mut guard) = self.writer.try_lock_for(FAREWELL_LOCK_TIMEOUT) {
            *guard = None;
        }
        self.handshake.lock().reset();
    }

    pub fn state(&self) -> HandshakeState {
        self.handshake.lock().state()
    }

    pub fn is_ready(&self) -> bool {
        self.handshake.lock().is_ready()
    }

    pub fn nickname(&self) -> String {
        self.handshake.lock().nickname().to_string()
    }

    pub fn channel(&self) -> &str {
        &self.config.channel
    }
}

fn write_line(writer: Option<&mut Writer>, name: &str, payload: &str) -> Result<(), IrcError> {
    let writer = writer.ok_or(IrcError::NotConnected)?;
    writer.write_all(&encode(name, payload))?;
    writer.flush()?;
    tracing::trace!(">> {} {}", name, payload);
    Ok(())
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
