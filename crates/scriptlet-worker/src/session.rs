//! Worker side of the host protocol.
//!
//! ```text
//! Disconnected ─connect─▶ Connected ─handshake, send token─▶ AuthPending
//!                                                              │
//!                        ┌──────── declined ───────────────────┤
//!                        ▼                                     ▼ accepted
//!                     Rejected                           Authenticated
//!                        │                                     │
//!                        │          ┌──────────────────▶ WaitingForOrder ◀─┐
//!                        │          │                          │ execute   │
//!                        │          │                          ▼           │
//!                        │          │                      Executing ──────┘
//!                        ▼          │ stop / unknown / closed
//!                     Stopped ◀─────┘
//! ```
//!
//! Script and channel failures never leave `Executing` through anything
//! but a status message; only protocol-level problems stop the worker.

use crate::frame::{FrameError, FramedChannel};
use crate::protocol::{Order, ProtocolVocabulary, RequestShape};
use crate::run::{RunExecutor, RunOutcome};
use std::io::{Read, Write};
use std::net::TcpStream;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Protocol position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    AuthPending,
    Authenticated,
    Rejected,
    WaitingForOrder,
    Executing,
    Stopped,
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Host sent a stop order.
    StopOrder,
    /// Host declined the token.
    AuthenticationRejected,
    /// Host closed the connection.
    PeerClosed,
    /// Host sent an order the worker does not know.
    UnknownOrder(String),
    /// Framing or handshake failure.
    ProtocolError(String),
}

impl StopReason {
    /// Process exit code for this reason.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::StopOrder | Self::PeerClosed => 0,
            Self::AuthenticationRejected | Self::UnknownOrder(_) | Self::ProtocolError(_) => 1,
        }
    }
}

/// Fatal session failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Could not reach the host.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Framing failed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The host closed the stream while the worker expected a message.
    #[error("host closed the connection while waiting for {expected}")]
    PeerClosed { expected: &'static str },

    /// The host answered the token with something other than accept/decline.
    #[error("unexpected authentication reply '{reply}'")]
    UnexpectedAuthReply { reply: String },
}

impl SessionError {
    pub fn connect(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            addr: addr.into(),
            source,
        }
    }
}

/// One authenticated connection to the host.
#[derive(Debug)]
pub struct WorkerSession<S> {
    channel: FramedChannel<S>,
    token: String,
    vocabulary: ProtocolVocabulary,
    executor: RunExecutor,
    state: SessionState,
}

impl WorkerSession<TcpStream> {
    /// Connects to `host:port`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Connect`] if the host is unreachable.
    pub fn connect(
        host: &str,
        port: u16,
        token: impl Into<String>,
        vocabulary: ProtocolVocabulary,
        executor: RunExecutor,
    ) -> Result<Self, SessionError> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port)).map_err(|e| SessionError::connect(&addr, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to disable Nagle");
        }
        info!(%addr, "Connected to host");
        Ok(Self::new(stream, token, vocabulary, executor))
    }
}

impl<S: Read + Write> WorkerSession<S> {
    /// Wraps an already connected stream.
    pub fn new(
        stream: S,
        token: impl Into<String>,
        vocabulary: ProtocolVocabulary,
        executor: RunExecutor,
    ) -> Self {
        let mut session = Self {
            channel: FramedChannel::new(stream),
            token: token.into(),
            vocabulary,
            executor,
            state: SessionState::Disconnected,
        };
        session.transition(SessionState::Connected);
        session
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serves the host until the session stops.
    ///
    /// Sends the shutdown notice unless the host already went away, then
    /// drops the connection.
    pub fn run(mut self) -> StopReason {
        let reason = match self.serve() {
            Ok(reason) => reason,
            Err(SessionError::PeerClosed { expected }) => {
                info!(expected, "Host closed the connection");
                StopReason::PeerClosed
            }
            Err(e) => {
                warn!(error = %e, "Protocol error");
                StopReason::ProtocolError(e.to_string())
            }
        };

        self.transition(SessionState::Stopped);
        if reason != StopReason::PeerClosed {
            let notice = self.vocabulary.shutdown_notice.clone();
            if let Err(e) = self.channel.send(&notice) {
                debug!(error = %e, "Shutdown notice not delivered");
            }
        }
        info!(reason = ?reason, "Worker stopped");
        reason
    }

    fn serve(&mut self) -> Result<StopReason, SessionError> {
        self.expect_message("handshake")?;
        let token = self.token.clone();
        self.channel.send(&token)?;
        self.transition(SessionState::AuthPending);

        let reply = self.expect_message("authentication reply")?;
        if reply == self.vocabulary.token_declined {
            self.transition(SessionState::Rejected);
            warn!("Host declined the token");
            return Ok(StopReason::AuthenticationRejected);
        }
        if reply != self.vocabulary.token_accepted {
            return Err(SessionError::UnexpectedAuthReply { reply });
        }
        self.transition(SessionState::Authenticated);

        loop {
            self.transition(SessionState::WaitingForOrder);
            let Some(message) = self.channel.receive()? else {
                return Ok(StopReason::PeerClosed);
            };
            match Order::parse(&message, &self.vocabulary) {
                Order::Execute => {
                    self.transition(SessionState::Executing);
                    self.execute()?;
                }
                Order::Stop => return Ok(StopReason::StopOrder),
                Order::Unknown(order) => {
                    warn!(%order, "Unknown order");
                    return Ok(StopReason::UnknownOrder(order));
                }
            }
        }
    }

    /// Execute sub-protocol: exactly one status message per call.
    fn execute(&mut self) -> Result<(), SessionError> {
        let ready = self.vocabulary.ready_to_execute.clone();
        self.channel.send(&ready)?;

        let Some(request) = self.expect_payload("execute request")? else {
            return self.reject_request();
        };
        let script = match RequestShape::parse(&request) {
            RequestShape::Envelope(req) if req.command == self.vocabulary.execute_command => {
                req.script
            }
            RequestShape::Envelope(req) => {
                warn!(command = %req.command, "Unsupported request command");
                return self.reject_request();
            }
            RequestShape::LegacyLines(count) => match self.receive_legacy_lines(count)? {
                Some(script) => script,
                None => return self.reject_request(),
            },
            RequestShape::Malformed(reason) => {
                warn!(%reason, "Malformed execute request");
                return self.reject_request();
            }
        };

        let status = match self.executor.run(&script) {
            RunOutcome::Succeeded => self.vocabulary.run_succeeded.clone(),
            RunOutcome::ScriptFailed(_) => self.vocabulary.run_failed.clone(),
            RunOutcome::FinalizeFailed(_) => self.vocabulary.finalize_failed.clone(),
        };
        self.send_status(&status)
    }

    /// Reads `count` line frames. All of them are consumed even when one is
    /// unreadable, so the stream stays in step with the host.
    fn receive_legacy_lines(&mut self, count: usize) -> Result<Option<String>, SessionError> {
        let ack = self.vocabulary.length_received.clone();
        self.channel.send(&ack)?;
        let mut lines = Vec::new();
        let mut readable = true;
        for _ in 0..count {
            match self.expect_payload("script line")? {
                Some(line) => lines.push(line),
                None => readable = false,
            }
        }
        Ok(readable.then(|| lines.join("\n")))
    }

    fn reject_request(&mut self) -> Result<(), SessionError> {
        let status = self.vocabulary.malformed_request.clone();
        self.send_status(&status)
    }

    fn send_status(&mut self, status: &str) -> Result<(), SessionError> {
        debug!(%status, "Run status");
        self.channel.send(status)?;
        Ok(())
    }

    fn expect_message(&mut self, expected: &'static str) -> Result<String, SessionError> {
        self.channel
            .receive()?
            .ok_or(SessionError::PeerClosed { expected })
    }

    /// Like [`Self::expect_message`], but a frame that is not valid text or
    /// is oversized yields `None` instead of ending the session.
    fn expect_payload(&mut self, expected: &'static str) -> Result<Option<String>, SessionError> {
        match self.channel.receive() {
            Ok(Some(text)) => Ok(Some(text)),
            Ok(None) => Err(SessionError::PeerClosed { expected }),
            Err(e @ (FrameError::InvalidUtf8(_) | FrameError::TooLarge { .. })) => {
                warn!(error = %e, expected, "Unreadable frame");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, state = ?next, "session transition");
        self.state = next;
    }
}
