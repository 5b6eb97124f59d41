//! NUL-terminated text frames over a byte stream.
//!
//! Every message is UTF-8 text followed by a single `0x00` byte. Bytes that
//! arrive past a terminator stay buffered, so frames are handed out one per
//! [`FramedChannel::receive`] call in arrival order.

use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::trace;

/// Frame terminator.
pub const TERMINATOR: u8 = 0x00;

/// Upper bound on a single frame (terminator excluded).
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Framing failures.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer sent more than [`MAX_FRAME_LEN`] bytes without a terminator.
    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// A frame was not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An outgoing message contained the terminator byte.
    #[error("message contains the frame terminator")]
    EmbeddedTerminator,

    /// Underlying stream error.
    #[error("stream error: {0}")]
    Io(#[from] io::Error),
}

/// Message channel over any bidirectional byte stream.
#[derive(Debug)]
pub struct FramedChannel<S> {
    stream: S,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no terminator.
    scanned: usize,
    /// Dropping the rest of an oversized frame.
    discarding: bool,
    closed: bool,
    max_frame_len: usize,
}

impl<S: Read + Write> FramedChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            scanned: 0,
            discarding: false,
            closed: false,
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Overrides [`MAX_FRAME_LEN`].
    #[must_use]
    pub fn with_max_frame_len(mut self, limit: usize) -> Self {
        self.max_frame_len = limit;
        self
    }

    /// Writes `text` and its terminator, then flushes.
    ///
    /// # Errors
    ///
    /// [`FrameError::EmbeddedTerminator`] if `text` contains a NUL byte,
    /// [`FrameError::Io`] on write failure.
    pub fn send(&mut self, text: &str) -> Result<(), FrameError> {
        if text.as_bytes().contains(&TERMINATOR) {
            return Err(FrameError::EmbeddedTerminator);
        }
        trace!(len = text.len(), "send frame");
        self.stream.write_all(text.as_bytes())?;
        self.stream.write_all(&[TERMINATOR])?;
        self.stream.flush()?;
        Ok(())
    }

    /// Blocks until a full frame is available.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream; a partial
    /// trailing frame is discarded.
    ///
    /// # Errors
    ///
    /// [`FrameError::TooLarge`], [`FrameError::InvalidUtf8`], or
    /// [`FrameError::Io`] for read failures other than a reset connection.
    /// After the first two the offending frame is gone and the next call
    /// returns the frame that follows it.
    pub fn receive(&mut self) -> Result<Option<String>, FrameError> {
        loop {
            let found = self.buffer[self.scanned..]
                .iter()
                .position(|b| *b == TERMINATOR);
            if let Some(offset) = found {
                let pos = self.scanned + offset;
                let mut frame: Vec<u8> = self.buffer.drain(..=pos).collect();
                self.scanned = 0;
                if self.discarding {
                    self.discarding = false;
                    trace!(len = frame.len(), "dropped tail of oversized frame");
                    continue;
                }
                frame.pop();
                if frame.len() > self.max_frame_len {
                    return Err(FrameError::TooLarge {
                        limit: self.max_frame_len,
                    });
                }
                trace!(len = frame.len(), "received frame");
                return Ok(Some(String::from_utf8(frame)?));
            }
            self.scanned = self.buffer.len();

            if self.closed {
                if !self.buffer.is_empty() {
                    trace!(len = self.buffer.len(), "discarding partial frame");
                    self.buffer.clear();
                    self.scanned = 0;
                }
                return Ok(None);
            }
            if self.discarding {
                self.buffer.clear();
                self.scanned = 0;
            } else if self.buffer.len() > self.max_frame_len {
                self.buffer.clear();
                self.scanned = 0;
                self.discarding = true;
                return Err(FrameError::TooLarge {
                    limit: self.max_frame_len,
                });
            }
            self.fill()?;
        }
    }

    /// Consumes the channel, returning the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn fill(&mut self) -> Result<(), FrameError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    self.closed = true;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory duplex: reads from `input`, records writes in `output`.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn with_input(bytes: &[u8]) -> Self {
            Self {
                input: Cursor::new(bytes.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_appends_terminator() {
        let mut ch = FramedChannel::new(Duplex::with_input(b""));
        ch.send("hello").unwrap();
        assert_eq!(ch.into_inner().output, b"hello\0");
    }

    #[test]
    fn send_rejects_embedded_nul() {
        let mut ch = FramedChannel::new(Duplex::with_input(b""));
        assert!(matches!(
            ch.send("a\0b"),
            Err(FrameError::EmbeddedTerminator)
        ));
        assert!(ch.into_inner().output.is_empty());
    }

    #[test]
    fn frames_in_one_read_come_out_in_order() {
        let mut ch = FramedChannel::new(Duplex::with_input(b"one\0two\0\0three\0"));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("one"));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("two"));
        assert_eq!(ch.receive().unwrap().as_deref(), Some(""));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("three"));
        assert_eq!(ch.receive().unwrap(), None);
    }

    #[test]
    fn eof_mid_frame_is_no_message() {
        let mut ch = FramedChannel::new(Duplex::with_input(b"done\0partial"));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("done"));
        assert_eq!(ch.receive().unwrap(), None);
        assert_eq!(ch.receive().unwrap(), None);
    }

    #[test]
    fn multibyte_text_survives() {
        let mut ch = FramedChannel::new(Duplex::with_input("größe ✓\0".as_bytes()));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("größe ✓"));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut ch = FramedChannel::new(Duplex::with_input(&[0xff, 0xfe, 0x00]));
        assert!(matches!(ch.receive(), Err(FrameError::InvalidUtf8(_))));
    }

    #[test]
    fn oversized_frame_is_skipped() {
        let mut ch =
            FramedChannel::new(Duplex::with_input(b"0123456789abcdef\0next\0")).with_max_frame_len(4);
        assert!(matches!(ch.receive(), Err(FrameError::TooLarge { limit: 4 })));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("next"));
        assert_eq!(ch.receive().unwrap(), None);
    }

    #[test]
    fn oversized_frame_across_reads_is_skipped() {
        let mut bytes = vec![b'x'; READ_CHUNK * 2];
        bytes.extend_from_slice(b"\0next\0");
        let mut ch = FramedChannel::new(Duplex::with_input(&bytes)).with_max_frame_len(READ_CHUNK);
        assert!(matches!(ch.receive(), Err(FrameError::TooLarge { .. })));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("next"));
    }

    #[test]
    fn frame_after_invalid_utf8_is_received() {
        let mut ch = FramedChannel::new(Duplex::with_input(b"\xff\0ok\0"));
        assert!(matches!(ch.receive(), Err(FrameError::InvalidUtf8(_))));
        assert_eq!(ch.receive().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn large_frame_spans_many_reads() {
        let text = "x".repeat(READ_CHUNK * 3 + 17);
        let mut bytes = text.clone().into_bytes();
        bytes.push(0);
        let mut ch = FramedChannel::new(Duplex::with_input(&bytes));
        assert_eq!(ch.receive().unwrap(), Some(text));
    }
}
