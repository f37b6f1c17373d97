//! Length-prefixed message framing.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.
//! Decoding is incremental: bytes are appended to a per-connection buffer as
//! they arrive and complete frames are drained from the front. Once a
//! header is complete the codec consumes it and remembers the length, so the
//! buffer then holds only the payload bytes received so far.

use std::io;

use thiserror::Error;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::message::ClientMessage;

/// Size of the length header in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default upper bound on a single frame payload (64 KiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Encoder/decoder for length-prefixed frames.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
    max_frame_length: usize,
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .length_field_length(FRAME_HEADER_LEN)
            .big_endian()
            .max_frame_length(max_frame_length)
            .new_codec();

        Self {
            inner,
            max_frame_length,
        }
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Encodes one payload as a frame.
    pub fn encode(&mut self, payload: &[u8]) -> Result<BytesMut, FramingError> {
        if payload.len() > self.max_frame_length {
            return Err(FramingError::FrameTooLarge {
                max: self.max_frame_length,
            });
        }

        let mut dst = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
        self.inner
            .encode(Bytes::copy_from_slice(payload), &mut dst)
            .map_err(|e| self.map_error(e))?;
        Ok(dst)
    }

    /// Drains every complete frame from `buf`.
    ///
    /// Bytes of a trailing partial frame stay in `buf`, minus its header if
    /// the header was complete; the codec keeps that length for the next
    /// call, so the same codec must see every byte of a stream. An oversized
    /// length header is a protocol violation; the connection cannot be
    /// resynchronised after it.
    pub fn decode_all(&mut self, buf: &mut BytesMut) -> Result<Vec<ClientMessage>, FramingError> {
        let mut messages = Vec::new();
        loop {
            match self.inner.decode(buf) {
                Ok(Some(frame)) => messages.push(ClientMessage::new(frame.freeze())),
                Ok(None) => return Ok(messages),
                Err(e) => return Err(self.map_error(e)),
            }
        }
    }

    fn map_error(&self, err: io::Error) -> FramingError {
        if err.kind() == io::ErrorKind::InvalidData {
            FramingError::FrameTooLarge {
                max: self.max_frame_length,
            }
        } else {
            FramingError::Io(err.to_string())
        }
    }
}

/// Errors that can occur while framing messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Frame exceeds maximum length of {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("Framing I/O error: {0}")]
    Io(String),
}
