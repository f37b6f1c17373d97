//! Greeting and client message types.

use std::borrow::Cow;
use std::fmt;

use tokio_util::bytes::Bytes;

/// Bytes sent to every client right after it is accepted.
pub const GREETING: &[u8] = b"hello\n";

/// Size of a single read in the placeholder wire format.
pub const PLACEHOLDER_MESSAGE_LEN: usize = 5;

/// A message received from a UI client.
///
/// The payload is opaque to the server; it is only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    payload: Bytes,
}

impl ClientMessage {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Copies a read buffer into a message.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text().escape_debug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_is_six_bytes() {
        assert_eq!(GREETING.len(), 6);
        assert_eq!(GREETING, b"hello\n");
    }

    #[test]
    fn test_message_text_lossy() {
        let msg = ClientMessage::from_slice(&[b'p', b'i', 0xff]);
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.text(), "pi\u{fffd}");
    }

    #[test]
    fn test_display_escapes_newline() {
        let msg = ClientMessage::from_slice(b"ping\n");
        assert_eq!(msg.to_string(), "ping\\n");
    }
}
