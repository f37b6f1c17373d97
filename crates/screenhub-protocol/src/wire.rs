//! Wire format selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::bytes::Bytes;

use crate::framing::{FrameCodec, FramingError};
use crate::message::GREETING;

/// How bytes on a client connection are split into messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireFormat {
    /// Raw `hello\n` greeting, then reads of at most
    /// [`PLACEHOLDER_MESSAGE_LEN`](crate::PLACEHOLDER_MESSAGE_LEN) bytes.
    #[default]
    Placeholder,

    /// Every message carries a 4-byte big-endian length header.
    LengthPrefixed,
}

impl WireFormat {
    /// Bytes to send to a freshly accepted client.
    pub fn greeting(self, max_frame_length: usize) -> Result<Bytes, FramingError> {
        match self {
            Self::Placeholder => Ok(Bytes::from_static(GREETING)),
            Self::LengthPrefixed => {
                let frame = FrameCodec::new(max_frame_length).encode(GREETING)?;
                Ok(frame.freeze())
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::LengthPrefixed => "length-prefixed",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = WireFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "length-prefixed" | "length_prefixed" | "framed" => Ok(Self::LengthPrefixed),
            other => Err(WireFormatError::Unknown(other.to_string())),
        }
    }
}

/// Errors from parsing a wire format name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireFormatError {
    #[error("Unknown wire format: {0} (expected placeholder or length-prefixed)")]
    Unknown(String),
}
