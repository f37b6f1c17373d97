//! screenhub Protocol - Wire formats for UI client connections
//!
//! This crate provides the bytes exchanged between the screen server and
//! UI client processes: the connection greeting, client messages, and the
//! two supported wire formats (the fixed-size placeholder and
//! length-prefixed framing).

pub mod framing;
pub mod message;
pub mod wire;

pub use framing::{FrameCodec, FramingError, DEFAULT_MAX_FRAME_LENGTH, FRAME_HEADER_LEN};
pub use message::{ClientMessage, GREETING, PLACEHOLDER_MESSAGE_LEN};
pub use wire::{WireFormat, WireFormatError};
