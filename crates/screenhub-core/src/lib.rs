//! screenhub Core - Shared types for the screen server
//!
//! This crate provides the domain types shared between the server
//! (screenhubd) and the host/probe binaries.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod id;
pub mod screen;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use id::{CanvasId, ClientId};
pub use screen::Screen;
