//! Domain-specific error types following panic-free policy.

use crate::ClientId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Every client id has been handed out once; none can be issued again.
    #[error("Client ids exhausted (last issued {last})")]
    ClientIdsExhausted { last: ClientId },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
