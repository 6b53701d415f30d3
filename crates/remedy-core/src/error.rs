//! Error taxonomy for the resolution engine.
//!
//! Only [`Error::InvalidInput`] is meant to reach an end user as a request
//! failure. Collaborator errors ([`Error::BackendUnavailable`],
//! [`Error::MalformedCollaboratorResponse`]) are recovered by the router.

use thiserror::Error;

use crate::models::RecordId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Bad request shape or values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown record id.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Generation backend or pipeline inspector failed or timed out.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A collaborator answered, but the answer could not be parsed.
    #[error("malformed collaborator response: {0}")]
    MalformedCollaboratorResponse(String),

    /// Record store failure (I/O, SQL, poisoned lock).
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// True for errors caused by a collaborator rather than by the caller.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::MalformedCollaboratorResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
