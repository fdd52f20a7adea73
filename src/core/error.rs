use crate::core::entity::EntityId;
use crate::core::schema::EntityKind;
use std::fmt;
use thiserror::Error;

/// Category of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The request never produced a response (connection, timeout, DNS).
    Network,
    /// A response arrived but could not be normalised into entities.
    Decode,
    /// The backend answered with a non-success status.
    Server,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Decode => write!(f, "decode error"),
            Self::Server => write!(f, "server error"),
        }
    }
}

/// Recoverable failure of a collaborator fetch.
///
/// Refresh never lets one of these escape as a panic; it is handed back as a
/// value and surfaced to the user as a dismissible notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Decode, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Server, message)
    }

    pub fn is_network(&self) -> bool {
        self.kind == FetchErrorKind::Network
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

/// Client-side check that failed before a mutation was sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind}: required field '{field}' is missing")]
    MissingField { kind: EntityKind, field: String },

    #[error("{kind}: field '{field}' expects {expected}")]
    WrongType {
        kind: EntityKind,
        field: String,
        expected: &'static str,
    },

    #[error("{kind}: payload must be a JSON object")]
    NotAnObject { kind: EntityKind },
}

/// A mutation that contradicts the cached state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("cannot express interest in your own post {0}")]
    OwnPost(EntityId),

    #[error("post {0} is not available for interest")]
    NotActive(EntityId),

    #[error("{kind} {id} is not in the cache")]
    NotFound { kind: EntityKind, id: EntityId },
}

/// Failure of a create/update/delete/status call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Rejected by backend: {0}")]
    Rejected(#[from] FetchError),

    #[error("Operation '{0}' is not supported by this source")]
    Unsupported(&'static str),

    #[error("Declined by user")]
    Declined,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Unknown entity kind '{0}'")]
    UnknownKind(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        Self::Mutation(MutationError::Validation(err))
    }
}

impl From<ConflictError> for StoreError {
    fn from(err: ConflictError) -> Self {
        Self::Mutation(MutationError::Conflict(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::server("Failed to fetch warehouses");
        assert_eq!(err.to_string(), "server error: Failed to fetch warehouses");
        assert!(!err.is_network());
    }

    #[test]
    fn test_mutation_error_wraps_conflict() {
        let err: MutationError = ConflictError::OwnPost(EntityId::from(3)).into();
        assert_eq!(
            err.to_string(),
            "Conflict: cannot express interest in your own post 3"
        );
    }

    #[test]
    fn test_store_error_from_validation() {
        let err: StoreError = ValidationError::MissingField {
            kind: EntityKind::Warehouses,
            field: "name".into(),
        }
        .into();
        assert!(matches!(
            err,
            StoreError::Mutation(MutationError::Validation(_))
        ));
    }
}
