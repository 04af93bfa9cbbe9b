//! Driver Error Types

use std::io;
use thiserror::Error;

/// Errors raised while driving the engine
#[derive(Error, Debug)]
pub enum DriverError {
    /// The pseudo-terminal or the engine process could not be created
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    /// The engine never showed its idle prompt after start-up
    #[error("Engine did not reach its prompt after {attempts} attempts")]
    Handshake { attempts: u32 },

    /// A value has no term rendering
    #[error("unsupported type {0}")]
    Unsupported(String),

    /// The engine reported a diagnostic while consulting a file
    #[error("{0}")]
    Consult(String),

    /// The engine reported a diagnostic while proving a goal
    #[error("{0}")]
    Query(String),

    /// Predicate name was empty
    #[error("predicate name expected")]
    InvalidPredicate,

    /// Output arrived that the current protocol step cannot accept
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The conversation with the engine broke down
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The session has been closed, explicitly or by a transport failure
    #[error("Session is closed")]
    Closed,

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A panic was caught at the query boundary
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DriverError {
    /// Whether this error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::Transport(_) | DriverError::Io(_) | DriverError::Closed
        )
    }
}

impl From<figment::Error> for DriverError {
    fn from(e: figment::Error) -> Self {
        DriverError::Config(Box::new(e))
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::Query("error(existence_error(procedure,foo/0),foo/0).".to_string());
        assert_eq!(
            format!("{err}"),
            "error(existence_error(procedure,foo/0),foo/0)."
        );

        let err = DriverError::Unsupported("record without functor".to_string());
        assert_eq!(format!("{err}"), "unsupported type record without functor");

        let err = DriverError::Handshake { attempts: 2 };
        assert_eq!(
            format!("{err}"),
            "Engine did not reach its prompt after 2 attempts"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DriverError::Closed.is_fatal());
        assert!(DriverError::Transport("pipe closed".into()).is_fatal());
        assert!(!DriverError::Consult("error(x).".into()).is_fatal());
        assert!(!DriverError::InvalidPredicate.is_fatal());
    }
}
