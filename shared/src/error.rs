use thiserror::Error;

/// Errors raised by the store implementations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("DynamoDB error: {0}")]
    Dynamo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid field path: {0}")]
    InvalidPath(String),
}

impl From<serde_dynamo::Error> for StoreError {
    fn from(err: serde_dynamo::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Failures of the attendance reconciler. Every variant maps to a notice the
/// client can show as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttendanceError {
    #[error("No authenticated user")]
    NotAuthenticated,

    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("Store request failed: {0}")]
    WriteFailed(String),

    #[error("Invalid rating: {0}")]
    InvalidRating(String),
}

impl AttendanceError {
    /// Maps a store failure for `event_id` onto the reconciler taxonomy.
    pub fn from_store(event_id: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AttendanceError::NotFound(event_id.to_string()),
            other => AttendanceError::WriteFailed(other.to_string()),
        }
    }

    pub fn notice(&self) -> &'static str {
        match self {
            AttendanceError::NotAuthenticated => "You need to sign in to continue.",
            AttendanceError::NotFound(_) => "Event not found.",
            AttendanceError::WriteFailed(_) => {
                "We could not update the event. Please try again."
            }
            AttendanceError::InvalidRating(_) => {
                "Ratings must be between 1 and 5 and can only be given after the event."
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AttendanceError::WriteFailed(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_event_not_found() {
        let err = AttendanceError::from_store("evt-1", StoreError::NotFound("Event evt-1".into()));
        assert_eq!(err, AttendanceError::NotFound("evt-1".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_other_store_errors_are_retryable() {
        let err = AttendanceError::from_store("evt-1", StoreError::Dynamo("timeout".into()));
        assert!(matches!(err, AttendanceError::WriteFailed(_)));
        assert!(err.is_retryable());
        assert_eq!(
            err.notice(),
            "We could not update the event. Please try again."
        );
    }
}
