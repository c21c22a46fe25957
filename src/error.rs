use thiserror::Error;

/// Main error type for query planning operations
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Query stack is empty")]
    EmptyStack,

    #[error("Malformed query stack: {0}")]
    MalformedStack(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Match data too small: layout reserves {needed} slots, buffer has {actual}")]
    MatchDataTooSmall { needed: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for query planning operations
pub type Result<T> = std::result::Result<T, MatchError>;

impl MatchError {
    /// Check if this error means no plan could be produced for the request
    pub fn is_build_failure(&self) -> bool {
        matches!(self, MatchError::EmptyStack | MatchError::MalformedStack(_))
    }

    /// Check if this error only degrades the query (the request proceeds without the input)
    pub fn is_degraded(&self) -> bool {
        matches!(self, MatchError::InvalidLocation(_))
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        MatchError::MalformedStack(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MatchError::MatchDataTooSmall {
            needed: 4,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Match data too small: layout reserves 4 slots, buffer has 2"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(MatchError::EmptyStack.is_build_failure());
        assert!(MatchError::malformed("truncated").is_build_failure());
        assert!(!MatchError::InvalidLocation("x".to_string()).is_build_failure());
        assert!(MatchError::InvalidLocation("x".to_string()).is_degraded());
        assert!(!MatchError::EmptyStack.is_degraded());
    }
}
