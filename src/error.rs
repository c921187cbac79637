//! Error types shared by the gamification and analytics core.

use thiserror::Error;

/// Everything the core can fail with.
///
/// Absence of an identity is kept distinct from storage failures so callers
/// can answer "not found" without guessing.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Corrupt stored record: {0}")]
    CorruptRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl CoreError {
    pub fn user_not_found(id: i64) -> Self {
        CoreError::NotFound { entity: "User", id }
    }

    pub fn course_not_found(id: i64) -> Self {
        CoreError::NotFound { entity: "Course", id }
    }

    pub fn feedback_not_found(id: i64) -> Self {
        CoreError::NotFound { entity: "Feedback", id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::CorruptRecord(err.to_string())
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CoreError::course_not_found(42);
        assert_eq!(err.to_string(), "Course 42 not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_persistence_is_not_not_found() {
        let err = CoreError::from(sqlx::Error::PoolClosed);
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("Persistence failure"));
    }
}
