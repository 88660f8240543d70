use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid task status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::TaskNotFound("3".to_string());
        assert!(error.to_string().contains('3'));

        let error = CoreError::InvalidStatusTransition {
            from: "completed".to_string(),
            to: "pending".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid task status transition from completed to pending"
        );
    }
}
