//! Common error types for partid

use thiserror::Error;

/// Common result type for partid operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across partid crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_missing() -> Result<String> {
        Ok(std::fs::read_to_string("/nonexistent/partid/config.toml")?)
    }

    #[test]
    fn test_io_error_converts_with_question_mark() {
        let err = read_missing().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error: "));
    }

    #[test]
    fn test_config_error_display() {
        let err = Error::Config("port out of range".to_string());
        assert_eq!(err.to_string(), "Configuration error: port out of range");
    }
}
