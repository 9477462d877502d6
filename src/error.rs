//! Error handling for the pinwatch crate.

/// A specialized `Result` type for pinwatch operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// The main error type for pin monitoring operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration is invalid; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// GPIO initialisation or line read failed
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// The monitor loop is no longer running
    #[error("Monitor loop has stopped")]
    Shutdown,
}

impl MonitorError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new GPIO error
    pub fn gpio_error(msg: impl Into<String>) -> Self {
        Self::Gpio(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MonitorError::config_error("duplicate pin 17");
        assert_eq!(err.to_string(), "Configuration error: duplicate pin 17");

        let err = MonitorError::gpio_error("line busy");
        assert!(err.to_string().contains("line busy"));
    }

    #[test]
    fn test_from_json_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MonitorError = parse.into();
        assert!(matches!(err, MonitorError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse configuration"));
    }
}
