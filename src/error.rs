//! Error types for the IoT hub
//!
//! Each layer has its own error enum; [`GatewayError`] wraps them for the
//! binary and the gateway setup path. Cloud relay errors never leave the
//! upload task, so they are not wrapped here.

use thiserror::Error;

/// Main error type for hub operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Topic error: {0}")]
    TopicError(#[from] crate::protocol::TopicError),

    #[error("Dispatch setup error: {0}")]
    DispatchError(#[from] crate::gateway::DispatchError),

    #[error("Transport error: {0}")]
    TransportError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl GatewayError {
    /// Wrap any transport error
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TransportError(Box::new(error))
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether the error prevents the hub from starting
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::ConfigError(_)
                | GatewayError::TopicError(_)
                | GatewayError::DispatchError(_)
        )
    }
}

/// Result type for hub operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::gateway::DispatchError;
    use crate::protocol::TopicError;
    use crate::transport::mqtt::MqttError;

    #[test]
    fn test_internal_error_constructor() {
        let error = GatewayError::internal_error("event channel closed");
        assert_eq!(error.to_string(), "Internal error: event channel closed");
        assert!(!error.is_startup_fatal());
    }

    #[test]
    fn test_setup_errors_are_fatal() {
        let errors: Vec<GatewayError> = vec![
            ConfigError::InvalidGatewayId("bad id".to_string()).into(),
            TopicError::EmptyTopic.into(),
            DispatchError::DuplicateTopic("server/fan/lwt".to_string()).into(),
        ];

        for error in errors {
            assert!(error.is_startup_fatal(), "{error} should be fatal");
        }
    }

    #[test]
    fn test_transport_error_keeps_source() {
        let error = GatewayError::transport(MqttError::NotConnected);
        assert!(!error.is_startup_fatal());
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.to_string().contains("Not connected"));
    }
}
