//! Error types and handling for Orbit

/// Result type alias for broker operations
pub type Result<T> = std::result::Result<T, OrbError>;

/// Error taxonomy of the broker.
///
/// Every registry and node error is returned synchronously to the caller; the
/// broker never retries on its own. Batch and flush acknowledgements are not
/// reported here at all, they arrive as priority events on the handle.
#[derive(Debug, thiserror::Error)]
pub enum OrbError {
    /// Topic metadata is not registered with the broker
    #[error("Topic not found: {name}")]
    NotFound { name: String },

    /// The requested instance already has a live publisher
    #[error("Topic already advertised: {name} instance {instance}")]
    AlreadyAdvertised { name: String, instance: u32 },

    /// Operation needs a live node but the node is a ghost or was retired
    #[error("Topic not advertised: {name} instance {instance}")]
    NotAdvertised { name: String, instance: u32 },

    /// Nothing unread for this subscription
    #[error("No data available")]
    NoData,

    /// Readiness wait expired
    #[error("Timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Readiness wait interrupted by a signal, the caller should retry
    #[error("Interrupted")]
    Interrupted,

    /// Payload does not match the size fixed by the topic metadata
    #[error("Size mismatch on {name}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Every instance slot of the topic has a live publisher
    #[error("No free instance for {name} (max {max})")]
    NoFreeInstance { name: String, max: u32 },

    /// Control not supported by this handle or its publisher
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Readiness primitive failure
    #[error("Notification error: {message}")]
    Notification { message: String },

    /// Typed message encoding failures
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// I/O related errors from the host readiness primitive
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl OrbError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a not found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create an already advertised error
    pub fn already_advertised(name: impl Into<String>, instance: u32) -> Self {
        Self::AlreadyAdvertised {
            name: name.into(),
            instance,
        }
    }

    /// Create a not advertised error
    pub fn not_advertised(name: impl Into<String>, instance: u32) -> Self {
        Self::NotAdvertised {
            name: name.into(),
            instance,
        }
    }

    /// Create a size mismatch error
    pub fn size_mismatch(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a notification error
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether a caller can reasonably wait and try again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotAdvertised { .. }
                | Self::NoData
                | Self::Timeout { .. }
                | Self::Interrupted
                | Self::AlreadyAdvertised { .. }
        )
    }
}

impl From<std::io::Error> for OrbError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Self::Interrupted;
        }
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::errno::Errno> for OrbError {
    fn from(errno: nix::errno::Errno) -> Self {
        match errno {
            nix::errno::Errno::EINTR => Self::Interrupted,
            other => Self::from(std::io::Error::from(other)),
        }
    }
}

impl From<bincode::Error> for OrbError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("Bincode error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = OrbError::not_found("sensor_accel");
        assert!(matches!(err, OrbError::NotFound { .. }));

        let err = OrbError::already_advertised("sensor_accel", 1);
        assert!(matches!(err, OrbError::AlreadyAdvertised { instance: 1, .. }));

        let err = OrbError::size_mismatch("sensor_accel", 16, 12);
        assert!(matches!(err, OrbError::SizeMismatch { expected: 16, actual: 12, .. }));
    }

    #[test]
    fn test_error_display() {
        let err = OrbError::not_advertised("orb_test", 3);
        let display = format!("{}", err);
        assert!(display.contains("not advertised"));
        assert!(display.contains("orb_test"));
        assert!(display.contains("3"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(OrbError::NoData.is_recoverable());
        assert!(OrbError::Interrupted.is_recoverable());
        assert!(OrbError::Timeout { timeout_ms: 5 }.is_recoverable());
        assert!(!OrbError::not_found("x").is_recoverable());
        assert!(!OrbError::size_mismatch("x", 1, 2).is_recoverable());
    }

    #[test]
    fn test_interrupted_conversions() {
        let io = std::io::Error::from(std::io::ErrorKind::Interrupted);
        assert!(matches!(OrbError::from(io), OrbError::Interrupted));
        assert!(matches!(OrbError::from(nix::errno::Errno::EINTR), OrbError::Interrupted));
        assert!(matches!(OrbError::from(nix::errno::Errno::EBADF), OrbError::Io { .. }));
    }
}
