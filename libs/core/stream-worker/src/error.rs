//! Queue infrastructure errors.
//!
//! Job-level failures are expressed as [`messaging::ProcessingError`] and
//! categorized there. `QueueError` covers the transport: Redis commands,
//! payload codec, and configuration.

use thiserror::Error;

/// Queue transport errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Consumer group missing (stream deleted or never created).
    pub fn is_nogroup_error(&self) -> bool {
        matches!(self, QueueError::Redis(e) if e.to_string().contains("NOGROUP"))
    }

    /// Connection-level failure that warrants a reconnect backoff.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            QueueError::Redis(e)
                if e.is_connection_refusal()
                    || e.is_connection_dropped()
                    || e.is_io_error()
        )
    }

    /// Timeout on a blocking read; normal when the stream is idle.
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueueError::Redis(e) if e.is_timeout())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_wraps_serde() {
        let bad = serde_json::from_str::<serde_json::Value>("{");
        let err: QueueError = bad.unwrap_err().into();
        assert!(matches!(err, QueueError::Serialization(_)));
        assert!(!err.is_nogroup_error());
    }
}
