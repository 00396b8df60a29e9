//! Error types for the shared rate limiter
use std::error::Error as StdError;

/// Boxed collaborator error carried as the cause of an execution failure.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced when validating limiter configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The bucket key must be non-empty.
    #[error("key must not be empty")]
    EmptyKey,
    /// Refill rate must be finite and > 0.
    #[error("permits_per_second must be finite and > 0 (got {provided})")]
    InvalidPermitsPerSecond {
        /// Value provided by caller.
        provided: f64,
    },
    /// Bucket capacity must be finite and > 0.
    #[error("max_permits must be finite and > 0 (got {provided})")]
    InvalidMaxPermits {
        /// Value provided by caller.
        provided: f64,
    },
}

/// A store reply that does not match the `(allowed, next_free_ticket, stored)` shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    /// Reply did not contain exactly three integers.
    #[error("expected 3 reply values, got {0}")]
    Arity(usize),
    /// A time or permit count came back negative.
    #[error("reply field `{field}` is negative ({value})")]
    Negative {
        /// Name of the offending field.
        field: &'static str,
        /// Raw value returned by the store.
        value: i64,
    },
}

/// Encoded bucket arguments that cannot be decoded into a valid request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    /// Expected exactly four arguments.
    #[error("expected 4 bucket arguments, got {0}")]
    Arity(usize),
    /// An argument is not a decimal number of the expected kind.
    #[error("argument `{name}` is not a valid number: {value:?}")]
    Unparsable {
        /// Argument name.
        name: &'static str,
        /// Raw argument text.
        value: String,
    },
    /// An argument parsed but is zero, negative or not finite.
    #[error("argument `{name}` must be finite and > 0")]
    OutOfRange {
        /// Argument name.
        name: &'static str,
    },
}

/// Unified error type for limiter construction and acquisition.
#[derive(Debug, thiserror::Error)]
pub enum RateLimiterError {
    /// Construction rejected the configuration.
    #[error("invalid rate limiter configuration: {0}")]
    Configuration(#[from] ConfigError),
    /// A single call asked for a non-positive number of permits.
    #[error("permits must be > 0 (got {permits})")]
    Validation {
        /// Permits requested by the caller.
        permits: u64,
    },
    /// The shared store or the bucket script failed.
    #[error("failed to execute token bucket script for key `{key}`: {source}")]
    Execution {
        /// Bucket key the call was made for.
        key: String,
        /// Underlying transport, store or decoding error.
        #[source]
        source: BoxError,
    },
}

impl RateLimiterError {
    /// Wrap a collaborator failure for `key`.
    pub fn execution(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Execution { key: key.into(), source: source.into() }
    }

    /// Check if this error came from construction-time validation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this error rejected the permit count of a single call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error came from the shared store.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    /// Borrow the configuration error if present.
    pub fn as_configuration(&self) -> Option<&ConfigError> {
        match self {
            Self::Configuration(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn execution_keeps_cause_as_source() {
        let err = RateLimiterError::execution(
            "api",
            io::Error::new(io::ErrorKind::ConnectionRefused, "store down"),
        );
        assert!(err.is_execution());
        let msg = err.to_string();
        assert!(msg.contains("api"));
        assert!(msg.contains("store down"));
        let source = err.source().expect("source present");
        assert_eq!(source.to_string(), "store down");
    }

    #[test]
    fn configuration_converts_from_config_error() {
        let err: RateLimiterError = ConfigError::InvalidMaxPermits { provided: -1.0 }.into();
        assert!(err.is_configuration());
        assert!(!err.is_validation());
        assert_eq!(err.as_configuration(), Some(&ConfigError::InvalidMaxPermits { provided: -1.0 }));
        assert!(err.to_string().contains("max_permits"));
    }

    #[test]
    fn validation_display_names_permits() {
        let err = RateLimiterError::Validation { permits: 0 };
        assert!(err.is_validation());
        assert!(err.to_string().contains("got 0"));
        assert!(err.source().is_none());
    }

    #[test]
    fn reply_error_display() {
        assert_eq!(ReplyError::Arity(2).to_string(), "expected 3 reply values, got 2");
        let neg = ReplyError::Negative { field: "stored_permits", value: -4 };
        assert!(neg.to_string().contains("stored_permits"));
    }
}
