//! Validated limiter configuration.

use crate::error::ConfigError;

/// What [`SharedRateLimiter`](crate::SharedRateLimiter) answers when the shared store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnStoreError {
    /// Return the execution error to the caller.
    #[default]
    Propagate,
    /// Admit the request (fail open).
    Allow,
    /// Deny the request (fail closed).
    Deny,
}

/// Per-key bucket configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    key: String,
    permits_per_second: f64,
    max_permits: f64,
    on_store_error: OnStoreError,
}

impl RateLimiterConfig {
    /// Bucket of capacity `permits_per_second`, i.e. a one second burst.
    ///
    /// # Examples
    /// ```
    /// use fleetlimit::RateLimiterConfig;
    /// let cfg = RateLimiterConfig::new("checkout", 50.0).unwrap();
    /// assert_eq!(cfg.max_permits(), 50.0);
    /// assert!(RateLimiterConfig::new("", 50.0).is_err());
    /// ```
    pub fn new(key: impl Into<String>, permits_per_second: f64) -> Result<Self, ConfigError> {
        Self::with_max_permits(key, permits_per_second, permits_per_second)
    }

    /// Bucket with an explicit capacity.
    pub fn with_max_permits(
        key: impl Into<String>,
        permits_per_second: f64,
        max_permits: f64,
    ) -> Result<Self, ConfigError> {
        let cfg = Self {
            key: key.into(),
            permits_per_second,
            max_permits,
            on_store_error: OnStoreError::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if !positive_finite(self.permits_per_second)
            || !self.stable_interval_micros().is_finite()
        {
            return Err(ConfigError::InvalidPermitsPerSecond { provided: self.permits_per_second });
        }
        if !positive_finite(self.max_permits) {
            return Err(ConfigError::InvalidMaxPermits { provided: self.max_permits });
        }
        Ok(())
    }

    /// Choose how store failures surface to callers.
    pub fn on_store_error(mut self, policy: OnStoreError) -> Self {
        self.on_store_error = policy;
        self
    }

    /// Bucket identifier in the shared store.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Refill rate.
    pub fn permits_per_second(&self) -> f64 {
        self.permits_per_second
    }

    /// Bucket capacity.
    pub fn max_permits(&self) -> f64 {
        self.max_permits
    }

    /// Store failure policy.
    pub fn store_error_policy(&self) -> OnStoreError {
        self.on_store_error
    }

    /// Micros needed to regenerate one permit.
    pub fn stable_interval_micros(&self) -> f64 {
        1_000_000.0 / self.permits_per_second
    }
}

fn positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
