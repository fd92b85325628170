// ============================================================================
// File: packages/adles/src/driver/errors.rs
// ----------------------------------------------------------------------------
// Driver error types
// ============================================================================

use crate::error::AdlesError;

/// Errors returned by platform driver calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Target entity does not exist on the platform
    #[error("{target} not found")]
    NotFound { target: String },

    /// Driver cannot be used on this host
    #[error("driver {driver} is not available: {reason}")]
    NotAvailable {
        driver: &'static str,
        reason: String,
    },

    /// Driver configuration is invalid
    #[error("invalid configuration for {driver}: {details}")]
    InvalidConfig {
        driver: &'static str,
        details: String,
    },

    /// Platform rejected the call
    #[error("{target}: {message}")]
    Rejected { target: String, message: String },

    /// Platform API returned an unexpected status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection to the platform failed
    #[error("transport error: {details}")]
    Transport { details: String },

    /// Call did not finish in time
    #[error("request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Session was released before the call
    #[error("driver session has been released")]
    Released,

    /// Internal driver error
    #[error("internal driver error: {message}")]
    Internal { message: String },
}

impl DriverError {
    pub fn not_found<T: Into<String>>(target: T) -> Self {
        Self::NotFound {
            target: target.into(),
        }
    }

    pub fn rejected<T: Into<String>, M: Into<String>>(target: T, message: M) -> Self {
        Self::Rejected {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<DriverError> for AdlesError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound { target } => AdlesError::NotFound { target },
            DriverError::InvalidConfig { driver, details } => {
                AdlesError::config(format!("{driver}: {details}"))
            }
            DriverError::NotAvailable { driver, reason } => {
                AdlesError::platform(driver, reason)
            }
            DriverError::Rejected { target, message } => AdlesError::platform(target, message),
            other => AdlesError::platform("platform", other.to_string()),
        }
    }
}

/// Result type for driver calls
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found() {
        let err: AdlesError = DriverError::not_found("folder /lab").into();
        assert!(matches!(err, AdlesError::NotFound { ref target } if target == "folder /lab"));
    }

    #[test]
    fn rejection_keeps_target() {
        let err: AdlesError = DriverError::rejected("network LAN", "vlan in use").into();
        assert_eq!(err.to_string(), "platform error on network LAN: vlan in use");
    }
}
