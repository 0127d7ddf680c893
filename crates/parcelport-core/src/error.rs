use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capability::Capability;

/// Failure category that tells a caller whether a carrier call may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Validation,
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl ErrorCategory {
    pub const ALL: [Self; 5] = [
        Self::Validation,
        Self::Auth,
        Self::RateLimit,
        Self::Transient,
        Self::Permanent,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "Validation",
            Self::Auth => "Auth",
            Self::RateLimit => "RateLimit",
            Self::Transient => "Transient",
            Self::Permanent => "Permanent",
        }
    }

    /// Only rate limits and transient failures are worth another attempt.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Transient)
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified carrier failure.
///
/// Every failure that leaves an adapter operation is one of these. Values are
/// built once at classification time and never mutated afterwards; the
/// `with_*` builders consume `self` and are only used while constructing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierError {
    message: String,
    category: ErrorCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    carrier_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<Value>,
}

impl CarrierError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category,
            carrier_code: None,
            retry_after_ms: None,
            raw: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_ms: u64) -> Self {
        Self {
            retry_after_ms: Some(retry_after_ms),
            ..Self::new(ErrorCategory::RateLimit, message)
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Permanent, message)
    }

    /// Raised when an operation is invoked on an adapter that never declared it.
    pub fn unsupported_capability(capability: Capability, adapter_id: &str) -> Self {
        Self::permanent(format!(
            "capability '{capability}' is not implemented by adapter '{adapter_id}'"
        ))
        .with_carrier_code("capability.not_implemented")
    }

    pub fn adapter_not_registered(adapter_id: &str) -> Self {
        Self::permanent(format!("carrier adapter '{adapter_id}' is not registered"))
            .with_carrier_code("adapter.not_registered")
    }

    pub fn with_carrier_code(mut self, code: impl Into<String>) -> Self {
        self.carrier_code = Some(code.into());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn carrier_code(&self) -> Option<&str> {
        self.carrier_code.as_deref()
    }

    /// Suggested delay before retrying. Only set for [`ErrorCategory::RateLimit`].
    pub const fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }

    pub fn raw(&self) -> Option<&Value> {
        self.raw.as_ref()
    }

    pub const fn retryable(&self) -> bool {
        self.category.is_retryable()
    }

    pub const fn code(&self) -> &'static str {
        match self.category {
            ErrorCategory::Validation => "carrier.validation",
            ErrorCategory::Auth => "carrier.auth",
            ErrorCategory::RateLimit => "carrier.rate_limit",
            ErrorCategory::Transient => "carrier.transient",
            ErrorCategory::Permanent => "carrier.permanent",
        }
    }
}

impl Display for CarrierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.category)
    }
}

impl std::error::Error for CarrierError {}

impl From<ValidationError> for CarrierError {
    fn from(error: ValidationError) -> Self {
        Self::validation(error.to_string())
    }
}

/// Canonical model validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{field}' must not be empty")]
    EmptyField { field: &'static str },

    #[error("country must be a 2-letter uppercase ISO code: '{value}'")]
    InvalidCountry { value: String },
    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("parcel weight must be greater than zero grams")]
    ZeroWeight,
    #[error("parcel dimension '{field}' must be greater than zero")]
    ZeroDimension { field: &'static str },

    #[error("timestamp must be RFC3339: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("invalid label format '{value}', expected one of pdf, zpl, png")]
    InvalidLabelFormat { value: String },
    #[error("invalid capability '{value}'")]
    InvalidCapability { value: String },

    #[error("{operation} request must include at least one {item}")]
    EmptyBatch {
        operation: &'static str,
        item: &'static str,
    },
}

/// Top-level error type for configuration and host-side operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_wire_shape_without_empty_fields() {
        let error = CarrierError::transient("connection refused");
        let json = serde_json::to_value(&error).expect("serializes");

        assert_eq!(
            json,
            serde_json::json!({ "message": "connection refused", "category": "Transient" })
        );
    }

    #[test]
    fn rate_limit_carries_retry_after_and_camel_case_keys() {
        let error = CarrierError::rate_limited("slow down", 30_000).with_carrier_code("429");
        let json = serde_json::to_value(&error).expect("serializes");

        assert_eq!(json["category"], "RateLimit");
        assert_eq!(json["retryAfterMs"], 30_000);
        assert_eq!(json["carrierCode"], "429");
        assert!(error.retryable());
    }

    #[test]
    fn unsupported_capability_names_capability_and_adapter() {
        let error = CarrierError::unsupported_capability(Capability::VoidLabel, "acme");

        assert_eq!(error.category(), ErrorCategory::Permanent);
        assert!(error.message().contains("VOID_LABEL"));
        assert!(error.message().contains("acme"));
        assert!(!error.retryable());
    }

    #[test]
    fn only_rate_limit_and_transient_are_retryable() {
        let retryable = ErrorCategory::ALL
            .iter()
            .filter(|category| category.is_retryable())
            .copied()
            .collect::<Vec<_>>();

        assert_eq!(
            retryable,
            vec![ErrorCategory::RateLimit, ErrorCategory::Transient]
        );
    }
}
