//! Error taxonomy: turns every transport or provider failure into one [`CarrierError`].
//!
//! Rules are applied in order and the first match wins:
//!
//! 1. status 400, or a provider "bad request" marker → `Validation`
//! 2. status 401/403, or a provider "invalid credentials" marker → `Auth`
//! 3. status 429 → `RateLimit` (delay from `retry-after`, default 60 s)
//! 4. status ≥ 500, or a connection-level transport error → `Transient`
//! 5. anything else, including malformed success bodies → `Permanent`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

use crate::http_client::{HttpError, HttpErrorKind, HttpResponse};
use crate::{CarrierError, ErrorCategory};

pub const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

const MESSAGE_POINTERS: [&str; 4] = ["/message", "/error/message", "/error_description", "/errors/0/message"];

/// Provider-specific knobs for classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Codes or body fragments that mean "bad request" regardless of status.
    pub bad_request_markers: Vec<String>,
    /// Codes or body fragments that mean "invalid credentials" regardless of status.
    pub invalid_credentials_markers: Vec<String>,
    /// JSON pointers probed in order for the provider's error code.
    pub code_pointers: Vec<String>,
    pub default_retry_after_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            bad_request_markers: Vec::new(),
            invalid_credentials_markers: Vec::new(),
            code_pointers: vec![
                String::from("/code"),
                String::from("/error/code"),
                String::from("/errors/0/code"),
            ],
            default_retry_after_ms: DEFAULT_RETRY_AFTER_MS,
        }
    }
}

/// Pure, total classifier for carrier failures.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classifies a provider response that the caller already judged a failure.
    pub fn classify_response(&self, response: &HttpResponse) -> CarrierError {
        let raw = raw_payload(&response.body);
        let carrier_code = raw.as_ref().and_then(|raw| self.extract_code(raw));
        let provider_message = raw.as_ref().and_then(extract_message);
        let status = response.status;

        let message = match &provider_message {
            Some(detail) => format!("carrier responded with status {status}: {detail}"),
            None => format!("carrier responded with status {status}"),
        };

        let category = if status == 400
            || self.matches(&self.config.bad_request_markers, carrier_code.as_deref(), &response.body)
        {
            ErrorCategory::Validation
        } else if status == 401
            || status == 403
            || self.matches(
                &self.config.invalid_credentials_markers,
                carrier_code.as_deref(),
                &response.body,
            )
        {
            ErrorCategory::Auth
        } else if status == 429 {
            ErrorCategory::RateLimit
        } else if status >= 500 {
            ErrorCategory::Transient
        } else {
            ErrorCategory::Permanent
        };

        let mut error = match category {
            ErrorCategory::RateLimit => {
                CarrierError::rate_limited(message, self.retry_after_ms(response))
            }
            category => CarrierError::new(category, message),
        };
        if let Some(code) = carrier_code {
            error = error.with_carrier_code(code);
        }
        if let Some(raw) = raw {
            error = error.with_raw(raw);
        }
        error
    }

    /// Classifies a failure raised by the transport before any response arrived.
    pub fn classify_transport(&self, error: &HttpError) -> CarrierError {
        let message = format!("transport error: {}", error.message());
        if error.is_connection_level() {
            return CarrierError::transient(message);
        }
        match error.kind() {
            HttpErrorKind::TokenExchange => {
                CarrierError::transient(message).with_carrier_code("auth.exchange_failed")
            }
            _ => CarrierError::permanent(message),
        }
    }

    /// Classifies a response that arrived with a success status but could not be understood.
    pub fn classify_malformed(&self, body: &str, detail: impl std::fmt::Display) -> CarrierError {
        let error = CarrierError::permanent(format!("malformed carrier response: {detail}"));
        match raw_payload(body) {
            Some(raw) => error.with_raw(raw),
            None => error,
        }
    }

    fn extract_code(&self, raw: &Value) -> Option<String> {
        self.config
            .code_pointers
            .iter()
            .filter_map(|pointer| raw.pointer(pointer))
            .find_map(scalar_to_string)
    }

    fn matches(&self, markers: &[String], code: Option<&str>, body: &str) -> bool {
        if markers.is_empty() {
            return false;
        }
        let body = body.to_ascii_lowercase();
        markers.iter().any(|marker| {
            let marker = marker.to_ascii_lowercase();
            code.is_some_and(|code| code.eq_ignore_ascii_case(&marker)) || body.contains(&marker)
        })
    }

    fn retry_after_ms(&self, response: &HttpResponse) -> u64 {
        if let Some(ms) = response
            .header("retry-after-ms")
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            return ms;
        }

        response
            .header("retry-after")
            .and_then(parse_retry_after)
            .unwrap_or(self.config.default_retry_after_ms)
    }
}

/// `retry-after` is either delta-seconds or an HTTP date.
fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1_000));
    }
    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some((seconds * 1_000.0).round() as u64);
        }
    }

    let numeric_zone = match value.strip_suffix(" GMT") {
        Some(prefix) => format!("{prefix} +0000"),
        None => value.to_owned(),
    };
    let at = OffsetDateTime::parse(&numeric_zone, &Rfc2822).ok()?;
    let delta = at - OffsetDateTime::now_utc();
    Some(delta.whole_milliseconds().clamp(0, i128::from(u64::MAX)) as u64)
}

fn raw_payload(body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_owned())))
}

fn extract_message(raw: &Value) -> Option<String> {
    MESSAGE_POINTERS
        .iter()
        .filter_map(|pointer| raw.pointer(pointer))
        .find_map(scalar_to_string)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::default()
    }

    #[test]
    fn first_matching_rule_wins_for_bad_request_marker_on_server_error() {
        let classifier = ErrorClassifier::new(ClassifierConfig {
            bad_request_markers: vec![String::from("INVALID_POSTCODE")],
            ..ClassifierConfig::default()
        });
        let response = HttpResponse::new(500, r#"{"code":"INVALID_POSTCODE"}"#);

        let error = classifier.classify_response(&response);
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(error.carrier_code(), Some("INVALID_POSTCODE"));
    }

    #[test]
    fn invalid_credentials_marker_in_body_is_auth() {
        let classifier = ErrorClassifier::new(ClassifierConfig {
            invalid_credentials_markers: vec![String::from("invalid credentials")],
            ..ClassifierConfig::default()
        });
        let response = HttpResponse::new(422, "Invalid credentials supplied");

        let error = classifier.classify_response(&response);
        assert_eq!(error.category(), ErrorCategory::Auth);
        assert_eq!(error.raw(), Some(&Value::String(String::from("Invalid credentials supplied"))));
    }

    #[test]
    fn forbidden_is_auth() {
        let error = classifier().classify_response(&HttpResponse::new(403, ""));
        assert_eq!(error.category(), ErrorCategory::Auth);
        assert!(error.raw().is_none());
    }

    #[test]
    fn retry_after_ms_header_takes_precedence() {
        let response = HttpResponse::new(429, "")
            .with_header("retry-after", "30")
            .with_header("retry-after-ms", "1500");
        let error = classifier().classify_response(&response);
        assert_eq!(error.retry_after_ms(), Some(1_500));
    }

    #[test]
    fn retry_after_http_date_in_the_past_clamps_to_zero() {
        let response =
            HttpResponse::new(429, "").with_header("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT");
        let error = classifier().classify_response(&response);
        assert_eq!(error.retry_after_ms(), Some(0));
    }

    #[test]
    fn message_includes_provider_detail() {
        let response = HttpResponse::new(404, r#"{"error":{"code":"E404","message":"no such parcel"}}"#);
        let error = classifier().classify_response(&response);

        assert_eq!(error.category(), ErrorCategory::Permanent);
        assert_eq!(error.carrier_code(), Some("E404"));
        assert!(error.message().contains("no such parcel"));
    }

    #[test]
    fn token_exchange_failure_is_transient() {
        let error = classifier().classify_transport(&HttpError::token_exchange("token endpoint down"));
        assert_eq!(error.category(), ErrorCategory::Transient);
        assert_eq!(error.carrier_code(), Some("auth.exchange_failed"));
    }

    #[test]
    fn request_construction_failure_is_permanent() {
        let error = classifier()
            .classify_transport(&HttpError::new(HttpErrorKind::Request, "relative URL without a base"));
        assert_eq!(error.category(), ErrorCategory::Permanent);
    }
}
