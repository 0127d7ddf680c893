//! Host configuration: transport defaults, classifier knobs, auth fallback,
//! retry policy and the list of configured carriers.
//!
//! Loaded from a JSON file, then overridden from `PARCELPORT_*` environment
//! variables. Secrets never live in the file; a carrier names the environment
//! variables holding its credentials instead.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth_fallback::FallbackSignature;
use crate::capability::{Capability, CapabilitySet, Requirement};
use crate::classify::ClassifierConfig;
use crate::retry::RetrySettings;
use crate::{CoreError, Credentials};

pub const ENV_HTTP_TIMEOUT_MS: &str = "PARCELPORT_HTTP_TIMEOUT_MS";
pub const ENV_RETRY_MAX: &str = "PARCELPORT_RETRY_MAX";
pub const ENV_REFRESH_MARGIN_SECS: &str = "PARCELPORT_REFRESH_MARGIN_SECS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub http: HttpConfig,
    pub classifier: ClassifierConfig,
    pub auth_fallback: AuthFallbackConfig,
    pub retry: RetrySettings,
    pub carriers: Vec<CarrierConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: format!("parcelport/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthFallbackConfig {
    pub refresh_margin_secs: u64,
    /// Token lifetime assumed when the token endpoint omits `expires_in`.
    pub default_ttl_secs: u64,
}

impl Default for AuthFallbackConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 30,
            default_ttl_secs: 3_600,
        }
    }
}

/// One carrier gateway reachable through the canonical HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierConfig {
    pub id: String,
    pub base_url: String,
    pub capabilities: CapabilitySet,
    /// Labels can only be printed once the shipment is closed.
    #[serde(default)]
    pub label_requires_close: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
}

impl CarrierConfig {
    pub fn requirements(&self) -> Vec<Requirement> {
        if self.label_requires_close {
            vec![
                Requirement::new(Capability::CreateLabel, Capability::CloseShipment),
                Requirement::new(Capability::CreateLabels, Capability::CloseShipment),
            ]
        } else {
            Vec::new()
        }
    }

    /// Basic credentials read from the configured environment variables.
    ///
    /// Returns [`Credentials::None`] when no username variable is configured.
    pub fn credentials_from_env(&self) -> Result<Credentials, CoreError> {
        let Some(username_env) = self.username_env.as_deref() else {
            return Ok(Credentials::None);
        };
        let username = read_required_env(username_env, &self.id)?;
        let password = match self.password_env.as_deref() {
            Some(name) => read_required_env(name, &self.id)?,
            None => String::new(),
        };
        Ok(Credentials::basic(username, password))
    }
}

fn read_required_env(name: &str, carrier: &str) -> Result<String, CoreError> {
    env::var(name).map_err(|_| {
        CoreError::InvalidConfig(format!(
            "carrier '{carrier}' expects credentials in environment variable '{name}'"
        ))
    })
}

/// Token exchange used when a carrier rejects basic auth for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub token_url: String,
    /// Carrier error code that signals "basic auth not permitted".
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_pointer: Option<String>,
}

impl FallbackConfig {
    pub fn signature(&self) -> FallbackSignature {
        let mut signature = FallbackSignature::new(self.error_code.clone());
        if let Some(status) = self.status {
            signature = signature.with_status(status);
        }
        if let Some(pointer) = &self.code_pointer {
            signature = signature.with_code_pointer(pointer.clone());
        }
        signature
    }
}

impl CoreConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            carriers = config.carriers.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Defaults plus environment overrides; no carriers.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), CoreError> {
        if let Some(timeout_ms) = parse_env_u64(ENV_HTTP_TIMEOUT_MS)? {
            self.http.timeout_ms = timeout_ms;
        }
        if let Some(max_retries) = parse_env_u64(ENV_RETRY_MAX)? {
            self.retry.max_retries = u32::try_from(max_retries).map_err(|_| {
                CoreError::InvalidConfig(format!("{ENV_RETRY_MAX} is out of range"))
            })?;
        }
        if let Some(margin) = parse_env_u64(ENV_REFRESH_MARGIN_SECS)? {
            self.auth_fallback.refresh_margin_secs = margin;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.http.timeout_ms == 0 {
            return Err(CoreError::InvalidConfig(String::from(
                "http.timeout_ms must be greater than zero",
            )));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(CoreError::InvalidConfig(String::from(
                "retry.max_delay_ms must not be lower than retry.base_delay_ms",
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for carrier in &self.carriers {
            if carrier.id.trim().is_empty() {
                return Err(CoreError::InvalidConfig(String::from(
                    "carrier id must not be empty",
                )));
            }
            if !seen.insert(carrier.id.as_str()) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate carrier id '{}'",
                    carrier.id
                )));
            }
            validate_http_url(&carrier.base_url, &carrier.id)?;
            if let Some(fallback) = &carrier.fallback {
                validate_http_url(&fallback.token_url, &carrier.id)?;
                if fallback.error_code.trim().is_empty() {
                    return Err(CoreError::InvalidConfig(format!(
                        "carrier '{}' fallback.error_code must not be empty",
                        carrier.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn carrier(&self, id: &str) -> Option<&CarrierConfig> {
        self.carriers.iter().find(|carrier| carrier.id == id)
    }
}

fn parse_env_u64(name: &str) -> Result<Option<u64>, CoreError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| CoreError::InvalidConfig(format!("{name} must be an unsigned integer"))),
        Err(_) => Ok(None),
    }
}

fn validate_http_url(url: &str, carrier: &str) -> Result<(), CoreError> {
    let lower = url.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(CoreError::InvalidConfig(format!(
            "carrier '{carrier}' url must be an absolute http(s) URL: '{url}'"
        ))),
    }
}
