//! Transparent fallback from a primary auth scheme to an exchanged token.
//!
//! Some carrier accounts reject the primary scheme (usually basic credentials)
//! with a specific error code and expect a token obtained from a separate
//! endpoint instead. [`AuthFallbackClient`] decorates any [`HttpClient`]:
//!
//! 1. the call goes out with whatever auth the adapter attached;
//! 2. if the response matches the [`FallbackSignature`], a token is taken from
//!    the cache (when it has more than the refresh margin left) or exchanged
//!    and cached;
//! 3. the call is retried exactly once with the token and that outcome is
//!    returned as-is.
//!
//! The cache is shared by every call through one client. Exchanges run under
//! the cache lock, so concurrent callers that find no usable token wait for
//! the single in-flight exchange instead of starting their own.
//!
//! Use one client per carrier account: the cached token belongs to whichever
//! credentials were exchanged first.

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::http_client::{
    BasicAuth, HttpAuth, HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse,
};

pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(30);
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3_600);

/// Derived credential with its lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    token: String,
    issued_at: Instant,
    ttl_secs: u64,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, issued_at: Instant, ttl_secs: u64) -> Self {
        Self {
            token: token.into(),
            issued_at,
            ttl_secs,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub const fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub const fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn expires_at(&self) -> Instant {
        self.issued_at + Duration::from_secs(self.ttl_secs)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at().saturating_duration_since(now)
    }

    /// Usable only while strictly more than `margin` of validity is left.
    pub fn is_usable(&self, now: Instant, margin: Duration) -> bool {
        self.remaining(now) > margin
    }
}

impl Debug for CachedToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("issued_at", &self.issued_at)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

/// Token returned by an exchange, before it is cached.
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangedToken {
    pub token: String,
    /// Lifetime reported by the token endpoint, when it reports one.
    pub ttl_secs: Option<u64>,
}

impl Debug for ExchangedToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangedToken")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("token endpoint unreachable: {0}")]
    Transport(HttpError),
    #[error("token endpoint rejected the exchange with status {status}")]
    Rejected { status: u16 },
    #[error("token endpoint returned an unusable body: {0}")]
    Malformed(String),
}

pub type ExchangeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ExchangedToken, ExchangeError>> + Send + 'a>>;

/// Exchanges primary credentials for a secondary token.
pub trait TokenExchanger: Send + Sync {
    /// `original` is the request whose primary auth was rejected; exchangers
    /// may reuse its credentials. `transport` is the undecorated client.
    fn exchange<'a>(
        &'a self,
        transport: &'a dyn HttpClient,
        original: &'a HttpRequest,
    ) -> ExchangeFuture<'a>;
}

/// OAuth-style exchange: `POST token_url` with basic credentials, expecting
/// `{"access_token": "...", "expires_in": 3600}`.
#[derive(Clone)]
pub struct HttpTokenExchanger {
    token_url: String,
    grant_type: String,
    credentials: Option<BasicAuth>,
}

impl HttpTokenExchanger {
    /// Reuses the basic credentials of the rejected request.
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            grant_type: String::from("client_credentials"),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = grant_type.into();
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl Debug for HttpTokenExchanger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenExchanger")
            .field("token_url", &self.token_url)
            .field("grant_type", &self.grant_type)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "token", alias = "accessToken")]
    access_token: String,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<u64>,
}

impl TokenExchanger for HttpTokenExchanger {
    fn exchange<'a>(
        &'a self,
        transport: &'a dyn HttpClient,
        original: &'a HttpRequest,
    ) -> ExchangeFuture<'a> {
        Box::pin(async move {
            let mut request = HttpRequest::post(&self.token_url)
                .with_header("content-type", "application/x-www-form-urlencoded")
                .with_header("accept", "application/json")
                .with_body(format!(
                    "grant_type={}",
                    urlencoding::encode(&self.grant_type)
                ));
            request.basic_auth = self
                .credentials
                .clone()
                .or_else(|| original.basic_auth.clone());

            let response = transport
                .execute(request)
                .await
                .map_err(ExchangeError::Transport)?;
            if !response.is_success() {
                return Err(ExchangeError::Rejected {
                    status: response.status,
                });
            }

            let parsed: TokenResponse = serde_json::from_str(&response.body)
                .map_err(|error| ExchangeError::Malformed(error.to_string()))?;
            if parsed.access_token.trim().is_empty() {
                return Err(ExchangeError::Malformed(String::from("empty access token")));
            }

            Ok(ExchangedToken {
                token: parsed.access_token,
                ttl_secs: parsed.expires_in,
            })
        })
    }
}

/// Narrow "primary auth not permitted for this account" detector.
///
/// Matches on a structured error code in the body, optionally combined with a
/// status. A bare 401 never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackSignature {
    #[serde(default)]
    pub status: Option<u16>,
    pub error_codes: Vec<String>,
    #[serde(default = "default_code_pointers")]
    pub code_pointers: Vec<String>,
}

fn default_code_pointers() -> Vec<String> {
    vec![
        String::from("/code"),
        String::from("/error/code"),
        String::from("/errors/0/code"),
    ]
}

impl FallbackSignature {
    pub fn new(error_code: impl Into<String>) -> Self {
        Self {
            status: None,
            error_codes: vec![error_code.into()],
            code_pointers: default_code_pointers(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.code_pointers.insert(0, pointer.into());
        self
    }

    pub fn matches(&self, response: &HttpResponse) -> bool {
        if self.status.is_some_and(|status| status != response.status) {
            return false;
        }
        if self.error_codes.is_empty() {
            return false;
        }

        let Ok(body) = serde_json::from_str::<Value>(&response.body) else {
            return false;
        };
        self.code_pointers
            .iter()
            .filter_map(|pointer| body.pointer(pointer))
            .filter_map(Value::as_str)
            .any(|code| {
                self.error_codes
                    .iter()
                    .any(|expected| expected.eq_ignore_ascii_case(code))
            })
    }
}

/// Where the exchanged token goes on the retried request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenPlacement {
    #[default]
    Bearer,
    Header(String),
}

impl TokenPlacement {
    fn auth(&self, token: String) -> HttpAuth {
        match self {
            Self::Bearer => HttpAuth::BearerToken(token),
            Self::Header(name) => HttpAuth::Header {
                name: name.clone(),
                value: token,
            },
        }
    }
}

/// [`HttpClient`] decorator implementing the auth fallback.
pub struct AuthFallbackClient {
    inner: Arc<dyn HttpClient>,
    exchanger: Arc<dyn TokenExchanger>,
    signature: FallbackSignature,
    placement: TokenPlacement,
    refresh_margin: Duration,
    default_ttl: Duration,
    cache: Mutex<Option<CachedToken>>,
    exchanges: AtomicU64,
}

impl AuthFallbackClient {
    pub fn new(
        inner: Arc<dyn HttpClient>,
        exchanger: Arc<dyn TokenExchanger>,
        signature: FallbackSignature,
    ) -> Self {
        Self {
            inner,
            exchanger,
            signature,
            placement: TokenPlacement::default(),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            default_ttl: DEFAULT_TOKEN_TTL,
            cache: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Lifetime assumed when the token endpoint does not report one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_token_placement(mut self, placement: TokenPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn signature(&self) -> &FallbackSignature {
        &self.signature
    }

    /// Number of successful exchanges performed so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub async fn cached_token(&self) -> Option<CachedToken> {
        self.cache.lock().await.clone()
    }

    /// Drops the cached token if it is still `rejected`, so the next fallback
    /// exchanges again. A concurrent call may already have replaced it.
    async fn invalidate_rejected(&self, rejected: &str) {
        let mut cache = self.cache.lock().await;
        if cache.as_ref().is_some_and(|cached| cached.token() == rejected) {
            cache.take();
        }
    }

    async fn token_for(&self, original: &HttpRequest) -> Result<String, HttpError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache
            .as_ref()
            .filter(|cached| cached.is_usable(Instant::now(), self.refresh_margin))
        {
            tracing::debug!(url = %original.url, "reusing cached fallback token");
            return Ok(cached.token().to_owned());
        }
        cache.take();

        let exchanged = self
            .exchanger
            .exchange(self.inner.as_ref(), original)
            .await
            .map_err(|error| {
                tracing::warn!(error = %error, "fallback token exchange failed");
                HttpError::token_exchange(format!("fallback token exchange failed: {error}"))
            })?;

        let ttl_secs = exchanged
            .ttl_secs
            .unwrap_or_else(|| self.default_ttl.as_secs());
        let token = CachedToken::new(exchanged.token, Instant::now(), ttl_secs);
        let value = token.token().to_owned();
        *cache = Some(token);
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        tracing::info!(ttl_secs, "exchanged primary credentials for fallback token");

        Ok(value)
    }
}

impl Debug for AuthFallbackClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFallbackClient")
            .field("signature", &self.signature)
            .field("placement", &self.placement)
            .field("refresh_margin", &self.refresh_margin)
            .field("exchanges", &self.exchange_count())
            .finish_non_exhaustive()
    }
}

impl HttpClient for AuthFallbackClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let response = self.inner.execute(request.clone()).await?;
            if !self.signature.matches(&response) {
                return Ok(response);
            }

            tracing::debug!(
                url = %request.url,
                status = response.status,
                "primary auth scheme rejected; retrying with fallback token"
            );
            let token = self.token_for(&request).await?;
            let retry = request.with_auth(&self.placement.auth(token.clone()));

            let outcome = self.inner.execute(retry).await;
            if let Ok(retried) = &outcome {
                if retried.status == 401 || self.signature.matches(retried) {
                    tracing::warn!(
                        status = retried.status,
                        "fallback token rejected; dropping cached token"
                    );
                    self.invalidate_rejected(&token).await;
                }
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_unusable_inside_refresh_margin() {
        let issued = Instant::now();
        let token = CachedToken::new("t", issued, 60);

        assert!(token.is_usable(issued + Duration::from_secs(29), DEFAULT_REFRESH_MARGIN));
        assert!(!token.is_usable(issued + Duration::from_secs(30), DEFAULT_REFRESH_MARGIN));
        assert!(!token.is_usable(issued + Duration::from_secs(90), DEFAULT_REFRESH_MARGIN));
        assert_eq!(token.remaining(issued + Duration::from_secs(90)), Duration::ZERO);
    }

    #[test]
    fn signature_requires_matching_code_not_just_status() {
        let signature = FallbackSignature::new("BASIC_AUTH_NOT_ALLOWED").with_status(403);

        assert!(signature.matches(&HttpResponse::new(
            403,
            r#"{"error":{"code":"basic_auth_not_allowed"}}"#
        )));
        assert!(!signature.matches(&HttpResponse::new(403, r#"{"code":"INVALID_PASSWORD"}"#)));
        assert!(!signature.matches(&HttpResponse::new(401, r#"{"code":"BASIC_AUTH_NOT_ALLOWED"}"#)));
        assert!(!signature.matches(&HttpResponse::new(403, "forbidden")));
    }

    #[test]
    fn signature_can_match_success_status_bodies() {
        let signature = FallbackSignature::new("USE_TOKEN").with_code_pointer("/meta/authError");
        let response = HttpResponse::ok_json(r#"{"meta":{"authError":"USE_TOKEN"}}"#);
        assert!(signature.matches(&response));
    }

    struct Unreachable;

    impl HttpClient for Unreachable {
        fn execute<'a>(&'a self, _request: HttpRequest) -> HttpFuture<'a> {
            Box::pin(async { Err(HttpError::connect("offline")) })
        }
    }

    impl TokenExchanger for Unreachable {
        fn exchange<'a>(
            &'a self,
            _transport: &'a dyn HttpClient,
            _original: &'a HttpRequest,
        ) -> ExchangeFuture<'a> {
            Box::pin(async { Err(ExchangeError::Rejected { status: 503 }) })
        }
    }

    #[tokio::test]
    async fn rejected_token_does_not_evict_its_replacement() {
        // Given: a concurrent call already replaced the rejected token
        let client = AuthFallbackClient::new(
            Arc::new(Unreachable),
            Arc::new(Unreachable),
            FallbackSignature::new("BASIC_AUTH_DISABLED"),
        );
        *client.cache.lock().await = Some(CachedToken::new("tok-2", Instant::now(), 3_600));

        // When: the late retry with the old token is rejected
        client.invalidate_rejected("tok-1").await;

        // Then: the fresh token survives
        let cached = client.cached_token().await.expect("still cached");
        assert_eq!(cached.token(), "tok-2");

        // And: rejecting the cached token itself drops it
        client.invalidate_rejected("tok-2").await;
        assert!(client.cached_token().await.is_none());
    }

    #[test]
    fn debug_output_never_contains_token() {
        let token = CachedToken::new("super-secret", Instant::now(), 60);
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
