use parcelport_core::{
    retry_with_policy, AdapterContext, AdapterRegistry, CarrierAdapter, CarrierError, CoreConfig,
    RetryPolicy, TrackRequest, TrackingResult,
};

use crate::cli::TrackArgs;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    args: &TrackArgs,
    config: &CoreConfig,
    registry: &AdapterRegistry,
) -> Result<CommandOutcome, CliError> {
    let carrier = config
        .carrier(&args.carrier)
        .ok_or_else(|| CliError::Usage(format!("carrier '{}' is not configured", args.carrier)))?;
    let credentials = carrier.credentials_from_env()?;
    let request = TrackRequest::new(credentials, &args.tracking_number)?;

    let (adapter, ctx) = registry.resolve(&args.carrier)?;
    let policy = RetryPolicy::from_settings(&config.retry);
    let result = track_with_retry(adapter.as_ref(), &ctx, &request, &policy).await?;

    Ok(CommandOutcome::ok(serde_json::to_value(result)?))
}

/// Tracking is read-only, so transient and rate-limited failures are retried.
async fn track_with_retry(
    adapter: &dyn CarrierAdapter,
    ctx: &AdapterContext,
    request: &TrackRequest,
    policy: &RetryPolicy,
) -> Result<TrackingResult, CarrierError> {
    retry_with_policy(policy, |_attempt| adapter.track(request.clone(), ctx)).await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use parcelport_core::{
        Capability, CapabilitySet, CanonicalHttpAdapter, Credentials, ErrorCategory, HttpClient,
        HttpError, HttpFuture, HttpRequest, HttpResponse,
    };

    use super::*;

    /// Answers with the given statuses in order, then 200.
    struct FlakyGateway {
        statuses: Mutex<Vec<u16>>,
        calls: Mutex<u32>,
    }

    impl FlakyGateway {
        fn new(mut statuses: Vec<u16>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls")
        }
    }

    impl HttpClient for FlakyGateway {
        fn execute<'a>(&'a self, _request: HttpRequest) -> HttpFuture<'a> {
            Box::pin(async move {
                *self.calls.lock().expect("calls") += 1;
                let next = self.statuses.lock().expect("statuses").pop();
                let response = match next {
                    Some(status) => HttpResponse::new(status, "upstream busy"),
                    None => HttpResponse::ok_json(
                        r#"{"events":[{"occurredAt":"2024-03-01T08:00:00Z","status":"delivered"}]}"#,
                    ),
                };
                Ok::<_, HttpError>(response)
            })
        }
    }

    fn config(retry: &str) -> CoreConfig {
        let config: CoreConfig = serde_json::from_str(&format!(
            r#"{{"retry":{retry},"carriers":[{{"id":"gw","base_url":"https://gw.test","capabilities":["TRACK"]}}]}}"#
        ))
        .expect("config parses");
        config.validate().expect("config is valid");
        config
    }

    async fn track(
        gateway: Arc<FlakyGateway>,
        config: &CoreConfig,
    ) -> Result<TrackingResult, CarrierError> {
        let adapter = CanonicalHttpAdapter::new(
            "gw",
            "https://gw.test",
            CapabilitySet::new(&[Capability::Track]),
        );
        let ctx = AdapterContext::new(gateway);
        let request = TrackRequest::new(Credentials::None, "3S1").expect("valid");

        let policy = RetryPolicy::from_settings(&config.retry);
        track_with_retry(&adapter, &ctx, &request, &policy).await
    }

    #[tokio::test]
    async fn transient_failure_is_retried_per_configured_policy() {
        // Given: one retry allowed and a gateway that fails once with 503
        let config =
            config(r#"{"max_retries":1,"base_delay_ms":1,"max_delay_ms":1,"jitter":false}"#);
        let gateway = Arc::new(FlakyGateway::new(vec![503]));

        // When: a parcel is tracked
        let result = track(gateway.clone(), &config)
            .await
            .expect("second attempt succeeds");

        // Then: the retry reached the carrier
        assert_eq!(result.status, "delivered");
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn zero_configured_retries_surface_the_first_failure() {
        let config = config(r#"{"max_retries":0}"#);
        let gateway = Arc::new(FlakyGateway::new(vec![503]));

        let error = track(gateway.clone(), &config).await.expect_err("no retry allowed");

        assert_eq!(error.category(), ErrorCategory::Transient);
        assert_eq!(gateway.calls(), 1);
    }
}
