use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::adapter::{
    ensure_capability, AdapterContext, CarrierAdapter, CarrierFuture, CloseShipmentRequest,
    CreateLabelsRequest, CreateParcelsRequest, CreateShipmentRequest, Credentials,
    PickupPointsRequest, PickupRequest, RatesRequest, TrackRequest, VoidLabelRequest,
};
use crate::batch::{BatchResponse, BatchSubject, CarrierResource, ItemError, ItemOutcome};
use crate::capability::{Capability, CapabilitySet, Requirement};
use crate::classify::{ClassifierConfig, ErrorClassifier};
use crate::config::CarrierConfig;
use crate::http_client::HttpRequest;
use crate::{CarrierError, PickupPoint, Rate, TrackingEvent, TrackingResult, UtcDateTime};

/// Adapter for carrier gateways that already speak the canonical JSON shapes.
///
/// Capabilities and requirements are fixed at construction; everything else
/// (credentials, transport) arrives per call.
#[derive(Debug, Clone)]
pub struct CanonicalHttpAdapter {
    id: String,
    base_url: String,
    capabilities: CapabilitySet,
    requirements: Vec<Requirement>,
    classifier: ErrorClassifier,
    timeout_ms: Option<u64>,
}

impl CanonicalHttpAdapter {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            capabilities,
            requirements: Vec::new(),
            classifier: ErrorClassifier::default(),
            timeout_ms: None,
        }
    }

    pub fn from_config(config: &CarrierConfig, classifier: ClassifierConfig) -> Self {
        Self::new(&config.id, &config.base_url, config.capabilities)
            .with_requirements(config.requirements())
            .with_classifier(ErrorClassifier::new(classifier))
    }

    pub fn with_requirements(mut self, requirements: Vec<Requirement>) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends one request and returns the parsed JSON body. Every failure is classified.
    async fn send(
        &self,
        ctx: &AdapterContext,
        credentials: &Credentials,
        request: HttpRequest,
    ) -> Result<Value, CarrierError> {
        let mut request = request
            .with_header("accept", "application/json")
            .with_auth(&credentials.to_http_auth());
        if let Some(timeout_ms) = self.timeout_ms {
            request = request.with_timeout_ms(timeout_ms);
        }
        if let Some(request_id) = ctx.request_id() {
            request = request.with_header("x-request-id", request_id);
        }

        let method = request.method.as_str();
        let response = ctx.http().execute(request).await.map_err(|error| {
            let classified = self.classifier.classify_transport(&error);
            tracing::warn!(
                adapter = %self.id,
                method,
                category = classified.category().as_str(),
                "carrier transport failure"
            );
            classified
        })?;

        if !response.is_success() {
            let classified = self.classifier.classify_response(&response);
            tracing::warn!(
                adapter = %self.id,
                method,
                status = response.status,
                category = classified.category().as_str(),
                "carrier rejected request"
            );
            return Err(classified);
        }

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body)
            .map_err(|error| self.classifier.classify_malformed(&response.body, error))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, body: &Value) -> Result<T, CarrierError> {
        serde_json::from_value(body.clone()).map_err(|error| {
            self.classifier
                .classify_malformed(&body.to_string(), error)
        })
    }

    fn batch_from_items(
        &self,
        subject: BatchSubject,
        submitted: usize,
        body: Value,
    ) -> Result<BatchResponse, CarrierError> {
        let Some(items) = body.get("items").and_then(Value::as_array) else {
            return Err(self
                .classifier
                .classify_malformed(&body.to_string(), "missing 'items' array"));
        };
        // Results are matched to inputs by position only.
        if items.len() != submitted {
            let detail = format!(
                "carrier returned {} results for {submitted} submitted items",
                items.len()
            );
            return Err(self.classifier.classify_malformed(&body.to_string(), detail));
        }

        let outcomes = items
            .iter()
            .map(|item| {
                let wire: WireItem = self.decode(item)?;
                Ok(ItemOutcome {
                    carrier_id: wire.id,
                    status: wire.status,
                    errors: wire.errors,
                    raw: item.clone(),
                    metadata: wire.metadata,
                })
            })
            .collect::<Result<Vec<_>, CarrierError>>()?;

        Ok(BatchResponse::from_outcomes(subject, outcomes).with_raw_carrier_response(body))
    }

    fn resource(
        &self,
        body: Value,
        fallback_id: Option<&str>,
        default_status: &str,
    ) -> Result<CarrierResource, CarrierError> {
        let wire: WireItem = self.decode(&body)?;
        if !wire.errors.is_empty() {
            let detail = wire
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CarrierError::validation(format!("carrier reported errors: {detail}"))
                .with_raw(body));
        }

        let id = wire
            .id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| fallback_id.map(str::to_owned));
        let Some(id) = id else {
            return Err(self
                .classifier
                .classify_malformed(&body.to_string(), "response has no identifier"));
        };
        let status = wire
            .status
            .unwrap_or_else(|| default_status.to_owned());

        let resource = CarrierResource::new(id, status, body);
        Ok(match wire.metadata {
            Some(metadata) => resource.with_metadata(metadata),
            None => resource,
        })
    }
}

/// Batch operations accept the single-item capability for one-element calls,
/// which is how `create_parcel` and `create_label` reach them.
fn ensure_batch_capability(
    adapter: &CanonicalHttpAdapter,
    batch: Capability,
    single: Capability,
    len: usize,
) -> Result<(), CarrierError> {
    if len == 1 && adapter.capabilities.supports(single) {
        return Ok(());
    }
    ensure_capability(adapter, batch)
}

#[derive(Deserialize)]
struct WireItem {
    #[serde(default, alias = "carrierId")]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ItemError>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTracking {
    #[serde(default)]
    tracking_number: Option<String>,
    #[serde(default)]
    events: Vec<TrackingEvent>,
}

#[derive(Deserialize)]
struct WirePickupPoints {
    #[serde(default)]
    items: Vec<PickupPoint>,
}

#[derive(Deserialize)]
struct WireRates {
    #[serde(default)]
    rates: Vec<Rate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePickupRequest<'a> {
    address: &'a crate::Address,
    parcel_ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    earliest: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<UtcDateTime>,
}

fn json_request(request: HttpRequest, payload: &Value) -> Result<HttpRequest, CarrierError> {
    request
        .with_json(payload)
        .map_err(|error| CarrierError::permanent(format!("failed to encode request: {error}")))
}

impl CarrierAdapter for CanonicalHttpAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    fn create_parcels<'a>(
        &'a self,
        req: CreateParcelsRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, BatchResponse> {
        Box::pin(async move {
            ensure_batch_capability(
                self,
                Capability::CreateParcels,
                Capability::CreateParcel,
                req.parcels.len(),
            )?;
            if req.parcels.is_empty() {
                return Ok(BatchResponse::aggregate(BatchSubject::Parcel, Vec::new()));
            }
            for parcel in &req.parcels {
                parcel.validate()?;
            }

            let payload = json!({
                "shipmentId": req.shipment_id,
                "parcels": req.parcels,
            });
            let request = json_request(HttpRequest::post(self.url("/parcels")), &payload)?;
            let body = self.send(ctx, &req.credentials, request).await?;
            let batch = self.batch_from_items(BatchSubject::Parcel, req.parcels.len(), body)?;

            tracing::debug!(
                adapter = %self.id,
                total = batch.total_count(),
                failed = batch.failure_count(),
                "parcels submitted"
            );
            Ok(batch)
        })
    }

    fn create_labels<'a>(
        &'a self,
        req: CreateLabelsRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, BatchResponse> {
        Box::pin(async move {
            ensure_batch_capability(
                self,
                Capability::CreateLabels,
                Capability::CreateLabel,
                req.items.len(),
            )?;
            if req.items.is_empty() {
                return Ok(BatchResponse::aggregate(BatchSubject::Label, Vec::new()));
            }

            let items = req
                .items
                .iter()
                .map(|item| {
                    item.parcel.validate()?;
                    Ok(json!({ "parcelId": item.parcel_id, "parcel": item.parcel }))
                })
                .collect::<Result<Vec<_>, CarrierError>>()?;
            let payload = json!({
                "shipmentId": req.shipment_id,
                "format": req.format,
                "items": items,
            });
            let request = json_request(HttpRequest::post(self.url("/labels")), &payload)?;
            let body = self.send(ctx, &req.credentials, request).await?;
            self.batch_from_items(BatchSubject::Label, req.items.len(), body)
        })
    }

    fn track<'a>(
        &'a self,
        req: TrackRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, TrackingResult> {
        Box::pin(async move {
            ensure_capability(self, Capability::Track)?;
            let url = self.url(&format!(
                "/tracking/{}",
                urlencoding::encode(&req.tracking_number)
            ));
            let body = self.send(ctx, &req.credentials, HttpRequest::get(url)).await?;
            let wire: WireTracking = self.decode(&body)?;

            Ok(TrackingResult::new(
                wire.tracking_number
                    .unwrap_or_else(|| req.tracking_number.clone()),
                wire.events,
                body,
            ))
        })
    }

    fn fetch_pickup_points<'a>(
        &'a self,
        req: PickupPointsRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, Vec<PickupPoint>> {
        Box::pin(async move {
            ensure_capability(self, Capability::ListPickupPoints)?;
            let url = self.url(&format!(
                "/pickup-points?postalCode={}&country={}&limit={}",
                urlencoding::encode(&req.postal_code),
                urlencoding::encode(&req.country),
                req.limit
            ));
            let body = self.send(ctx, &req.credentials, HttpRequest::get(url)).await?;
            let wire: WirePickupPoints = self.decode(&body)?;

            let mut points = wire.items;
            points.truncate(req.limit);
            Ok(points)
        })
    }

    fn request_pickup<'a>(
        &'a self,
        req: PickupRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        Box::pin(async move {
            ensure_capability(self, Capability::RequestPickup)?;
            req.address.validate()?;
            let payload = serde_json::to_value(WirePickupRequest {
                address: &req.address,
                parcel_ids: &req.parcel_ids,
                earliest: req.earliest,
                latest: req.latest,
            })
            .map_err(|error| CarrierError::permanent(format!("failed to encode request: {error}")))?;
            let request = json_request(HttpRequest::post(self.url("/pickups")), &payload)?;
            let body = self.send(ctx, &req.credentials, request).await?;
            self.resource(body, None, "requested")
        })
    }

    fn get_rates<'a>(
        &'a self,
        req: RatesRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, Vec<Rate>> {
        Box::pin(async move {
            ensure_capability(self, Capability::GetRates)?;
            req.sender.validate()?;
            for parcel in &req.parcels {
                parcel.validate()?;
            }
            let payload = json!({ "sender": req.sender, "parcels": req.parcels });
            let request = json_request(HttpRequest::post(self.url("/rates")), &payload)?;
            let body = self.send(ctx, &req.credentials, request).await?;
            let wire: WireRates = self.decode(&body)?;
            Ok(wire.rates)
        })
    }

    fn void_label<'a>(
        &'a self,
        req: VoidLabelRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        Box::pin(async move {
            ensure_capability(self, Capability::VoidLabel)?;
            let url = self.url(&format!("/labels/{}", urlencoding::encode(&req.label_id)));
            let body = self
                .send(ctx, &req.credentials, HttpRequest::delete(url))
                .await?;
            let body = if body.is_null() { json!({}) } else { body };
            self.resource(body, Some(&req.label_id), "voided")
        })
    }

    fn create_shipment<'a>(
        &'a self,
        req: CreateShipmentRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        Box::pin(async move {
            ensure_capability(self, Capability::CreateShipment)?;
            req.sender.validate()?;
            let payload = json!({ "sender": req.sender, "reference": req.reference });
            let request = json_request(HttpRequest::post(self.url("/shipments")), &payload)?;
            let body = self.send(ctx, &req.credentials, request).await?;
            self.resource(body, None, "open")
        })
    }

    fn close_shipment<'a>(
        &'a self,
        req: CloseShipmentRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        Box::pin(async move {
            ensure_capability(self, Capability::CloseShipment)?;
            let url = self.url(&format!(
                "/shipments/{}/close",
                urlencoding::encode(&req.shipment_id)
            ));
            let body = self
                .send(ctx, &req.credentials, HttpRequest::post(url))
                .await?;
            let body = if body.is_null() { json!({}) } else { body };
            self.resource(body, Some(&req.shipment_id), "closed")
        })
    }
}
