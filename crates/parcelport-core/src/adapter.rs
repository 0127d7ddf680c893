//! Carrier adapter contract and request types.
//!
//! [`CarrierAdapter`] exposes every canonical operation, but each one is
//! individually optional: an adapter overrides the subset it supports and
//! declares that subset in [`CarrierAdapter::capabilities`]. Operations an
//! adapter does not override fail with a Permanent [`CarrierError`] naming the
//! missing capability and the adapter id.
//!
//! | Operation | Request | Response | Capability |
//! |-----------|---------|----------|------------|
//! | `create_parcel` | [`CreateParcelRequest`] | [`BatchItem`] | `CREATE_PARCEL` |
//! | `create_parcels` | [`CreateParcelsRequest`] | [`BatchResponse`] | `CREATE_PARCELS` |
//! | `create_label` | [`CreateLabelRequest`] | [`BatchItem`] | `CREATE_LABEL` |
//! | `create_labels` | [`CreateLabelsRequest`] | [`BatchResponse`] | `CREATE_LABELS` |
//! | `track` | [`TrackRequest`] | [`TrackingResult`] | `TRACK` |
//! | `fetch_pickup_points` | [`PickupPointsRequest`] | `Vec<PickupPoint>` | `LIST_PICKUP_POINTS` |
//! | `request_pickup` | [`PickupRequest`] | [`CarrierResource`] | `REQUEST_PICKUP` |
//! | `get_rates` | [`RatesRequest`] | `Vec<Rate>` | `GET_RATES` |
//! | `void_label` | [`VoidLabelRequest`] | [`CarrierResource`] | `VOID_LABEL` |
//! | `create_shipment` | [`CreateShipmentRequest`] | [`CarrierResource`] | `CREATE_SHIPMENT` |
//! | `close_shipment` | [`CloseShipmentRequest`] | [`CarrierResource`] | `CLOSE_SHIPMENT` |
//!
//! Single-item operations are implemented once, here, as a one-element call
//! into their batch counterpart followed by [`BatchResponse::into_single`], so
//! both paths always produce the same per-item outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! use parcelport_core::{AdapterContext, Capability, CarrierAdapter, TrackRequest};
//!
//! async fn status(adapter: &dyn CarrierAdapter, ctx: &AdapterContext, req: TrackRequest) {
//!     if adapter.capabilities().supports(Capability::Track) {
//!         match adapter.track(req, ctx).await {
//!             Ok(result) => println!("{}: {}", result.tracking_number, result.status),
//!             Err(error) if error.retryable() => { /* back off and retry */ }
//!             Err(error) => eprintln!("{error}"),
//!         }
//!     }
//! }
//! ```

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::batch::{BatchItem, BatchResponse, CarrierResource};
use crate::capability::{Capability, CapabilitySet, Requirement};
use crate::http_client::{HttpAuth, HttpClient};
use crate::{
    Address, CarrierError, LabelFormat, Parcel, PickupPoint, Rate, TrackingResult, UtcDateTime,
    ValidationError,
};

pub type CarrierFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CarrierError>> + Send + 'a>>;

/// Credentials for one carrier account. Travel inside requests only.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
    Bearer(String),
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn to_http_auth(&self) -> HttpAuth {
        match self {
            Self::None => HttpAuth::None,
            Self::Basic { username, password } => HttpAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            Self::ApiKey { header, key } => HttpAuth::Header {
                name: header.clone(),
                value: key.clone(),
            },
            Self::Bearer(token) => HttpAuth::BearerToken(token.clone()),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .finish_non_exhaustive(),
            Self::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

/// Per-call collaborators: the injected transport and a correlation id for logs.
#[derive(Clone)]
pub struct AdapterContext {
    http: Arc<dyn HttpClient>,
    request_id: Option<String>,
}

impl AdapterContext {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

impl Debug for AdapterContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateParcelsRequest {
    pub credentials: Credentials,
    pub shipment_id: Option<String>,
    pub parcels: Vec<Parcel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateParcelRequest {
    pub credentials: Credentials,
    pub shipment_id: Option<String>,
    pub parcel: Parcel,
}

impl CreateParcelRequest {
    pub fn into_batch(self) -> CreateParcelsRequest {
        CreateParcelsRequest {
            credentials: self.credentials,
            shipment_id: self.shipment_id,
            parcels: vec![self.parcel],
        }
    }
}

/// Parcel to print a label for, with the carrier's parcel id when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelItem {
    pub parcel_id: Option<String>,
    pub parcel: Parcel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLabelsRequest {
    pub credentials: Credentials,
    pub shipment_id: Option<String>,
    pub format: LabelFormat,
    pub items: Vec<LabelItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLabelRequest {
    pub credentials: Credentials,
    pub shipment_id: Option<String>,
    pub format: LabelFormat,
    pub item: LabelItem,
}

impl CreateLabelRequest {
    pub fn into_batch(self) -> CreateLabelsRequest {
        CreateLabelsRequest {
            credentials: self.credentials,
            shipment_id: self.shipment_id,
            format: self.format,
            items: vec![self.item],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub credentials: Credentials,
    pub tracking_number: String,
}

impl TrackRequest {
    pub fn new(
        credentials: Credentials,
        tracking_number: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let tracking_number = tracking_number.into().trim().to_owned();
        if tracking_number.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "tracking_number",
            });
        }
        Ok(Self {
            credentials,
            tracking_number,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickupPointsRequest {
    pub credentials: Credentials,
    pub postal_code: String,
    pub country: String,
    pub limit: usize,
}

impl PickupPointsRequest {
    pub fn new(
        credentials: Credentials,
        postal_code: impl Into<String>,
        country: impl AsRef<str>,
        limit: usize,
    ) -> Result<Self, ValidationError> {
        let postal_code = postal_code.into();
        if postal_code.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "postal_code",
            });
        }
        Ok(Self {
            credentials,
            postal_code,
            country: crate::domain::validate_country_code(country.as_ref())?,
            limit: limit.max(1),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickupRequest {
    pub credentials: Credentials,
    pub address: Address,
    pub parcel_ids: Vec<String>,
    pub earliest: Option<UtcDateTime>,
    pub latest: Option<UtcDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatesRequest {
    pub credentials: Credentials,
    pub sender: Address,
    pub parcels: Vec<Parcel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidLabelRequest {
    pub credentials: Credentials,
    pub label_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateShipmentRequest {
    pub credentials: Credentials,
    pub sender: Address,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseShipmentRequest {
    pub credentials: Credentials,
    pub shipment_id: String,
}

/// Canonical carrier adapter contract.
///
/// Adapters are stateless: everything an operation needs arrives in the
/// request (payload and credentials) and the [`AdapterContext`] (transport).
/// Implementations must be `Send + Sync` so one instance can serve
/// concurrent calls.
///
/// Do not override `create_parcel` or `create_label`; they delegate to the
/// batch operations.
pub trait CarrierAdapter: Send + Sync {
    /// Stable adapter identifier, used in errors and logs.
    fn id(&self) -> &str;

    /// Operations this adapter implements. Fixed at construction.
    fn capabilities(&self) -> CapabilitySet;

    /// Ordering dependencies between operations, consulted by the flow orchestrator.
    fn requirements(&self) -> &[Requirement] {
        &[]
    }

    fn create_parcels<'a>(
        &'a self,
        req: CreateParcelsRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, BatchResponse> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::CreateParcels)
    }

    fn create_parcel<'a>(
        &'a self,
        req: CreateParcelRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, BatchItem> {
        Box::pin(async move {
            ensure_capability(self, Capability::CreateParcel)?;
            self.create_parcels(req.into_batch(), ctx)
                .await?
                .into_single()
        })
    }

    fn create_labels<'a>(
        &'a self,
        req: CreateLabelsRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, BatchResponse> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::CreateLabels)
    }

    fn create_label<'a>(
        &'a self,
        req: CreateLabelRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, BatchItem> {
        Box::pin(async move {
            ensure_capability(self, Capability::CreateLabel)?;
            self.create_labels(req.into_batch(), ctx)
                .await?
                .into_single()
        })
    }

    fn track<'a>(
        &'a self,
        req: TrackRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, TrackingResult> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::Track)
    }

    fn fetch_pickup_points<'a>(
        &'a self,
        req: PickupPointsRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, Vec<PickupPoint>> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::ListPickupPoints)
    }

    fn request_pickup<'a>(
        &'a self,
        req: PickupRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::RequestPickup)
    }

    fn get_rates<'a>(
        &'a self,
        req: RatesRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, Vec<Rate>> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::GetRates)
    }

    fn void_label<'a>(
        &'a self,
        req: VoidLabelRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::VoidLabel)
    }

    fn create_shipment<'a>(
        &'a self,
        req: CreateShipmentRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::CreateShipment)
    }

    fn close_shipment<'a>(
        &'a self,
        req: CloseShipmentRequest,
        ctx: &'a AdapterContext,
    ) -> CarrierFuture<'a, CarrierResource> {
        let _ = (req, ctx);
        unsupported(self.id(), Capability::CloseShipment)
    }
}

/// Fails with a Permanent error unless `adapter` declares `capability`.
pub fn ensure_capability<A>(adapter: &A, capability: Capability) -> Result<(), CarrierError>
where
    A: CarrierAdapter + ?Sized,
{
    if adapter.capabilities().supports(capability) {
        return Ok(());
    }
    tracing::warn!(
        adapter = adapter.id(),
        capability = capability.as_str(),
        "operation invoked on adapter that does not declare it"
    );
    Err(CarrierError::unsupported_capability(capability, adapter.id()))
}

fn unsupported<'a, T: Send + 'a>(adapter_id: &str, capability: Capability) -> CarrierFuture<'a, T> {
    let error = CarrierError::unsupported_capability(capability, adapter_id);
    Box::pin(async move { Err(error) })
}
