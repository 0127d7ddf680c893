//! # Parcelport Core
//!
//! Carrier-agnostic contract for logistics carrier APIs.
//!
//! ## Overview
//!
//! Every carrier speaks its own auth scheme, request shape, and error
//! vocabulary. This crate puts one canonical surface in front of them:
//!
//! - **Capability-declared adapters**: callers discover what a carrier supports
//!   before invoking it
//! - **Batch aggregation** with count and status-flag invariants
//! - **Error taxonomy** mapping every failure to one retry-relevant category
//! - **Auth fallback** that swaps a rejected primary scheme for an exchanged
//!   token, cached and shared by all calls
//! - **Flow orchestration** for the shipment → parcel → close → label sequence
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Adapter trait, request types, capability gating |
//! | [`adapters`] | Concrete adapters (canonical JSON gateway) |
//! | [`auth_fallback`] | Token-exchange fallback around any transport |
//! | [`batch`] | Per-item results and batch aggregation |
//! | [`capability`] | Capability sets and ordering requirements |
//! | [`classify`] | Failure classification rules |
//! | [`config`] | Host configuration and env overrides |
//! | [`domain`] | Canonical model (Address, Parcel, Tracking, Rate) |
//! | [`error`] | `CarrierError`, categories, validation errors |
//! | [`flow`] | Label workflow and the `Store` boundary |
//! | [`http_client`] | Transport abstraction and reqwest client |
//! | [`registry`] | Adapter lookup by id |
//! | [`retry`] | Caller-side retry policy |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parcelport_core::{AdapterRegistry, CoreConfig, Credentials, ReqwestHttpClient, TrackRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::from_path("parcelport.json")?;
//!     let http = ReqwestHttpClient::new(&config.http.user_agent)?;
//!     let registry = AdapterRegistry::from_config(&config, Arc::new(http));
//!
//!     let (adapter, ctx) = registry.resolve("postnl")?;
//!     let request = TrackRequest::new(Credentials::None, "3SABCD1234567")?;
//!     let result = adapter.track(request, &ctx).await?;
//!     println!("{}: {}", result.tracking_number, result.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Host     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Flow            │────▶│ Store (optional) │
//! │ Orchestrator    │     └──────────────────┘
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Carrier Adapter │────▶│ Auth Fallback    │
//! │ (trait)         │     │ (HttpClient)     │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       ▼
//!          │              ┌──────────────────┐
//!          │              │ HTTP Client      │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Error Taxonomy  │
//! │ / Batch Results │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every failure leaving an adapter is a [`CarrierError`] whose category says
//! whether to retry:
//!
//! ```rust
//! use parcelport_core::{CarrierError, ErrorCategory};
//!
//! fn handle_error(error: CarrierError) {
//!     match error.category() {
//!         ErrorCategory::RateLimit => {
//!             // wait retry_after_ms, then retry
//!         }
//!         ErrorCategory::Transient => {
//!             // retry with backoff
//!         }
//!         ErrorCategory::Validation | ErrorCategory::Auth | ErrorCategory::Permanent => {
//!             // report to the caller
//!         }
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Credentials travel inside requests only, never in adapter state
//! - Credentials and exchanged tokens are redacted from `Debug` output and never logged

pub mod adapter;
pub mod adapters;
pub mod auth_fallback;
pub mod batch;
pub mod capability;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod flow;
pub mod http_client;
pub mod registry;
pub mod retry;

// Adapter contract
pub use adapter::{
    ensure_capability, AdapterContext, CarrierAdapter, CarrierFuture, CloseShipmentRequest,
    CreateLabelRequest, CreateLabelsRequest, CreateParcelRequest, CreateParcelsRequest,
    CreateShipmentRequest, Credentials, LabelItem, PickupPointsRequest, PickupRequest,
    RatesRequest, TrackRequest, VoidLabelRequest,
};

// Adapter implementations
pub use adapters::CanonicalHttpAdapter;

// Auth fallback
pub use auth_fallback::{
    AuthFallbackClient, CachedToken, ExchangeError, ExchangedToken, FallbackSignature,
    HttpTokenExchanger, TokenExchanger, TokenPlacement,
};

// Batch results
pub use batch::{
    BatchItem, BatchResponse, BatchSubject, CarrierResource, FailedCarrierResource, ItemError,
    ItemOutcome,
};

// Capabilities
pub use capability::{Capability, CapabilitySet, Requirement};

// Classification
pub use classify::{ClassifierConfig, ErrorClassifier, DEFAULT_RETRY_AFTER_MS};

// Configuration
pub use config::{AuthFallbackConfig, CarrierConfig, CoreConfig, FallbackConfig, HttpConfig};

// Domain models
pub use domain::{
    Address, Dimensions, LabelFormat, Parcel, PickupPoint, Rate, TrackingEvent, TrackingResult,
    UtcDateTime,
};

// Error types
pub use error::{CarrierError, CoreError, ErrorCategory, ValidationError};

// Flow orchestration
pub use flow::{
    FlowError, FlowOrchestrator, FlowOutcome, FlowStep, LabelFlowRequest, MemoryStore, Store,
    StoreError,
};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpMethod, HttpRequest,
    HttpResponse, ReqwestHttpClient,
};

// Registry
pub use registry::{AdapterRegistry, AdapterSnapshot};

// Retry logic
pub use retry::{retry_with_policy, Backoff, RetryDecision, RetryPolicy, RetrySettings};
