//! Capability-gated label workflow.
//!
//! ```text
//! create_shipment ──▶ create_parcel (each) ──▶ close_shipment ──▶ create_label (each)
//!   if supported        if supported            if createLabel      if supported
//!                                               requires it and
//!                                               it is supported
//! ```
//!
//! The first error aborts the remaining steps and comes back as a
//! [`FlowError`] holding everything produced so far. Nothing is rolled back.
//! Item-level failures inside a batch result are not errors: a parcel the
//! carrier rejected simply gets no label.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::Instrument;

use crate::adapter::{
    AdapterContext, CarrierAdapter, CloseShipmentRequest, CreateLabelRequest, CreateParcelRequest,
    CreateShipmentRequest, Credentials, LabelItem,
};
use crate::batch::{BatchItem, BatchResponse, BatchSubject, CarrierResource};
use crate::capability::{requires, Capability};
use crate::{Address, CarrierError, LabelFormat, Parcel, ValidationError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to persist '{key}': {message}")]
pub struct StoreError {
    pub key: String,
    pub message: String,
}

pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// Optional sink for intermediate flow results.
pub trait Store: Send + Sync {
    fn save<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a>;
}

/// In-process [`Store`] keeping records in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<(String, Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, Value)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.records().into_iter().rev().find_map(|(stored, value)| (stored == key).then_some(value))
    }
}

impl Store for MemoryStore {
    fn save<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a> {
        Box::pin(async move {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((key.to_owned(), value));
            Ok(())
        })
    }
}

/// Step of the label workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Validate,
    CreateShipment,
    CreateParcel,
    CloseShipment,
    CreateLabel,
    Persist,
}

impl FlowStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::CreateShipment => "create_shipment",
            Self::CreateParcel => "create_parcel",
            Self::CloseShipment => "close_shipment",
            Self::CreateLabel => "create_label",
            Self::Persist => "persist",
        }
    }
}

impl Display for FlowStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFlowRequest {
    pub credentials: Credentials,
    pub sender: Address,
    pub reference: Option<String>,
    pub parcels: Vec<Parcel>,
    pub format: LabelFormat,
}

/// Results accumulated by the workflow, complete or partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOutcome {
    /// Carrier shipment id, or a local id when the carrier has no shipments.
    pub shipment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<CarrierResource>,
    pub parcels: Vec<BatchItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closure: Option<CarrierResource>,
    pub labels: Vec<BatchItem>,
}

impl FlowOutcome {
    pub fn labels_batch(&self) -> BatchResponse {
        BatchResponse::aggregate(BatchSubject::Label, self.labels.clone())
    }

    pub fn parcels_batch(&self) -> BatchResponse {
        BatchResponse::aggregate(BatchSubject::Parcel, self.parcels.clone())
    }
}

/// First error of an aborted workflow, with the results produced before it.
#[derive(Debug, Clone, Error)]
#[error("label flow failed at {step}: {error}")]
pub struct FlowError {
    pub step: FlowStep,
    #[source]
    pub error: CarrierError,
    pub partial: FlowOutcome,
}

type StepResult = Result<(), (FlowStep, CarrierError)>;

/// Stateless sequencer for the create-label workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowOrchestrator;

impl FlowOrchestrator {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_labels(
        &self,
        adapter: &dyn CarrierAdapter,
        ctx: &AdapterContext,
        request: LabelFlowRequest,
        store: Option<&dyn Store>,
    ) -> Result<FlowOutcome, FlowError> {
        let span = tracing::info_span!(
            "label_flow",
            adapter = adapter.id(),
            parcels = request.parcels.len()
        );
        let mut outcome = FlowOutcome::default();

        match run(adapter, ctx, request, store, &mut outcome)
            .instrument(span)
            .await
        {
            Ok(()) => Ok(outcome),
            Err((step, error)) => {
                tracing::warn!(
                    step = step.as_str(),
                    category = error.category().as_str(),
                    "label flow aborted"
                );
                Err(FlowError {
                    step,
                    error,
                    partial: outcome,
                })
            }
        }
    }
}

async fn run(
    adapter: &dyn CarrierAdapter,
    ctx: &AdapterContext,
    request: LabelFlowRequest,
    store: Option<&dyn Store>,
    outcome: &mut FlowOutcome,
) -> StepResult {
    let LabelFlowRequest {
        credentials,
        sender,
        reference,
        parcels,
        format,
    } = request;

    if parcels.is_empty() {
        let error = ValidationError::EmptyBatch {
            operation: "label flow",
            item: "parcel",
        };
        return Err((FlowStep::Validate, error.into()));
    }

    let capabilities = adapter.capabilities();

    let shipment_id = if capabilities.supports(Capability::CreateShipment) {
        let shipment = adapter
            .create_shipment(
                CreateShipmentRequest {
                    credentials: credentials.clone(),
                    sender,
                    reference,
                },
                ctx,
            )
            .await
            .map_err(at(FlowStep::CreateShipment))?;
        let id = shipment.carrier_id().to_owned();
        tracing::debug!(shipment_id = %id, "shipment created");
        outcome.shipment_id = Some(id.clone());
        let shipment = outcome.shipment.insert(shipment);
        persist(store, &format!("{id}/shipment"), &*shipment).await?;
        id
    } else {
        let id = format!("local-{}", uuid::Uuid::new_v4());
        outcome.shipment_id = Some(id.clone());
        id
    };

    let label_items = if capabilities.supports(Capability::CreateParcel) {
        let mut items = Vec::with_capacity(parcels.len());
        for (index, parcel) in parcels.into_iter().enumerate() {
            let created = adapter
                .create_parcel(
                    CreateParcelRequest {
                        credentials: credentials.clone(),
                        shipment_id: Some(shipment_id.clone()),
                        parcel: parcel.clone(),
                    },
                    ctx,
                )
                .await
                .map_err(at(FlowStep::CreateParcel))?;
            match created.carrier_id() {
                Some(parcel_id) => items.push(LabelItem {
                    parcel_id: Some(parcel_id.to_owned()),
                    parcel,
                }),
                None => tracing::debug!(index, "parcel rejected by carrier; no label requested"),
            }
            outcome.parcels.push(created);
            let key = format!("{shipment_id}/parcels/{index}");
            persist(store, &key, &outcome.parcels[index]).await?;
        }
        items
    } else {
        parcels
            .into_iter()
            .map(|parcel| LabelItem {
                parcel_id: None,
                parcel,
            })
            .collect()
    };

    if requires(
        adapter.requirements(),
        Capability::CreateLabel,
        Capability::CloseShipment,
    ) && capabilities.supports(Capability::CloseShipment)
    {
        let closure = adapter
            .close_shipment(
                CloseShipmentRequest {
                    credentials: credentials.clone(),
                    shipment_id: shipment_id.clone(),
                },
                ctx,
            )
            .await
            .map_err(at(FlowStep::CloseShipment))?;
        let closure = outcome.closure.insert(closure);
        persist(store, &format!("{shipment_id}/closure"), &*closure).await?;
    }

    if capabilities.supports(Capability::CreateLabel) {
        for (index, item) in label_items.into_iter().enumerate() {
            let label = adapter
                .create_label(
                    CreateLabelRequest {
                        credentials: credentials.clone(),
                        shipment_id: Some(shipment_id.clone()),
                        format,
                        item,
                    },
                    ctx,
                )
                .await
                .map_err(at(FlowStep::CreateLabel))?;
            outcome.labels.push(label);
            let key = format!("{shipment_id}/labels/{index}");
            persist(store, &key, &outcome.labels[index]).await?;
        }
    }

    tracing::info!(
        parcels = outcome.parcels.len(),
        labels = outcome.labels.len(),
        "label flow finished"
    );
    Ok(())
}

fn at(step: FlowStep) -> impl FnOnce(CarrierError) -> (FlowStep, CarrierError) {
    move |error| (step, error)
}

async fn persist<T: Serialize>(store: Option<&dyn Store>, key: &str, value: &T) -> StepResult {
    let Some(store) = store else {
        return Ok(());
    };
    let value = serde_json::to_value(value).map_err(|error| {
        (
            FlowStep::Persist,
            CarrierError::permanent(format!("failed to serialize '{key}': {error}")),
        )
    })?;
    store
        .save(key, value)
        .await
        .map_err(|error| (FlowStep::Persist, CarrierError::transient(error.to_string())))
}
