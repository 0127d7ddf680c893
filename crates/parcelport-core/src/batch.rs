//! Batch result aggregation.
//!
//! Batch-capable operations return a [`BatchResponse`]: the per-item results in
//! input order plus counts, three mutually exclusive status flags, and a human
//! summary. Individual item failures never raise; they are carried in-band as
//! [`FailedCarrierResource`] entries.
//!
//! | Outcome | `allSucceeded` | `allFailed` | `someFailed` | HTTP |
//! |---------|----------------|-------------|--------------|------|
//! | no items | false | false | false | 200 |
//! | every item succeeded | true | false | false | 200 |
//! | every item failed | false | true | false | 400 |
//! | mixed | false | false | true | 207 |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CarrierError;

/// Structured per-item validation error reported by a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub code: String,
    pub message: String,
}

impl ItemError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: None,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn for_field(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(code, message)
        }
    }

    /// Used when a carrier reported neither an identifier nor an error for an item.
    pub fn missing_carrier_id() -> Self {
        Self::new(
            "missing_carrier_id",
            "carrier response did not include an identifier for this item",
        )
    }
}

/// Result of one successful provider-side operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierResource {
    carrier_id: String,
    status: String,
    raw: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
}

impl CarrierResource {
    pub fn new(carrier_id: impl Into<String>, status: impl Into<String>, raw: Value) -> Self {
        Self {
            carrier_id: carrier_id.into(),
            status: status.into(),
            raw,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn carrier_id(&self) -> &str {
        &self.carrier_id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FailedStatus {
    Failed,
}

/// Item-level failure: no carrier id, status fixed to `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCarrierResource {
    status: FailedStatus,
    errors: Vec<ItemError>,
    raw: Value,
}

impl FailedCarrierResource {
    /// Builds a failure. An empty error list is replaced by a `missing_carrier_id` entry
    /// so every failure carries at least one structured error.
    pub fn new(errors: Vec<ItemError>, raw: Value) -> Self {
        let errors = if errors.is_empty() {
            vec![ItemError::missing_carrier_id()]
        } else {
            errors
        };
        Self {
            status: FailedStatus::Failed,
            errors,
            raw,
        }
    }

    pub const fn status(&self) -> &'static str {
        "failed"
    }

    pub fn errors(&self) -> &[ItemError] {
        &self.errors
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Per-item slot of a batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Failed(FailedCarrierResource),
    Succeeded(CarrierResource),
}

impl BatchItem {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn status(&self) -> &str {
        match self {
            Self::Succeeded(resource) => resource.status(),
            Self::Failed(failure) => failure.status(),
        }
    }

    pub fn carrier_id(&self) -> Option<&str> {
        match self {
            Self::Succeeded(resource) => Some(resource.carrier_id()),
            Self::Failed(_) => None,
        }
    }

    pub fn errors(&self) -> &[ItemError] {
        match self {
            Self::Succeeded(_) => &[],
            Self::Failed(failure) => failure.errors(),
        }
    }

    pub fn raw(&self) -> &Value {
        match self {
            Self::Succeeded(resource) => resource.raw(),
            Self::Failed(failure) => failure.raw(),
        }
    }

    pub fn as_success(&self) -> Option<&CarrierResource> {
        match self {
            Self::Succeeded(resource) => Some(resource),
            Self::Failed(_) => None,
        }
    }
}

/// Raw per-item outcome as an adapter extracted it from a carrier response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemOutcome {
    pub carrier_id: Option<String>,
    pub status: Option<String>,
    pub errors: Vec<ItemError>,
    pub raw: Value,
    pub metadata: Option<Map<String, Value>>,
}

impl ItemOutcome {
    pub fn succeeded(carrier_id: impl Into<String>, status: impl Into<String>, raw: Value) -> Self {
        Self {
            carrier_id: Some(carrier_id.into()),
            status: Some(status.into()),
            raw,
            ..Self::default()
        }
    }

    pub fn failed(errors: Vec<ItemError>, raw: Value) -> Self {
        Self {
            errors,
            raw,
            ..Self::default()
        }
    }

    /// Success means a non-empty carrier id and no errors; anything else is a failure.
    pub fn into_item(self) -> BatchItem {
        let carrier_id = self
            .carrier_id
            .filter(|id| !id.trim().is_empty());

        match carrier_id {
            Some(id) if self.errors.is_empty() => {
                let status = self
                    .status
                    .filter(|status| !status.trim().is_empty())
                    .unwrap_or_else(|| String::from("created"));
                let resource = CarrierResource::new(id, status, self.raw);
                BatchItem::Succeeded(match self.metadata {
                    Some(metadata) => resource.with_metadata(metadata),
                    None => resource,
                })
            }
            _ => BatchItem::Failed(FailedCarrierResource::new(self.errors, self.raw)),
        }
    }
}

/// What a batch was about; only affects the summary wording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchSubject {
    Parcel,
    Label,
    Shipment,
    Pickup,
    #[default]
    Item,
}

impl BatchSubject {
    pub const fn noun(self, count: usize) -> &'static str {
        let singular = count == 1;
        match self {
            Self::Parcel if singular => "parcel",
            Self::Parcel => "parcels",
            Self::Label if singular => "label",
            Self::Label => "labels",
            Self::Shipment if singular => "shipment",
            Self::Shipment => "shipments",
            Self::Pickup if singular => "pickup",
            Self::Pickup => "pickups",
            Self::Item if singular => "item",
            Self::Item => "items",
        }
    }
}

/// Aggregated outcome of a batch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "BatchWire")]
pub struct BatchResponse {
    results: Vec<BatchItem>,
    success_count: usize,
    failure_count: usize,
    total_count: usize,
    all_succeeded: bool,
    all_failed: bool,
    some_failed: bool,
    summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_carrier_response: Option<Value>,
}

impl BatchResponse {
    /// Aggregates already-classified items in a single pass, preserving order.
    pub fn aggregate(subject: BatchSubject, results: Vec<BatchItem>) -> Self {
        let success_count = results.iter().filter(|item| item.is_success()).count();
        let total_count = results.len();
        let failure_count = total_count - success_count;

        let all_succeeded = failure_count == 0 && total_count > 0;
        let all_failed = success_count == 0 && total_count > 0;
        let some_failed = success_count > 0 && failure_count > 0;

        let summary = if total_count == 0 {
            String::from("No items to process")
        } else if all_succeeded {
            format!(
                "All {total_count} {} created successfully",
                subject.noun(total_count)
            )
        } else if all_failed {
            format!("All {total_count} {} failed", subject.noun(total_count))
        } else {
            format!("Mixed results: {success_count} succeeded, {failure_count} failed")
        };

        Self {
            results,
            success_count,
            failure_count,
            total_count,
            all_succeeded,
            all_failed,
            some_failed,
            summary,
            raw_carrier_response: None,
        }
    }

    pub fn from_outcomes(
        subject: BatchSubject,
        outcomes: impl IntoIterator<Item = ItemOutcome>,
    ) -> Self {
        Self::aggregate(
            subject,
            outcomes.into_iter().map(ItemOutcome::into_item).collect(),
        )
    }

    pub fn with_raw_carrier_response(mut self, raw: Value) -> Self {
        self.raw_carrier_response = Some(raw);
        self
    }

    pub fn results(&self) -> &[BatchItem] {
        &self.results
    }

    pub fn into_results(self) -> Vec<BatchItem> {
        self.results
    }

    pub const fn success_count(&self) -> usize {
        self.success_count
    }

    pub const fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub const fn total_count(&self) -> usize {
        self.total_count
    }

    pub const fn all_succeeded(&self) -> bool {
        self.all_succeeded
    }

    pub const fn all_failed(&self) -> bool {
        self.all_failed
    }

    pub const fn some_failed(&self) -> bool {
        self.some_failed
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn raw_carrier_response(&self) -> Option<&Value> {
        self.raw_carrier_response.as_ref()
    }

    pub fn successes(&self) -> impl Iterator<Item = &CarrierResource> {
        self.results.iter().filter_map(BatchItem::as_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedCarrierResource> {
        self.results.iter().filter_map(|item| match item {
            BatchItem::Failed(failure) => Some(failure),
            BatchItem::Succeeded(_) => None,
        })
    }

    /// Transport status a host should answer with for this batch.
    pub const fn http_status(&self) -> u16 {
        if self.some_failed {
            207
        } else if self.all_failed {
            400
        } else {
            200
        }
    }

    /// Unwraps the sole result of a one-element batch.
    pub fn into_single(self) -> Result<BatchItem, CarrierError> {
        let count = self.results.len();
        let mut results = self.results;
        match (count, results.pop()) {
            (1, Some(item)) => Ok(item),
            _ => Err(CarrierError::permanent(format!(
                "expected exactly one result from carrier, received {count}"
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchWire {
    results: Vec<BatchItem>,
    #[serde(default)]
    raw_carrier_response: Option<Value>,
}

impl From<BatchWire> for BatchResponse {
    fn from(wire: BatchWire) -> Self {
        let response = Self::aggregate(BatchSubject::Item, wire.results);
        match wire.raw_carrier_response {
            Some(raw) => response.with_raw_carrier_response(raw),
            None => response,
        }
    }
}
