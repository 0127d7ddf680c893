//! Capability declarations for carrier adapters.
//!
//! An adapter advertises the operations it implements as a [`CapabilitySet`]
//! fixed at construction. Ordering dependencies between operations (for
//! example "labels can only be printed once the shipment is closed") are
//! declared as static [`Requirement`] metadata and consulted by the flow
//! orchestrator; adapters never enforce them themselves.
//!
//! | Capability | Operation |
//! |------------|-----------|
//! | `CREATE_PARCEL` | `create_parcel` |
//! | `CREATE_PARCELS` | `create_parcels` |
//! | `CREATE_LABEL` | `create_label` |
//! | `CREATE_LABELS` | `create_labels` |
//! | `TRACK` | `track` |
//! | `LIST_PICKUP_POINTS` | `fetch_pickup_points` |
//! | `REQUEST_PICKUP` | `request_pickup` |
//! | `GET_RATES` | `get_rates` |
//! | `VOID_LABEL` | `void_label` |
//! | `CREATE_SHIPMENT` | `create_shipment` |
//! | `CLOSE_SHIPMENT` | `close_shipment` |

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Named operation an adapter may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    CreateParcel,
    CreateParcels,
    CreateLabel,
    CreateLabels,
    Track,
    ListPickupPoints,
    RequestPickup,
    GetRates,
    VoidLabel,
    CreateShipment,
    CloseShipment,
}

impl Capability {
    pub const ALL: [Self; 11] = [
        Self::CreateParcel,
        Self::CreateParcels,
        Self::CreateLabel,
        Self::CreateLabels,
        Self::Track,
        Self::ListPickupPoints,
        Self::RequestPickup,
        Self::GetRates,
        Self::VoidLabel,
        Self::CreateShipment,
        Self::CloseShipment,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateParcel => "CREATE_PARCEL",
            Self::CreateParcels => "CREATE_PARCELS",
            Self::CreateLabel => "CREATE_LABEL",
            Self::CreateLabels => "CREATE_LABELS",
            Self::Track => "TRACK",
            Self::ListPickupPoints => "LIST_PICKUP_POINTS",
            Self::RequestPickup => "REQUEST_PICKUP",
            Self::GetRates => "GET_RATES",
            Self::VoidLabel => "VOID_LABEL",
            Self::CreateShipment => "CREATE_SHIPMENT",
            Self::CloseShipment => "CLOSE_SHIPMENT",
        }
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|capability| capability.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidCapability {
                value: value.to_owned(),
            })
    }
}

/// Static, read-only set of capabilities an adapter declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Capability>", into = "Vec<Capability>")]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn new(capabilities: &[Capability]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < capabilities.len() {
            bits |= capabilities[index].bit();
            index += 1;
        }
        Self(bits)
    }

    pub const fn full() -> Self {
        Self::new(&Capability::ALL)
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub const fn supports(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |capability| self.supports(*capability))
    }

    pub fn supported_capabilities(self) -> Vec<&'static str> {
        self.iter().map(Capability::as_str).collect()
    }
}

impl From<Vec<Capability>> for CapabilitySet {
    fn from(value: Vec<Capability>) -> Self {
        Self::new(&value)
    }
}

impl From<CapabilitySet> for Vec<Capability> {
    fn from(value: CapabilitySet) -> Self {
        value.iter().collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// "`operation` may only run after `requires` has been exercised."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    pub operation: Capability,
    pub requires: Capability,
}

impl Requirement {
    pub const fn new(operation: Capability, requires: Capability) -> Self {
        Self {
            operation,
            requires,
        }
    }
}

/// Returns true when `requirements` declare that `operation` depends on `dependency`.
pub fn requires(requirements: &[Requirement], operation: Capability, dependency: Capability) -> bool {
    requirements
        .iter()
        .any(|requirement| requirement.operation == operation && requirement.requires == dependency)
}
