use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Postal address in the canonical model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub street: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
    pub postal_code: String,
    pub city: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Address {
    pub fn new(
        name: impl Into<String>,
        street: impl Into<String>,
        postal_code: impl Into<String>,
        city: impl Into<String>,
        country: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        let address = Self {
            name: name.into(),
            company: None,
            street: street.into(),
            house_number: None,
            postal_code: postal_code.into(),
            city: city.into(),
            country: validate_country_code(country.as_ref())?,
            email: None,
            phone: None,
        };
        address.validate()?;
        Ok(address)
    }

    /// Re-checks invariants; used after deserializing untrusted input.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("name", &self.name)?;
        require_non_empty("street", &self.street)?;
        require_non_empty("postal_code", &self.postal_code)?;
        require_non_empty("city", &self.city)?;
        validate_country_code(&self.country)?;
        Ok(())
    }
}

/// Outer parcel dimensions in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub length_mm: u32,
    pub width_mm: u32,
    pub height_mm: u32,
}

impl Dimensions {
    pub fn new(length_mm: u32, width_mm: u32, height_mm: u32) -> Result<Self, ValidationError> {
        let dimensions = Self {
            length_mm,
            width_mm,
            height_mm,
        };
        dimensions.validate()?;
        Ok(dimensions)
    }

    fn validate(self) -> Result<(), ValidationError> {
        if self.length_mm == 0 {
            return Err(ValidationError::ZeroDimension { field: "length_mm" });
        }
        if self.width_mm == 0 {
            return Err(ValidationError::ZeroDimension { field: "width_mm" });
        }
        if self.height_mm == 0 {
            return Err(ValidationError::ZeroDimension { field: "height_mm" });
        }
        Ok(())
    }
}

/// Canonical parcel: one physical package going to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    /// Caller-side reference, echoed back by most carriers.
    pub reference: String,
    pub recipient: Address,
    pub weight_grams: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_code: Option<String>,
}

impl Parcel {
    pub fn new(
        reference: impl Into<String>,
        recipient: Address,
        weight_grams: u32,
    ) -> Result<Self, ValidationError> {
        let parcel = Self {
            reference: reference.into(),
            recipient,
            weight_grams,
            dimensions: None,
            service_code: None,
        };
        parcel.validate()?;
        Ok(parcel)
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_service_code(mut self, service_code: impl Into<String>) -> Self {
        self.service_code = Some(service_code.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("reference", &self.reference)?;
        if self.weight_grams == 0 {
            return Err(ValidationError::ZeroWeight);
        }
        if let Some(dimensions) = self.dimensions {
            dimensions.validate()?;
        }
        self.recipient.validate()
    }
}

/// Label document format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelFormat {
    #[default]
    Pdf,
    Zpl,
    Png,
}

impl LabelFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Zpl => "zpl",
            Self::Png => "png",
        }
    }
}

impl Display for LabelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelFormat {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "zpl" => Ok(Self::Zpl),
            "png" => Ok(Self::Png),
            _ => Err(ValidationError::InvalidLabelFormat {
                value: value.to_owned(),
            }),
        }
    }
}

/// One scan or status change reported by a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub occurred_at: UtcDateTime,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Normalized tracking history, newest event last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingResult {
    pub tracking_number: String,
    pub status: String,
    pub events: Vec<TrackingEvent>,
    pub raw: serde_json::Value,
}

impl TrackingResult {
    pub fn new(
        tracking_number: impl Into<String>,
        mut events: Vec<TrackingEvent>,
        raw: serde_json::Value,
    ) -> Self {
        events.sort_by_key(|event| event.occurred_at);
        let status = events
            .last()
            .map(|event| event.status.clone())
            .unwrap_or_else(|| String::from("unknown"));
        Self {
            tracking_number: tracking_number.into(),
            status,
            events,
            raw,
        }
    }
}

/// Parcel shop or locker where recipients can collect parcels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupPoint {
    pub id: String,
    pub name: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opening_hours: Vec<String>,
}

/// Price quote for one carrier service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rate {
    pub service_code: String,
    /// Amount in minor currency units.
    pub amount_minor: u64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_days: Option<u16>,
}

impl Rate {
    pub fn new(
        service_code: impl Into<String>,
        amount_minor: u64,
        currency: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        let service_code = service_code.into();
        require_non_empty("service_code", &service_code)?;
        Ok(Self {
            service_code,
            amount_minor,
            currency: validate_currency_code(currency.as_ref())?,
            transit_days: None,
        })
    }
}

pub fn validate_country_code(value: &str) -> Result<String, ValidationError> {
    let normalized = value.trim().to_ascii_uppercase();
    if normalized.len() == 2 && normalized.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Ok(normalized);
    }
    Err(ValidationError::InvalidCountry {
        value: value.to_owned(),
    })
}

pub fn validate_currency_code(value: &str) -> Result<String, ValidationError> {
    if value.len() == 3 && value.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Ok(value.to_owned());
    }
    Err(ValidationError::InvalidCurrency {
        value: value.to_owned(),
    })
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address::new("Ada Lovelace", "Main St 1", "1011AB", "Amsterdam", "nl")
            .expect("valid address")
    }

    #[test]
    fn address_normalizes_country() {
        assert_eq!(address().country, "NL");
    }

    #[test]
    fn address_rejects_blank_city() {
        let err = Address::new("Ada", "Main St 1", "1011AB", " ", "NL").expect_err("must fail");
        assert_eq!(err, ValidationError::EmptyField { field: "city" });
    }

    #[test]
    fn parcel_rejects_zero_weight() {
        let err = Parcel::new("order-1", address(), 0).expect_err("must fail");
        assert_eq!(err, ValidationError::ZeroWeight);
    }

    #[test]
    fn parcel_rejects_zero_dimension_after_deserialize() {
        let parcel = Parcel::new("order-1", address(), 500)
            .expect("valid parcel")
            .with_dimensions(Dimensions {
                length_mm: 100,
                width_mm: 0,
                height_mm: 10,
            });
        assert_eq!(
            parcel.validate(),
            Err(ValidationError::ZeroDimension { field: "width_mm" })
        );
    }

    #[test]
    fn tracking_status_follows_latest_event() {
        let events = vec![
            TrackingEvent {
                occurred_at: UtcDateTime::parse("2024-03-02T10:00:00Z").expect("ts"),
                status: String::from("delivered"),
                description: None,
                location: None,
            },
            TrackingEvent {
                occurred_at: UtcDateTime::parse("2024-03-01T08:00:00Z").expect("ts"),
                status: String::from("in_transit"),
                description: None,
                location: Some(String::from("Utrecht")),
            },
        ];
        let result = TrackingResult::new("3SABC", events, serde_json::Value::Null);

        assert_eq!(result.status, "delivered");
        assert_eq!(result.events[0].status, "in_transit");
    }

    #[test]
    fn label_format_parses_case_insensitively() {
        assert_eq!("ZPL".parse::<LabelFormat>(), Ok(LabelFormat::Zpl));
        assert!("gif".parse::<LabelFormat>().is_err());
    }
}
