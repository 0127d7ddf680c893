//! # Canonical Model
//!
//! Carrier-agnostic shapes every adapter maps to and from.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Address`] | Postal address with ISO country code |
//! | [`Parcel`] | One package for one recipient |
//! | [`Dimensions`] | Outer size in millimetres |
//! | [`LabelFormat`] | Label document format (pdf, zpl, png) |
//! | [`TrackingEvent`] / [`TrackingResult`] | Normalized tracking history |
//! | [`PickupPoint`] | Parcel shop or locker |
//! | [`Rate`] | Price for one carrier service |
//! | [`UtcDateTime`] | RFC3339 timestamp normalized to UTC |
//!
//! Constructors validate their invariants; values deserialized from caller
//! input are re-checked with `validate()` before they reach a carrier.

mod models;
mod timestamp;

pub use models::{
    validate_country_code, validate_currency_code, Address, Dimensions, LabelFormat, Parcel,
    PickupPoint, Rate, TrackingEvent, TrackingResult,
};
pub use timestamp::UtcDateTime;
