//! Geocoding result types and the tiered resolver.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::geo::GeoPoint;

mod resolver;

pub use resolver::Geocoder;

/// How precisely an address was located.
#[derive(
    Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Rooftop,
    Range,
    Geometric,
    Approximate,
    City,
    PostalCode,
    Country,
}

/// Which resolution tier produced a result.
#[derive(
    Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Provider,
    Intelligent,
    Postal,
    Fallback,
    MemoryCache,
    DbCache,
}

#[derive(
    Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A resolved address. `resolve` always produces one of these; the weakest
/// possible outcome is the country centroid.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub point: GeoPoint,
    pub formatted_address: String,
    pub accuracy: Accuracy,
    pub method: Method,
    pub confidence: Confidence,
}

impl GeocodeResult {
    /// Country-level results are usable for planning but flagged so callers
    /// can surface the uncertainty.
    pub fn is_low_confidence(&self) -> bool {
        self.accuracy == Accuracy::Country
    }
}

/// Confidence implied by an accuracy level. Used when a persistent cache row
/// (which stores no confidence) is rehydrated.
pub fn confidence_for(accuracy: Accuracy) -> Confidence {
    match accuracy {
        Accuracy::Rooftop | Accuracy::Range | Accuracy::Geometric | Accuracy::City => {
            Confidence::High
        }
        Accuracy::Approximate | Accuracy::PostalCode => Confidence::Medium,
        Accuracy::Country => Confidence::Low,
    }
}

/// Map a provider accuracy tag onto our accuracy levels.
pub fn accuracy_from_provider_tag(tag: &str) -> Accuracy {
    match tag {
        "ROOFTOP" => Accuracy::Rooftop,
        "RANGE_INTERPOLATED" => Accuracy::Range,
        "GEOMETRIC_CENTER" => Accuracy::Geometric,
        _ => Accuracy::Approximate,
    }
}
