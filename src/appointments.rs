//! Appointment records as the host hands them to the planner.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::addresses::ParsedAddress;
use crate::geo::GeoPoint;
use crate::geocoders::GeocodeResult;

/// One customer appointment from the pool. Externally owned; the planner
/// never mutates these.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub customer: String,
    /// Free-form German address.
    pub address: String,
    /// Precomputed coordinates, when the host already knows them.
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub priority: Priority,
    /// Age of the lead in days; older leads are scheduled first.
    #[serde(default)]
    pub pipeline_days: i64,
    #[serde(default)]
    pub is_fixed: bool,
    /// Required iff `is_fixed`.
    #[serde(default)]
    pub fixed_date: Option<NaiveDate>,
    /// Half-hour time of day; defaults to 08:30 for fixed appointments.
    #[serde(default, with = "hhmm_opt")]
    pub fixed_time: Option<NaiveTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Appointment {
    pub fn precomputed_point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }
}

/// Pipeline status, with the localized tokens the host uses verbatim.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum AppointmentStatus {
    #[serde(rename = "bestätigt", alias = "confirmed")]
    Confirmed,
    #[serde(rename = "vorschlag", alias = "proposed")]
    Proposed,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// An appointment with its location resolved, ready for placement.
#[derive(Clone, Debug)]
pub struct ResolvedAppointment {
    pub appointment: Appointment,
    pub point: GeoPoint,
    /// City label for travel segments and overnight naming.
    pub city: String,
    pub low_confidence: bool,
}

impl ResolvedAppointment {
    pub fn from_geocode(appointment: Appointment, geocode: &GeocodeResult) -> Self {
        let city = city_label(&appointment, Some(geocode));
        ResolvedAppointment {
            point: geocode.point,
            low_confidence: geocode.is_low_confidence(),
            city,
            appointment,
        }
    }

    pub fn from_precomputed(appointment: Appointment, point: GeoPoint) -> Self {
        let city = city_label(&appointment, None);
        ResolvedAppointment {
            point,
            low_confidence: false,
            city,
            appointment,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.appointment.status == AppointmentStatus::Confirmed
    }
}

/// Best available short place name: the parsed city, else the geocoder's
/// formatted address, else the raw address.
fn city_label(appointment: &Appointment, geocode: Option<&GeocodeResult>) -> String {
    if let Some(city) = ParsedAddress::parse(&appointment.address).city {
        return city;
    }
    if let Some(geocode) = geocode {
        return geocode.formatted_address.clone();
    }
    appointment.address.clone()
}

/// Serde adapter for `"HH:MM"` times (seconds tolerated on input).
mod hhmm_opt {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(t) => serializer.serialize_str(&t.format("%H:%M").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => NaiveTime::parse_from_str(&s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
