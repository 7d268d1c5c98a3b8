//! Persistence port for the two cache tables (geocoding, distances).
//!
//! The core only ever reads and writes these two tables; everything else the
//! host persists is out of scope. Rows carry their write timestamp and the
//! consumers apply the expiry window on read, so backends stay dumb.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::geo::GeoPoint;
use crate::geocoders::{Accuracy, Method};
use crate::Result;

pub mod memory;

/// Geocoding rows older than this are ignored on read.
pub const GEOCODE_TTL_DAYS: i64 = 90;

/// Distance rows older than this are ignored on read.
pub const DISTANCE_TTL_DAYS: i64 = 30;

/// Endpoint tolerance for the "similar route" lookup, in degrees.
pub const SIMILAR_ROUTE_TOLERANCE_DEG: f64 = 0.02;

/// A persisted geocoding result, keyed by the lowercased address.
#[derive(Clone, Debug)]
pub struct GeocodeRow {
    pub address: String,
    pub point: GeoPoint,
    pub formatted_address: String,
    pub accuracy: Accuracy,
    pub method: Method,
    pub cached_at: DateTime<Utc>,
}

/// A persisted distance measurement, keyed by the full-precision endpoint
/// coordinates.
#[derive(Clone, Debug)]
pub struct DistanceRow {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub distance_km: f64,
    pub duration_hours: f64,
    pub cached_at: DateTime<Utc>,
}

impl GeocodeRow {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.cached_at > now - Duration::days(GEOCODE_TTL_DAYS)
    }
}

impl DistanceRow {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.cached_at > now - Duration::days(DISTANCE_TTL_DAYS)
    }
}

/// Backend-agnostic access to the two cache tables. Writes are upserts;
/// readers tolerate missing rows.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Look up a geocoding row by lowercased address.
    async fn get_geocode(&self, address_lower: &str) -> Result<Option<GeocodeRow>>;

    /// Upsert a geocoding row. The backend stamps `cached_at` with "now".
    async fn put_geocode(&self, row: GeocodeRow) -> Result<()>;

    /// Exact-endpoint distance lookup.
    async fn get_distance(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> Result<Option<DistanceRow>>;

    /// Find a row whose endpoints are both within `tolerance_deg` of the
    /// query endpoints.
    async fn get_distance_similar(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        tolerance_deg: f64,
    ) -> Result<Option<DistanceRow>>;

    /// Upsert a distance row. The backend stamps `cached_at` with "now".
    async fn put_distance(&self, row: DistanceRow) -> Result<()>;
}

/// Cache key for a distance row: both endpoints at full precision.
pub fn distance_key(from: &GeoPoint, to: &GeoPoint) -> String {
    format!(
        "{}-{}",
        from.cache_key_fragment(),
        to.cache_key_fragment()
    )
}
