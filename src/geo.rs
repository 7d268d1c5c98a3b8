//! Coordinates and great-circle math.

use serde::{Deserialize, Serialize};

/// The driver's home base: Hannover.
pub const HOME_BASE: GeoPoint = GeoPoint {
    lat: 52.3759,
    lng: 9.7320,
};

/// Geographic center of Germany, used as the last-resort geocoding result.
pub const GERMANY_CENTROID: GeoPoint = GeoPoint {
    lat: 51.1657,
    lng: 10.4515,
};

/// Bounding box we accept provider results from. Anything outside is treated
/// as a bad geocode and the next resolution tier is tried.
const GERMANY_LAT: (f64, f64) = (47.2, 55.1);
const GERMANY_LNG: (f64, f64) = (5.8, 15.1);

/// Mean earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    /// Is this point inside the German bounding box?
    pub fn in_germany(&self) -> bool {
        self.lat >= GERMANY_LAT.0
            && self.lat <= GERMANY_LAT.1
            && self.lng >= GERMANY_LNG.0
            && self.lng <= GERMANY_LNG.1
    }

    /// Great-circle distance to `other` in kilometers.
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// Full-precision cache key fragment. Must be byte-stable for a given
    /// point because persistent cache rows are keyed by it.
    pub fn cache_key_fragment(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }

    /// Is `other` within `tolerance_deg` of this point on both axes?
    pub fn within_degrees(&self, other: &GeoPoint, tolerance_deg: f64) -> bool {
        (self.lat - other.lat).abs() <= tolerance_deg
            && (self.lng - other.lng).abs() <= tolerance_deg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_hannover_munich() {
        let munich = GeoPoint::new(48.1351, 11.5820);
        let km = HOME_BASE.haversine_km(&munich);
        // Straight-line Hannover-Munich is roughly 488 km.
        assert!((480.0..500.0).contains(&km), "got {} km", km);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert_eq!(HOME_BASE.haversine_km(&HOME_BASE), 0.0);
    }

    #[test]
    fn bounding_box() {
        assert!(HOME_BASE.in_germany());
        assert!(GERMANY_CENTROID.in_germany());
        // Vienna.
        assert!(!GeoPoint::new(48.2082, 16.3738).in_germany());
        // Paris.
        assert!(!GeoPoint::new(48.8566, 2.3522).in_germany());
    }

    #[test]
    fn within_degrees_tolerance() {
        let a = GeoPoint::new(52.0, 9.0);
        let b = GeoPoint::new(52.015, 9.019);
        assert!(a.within_degrees(&b, 0.02));
        assert!(!a.within_degrees(&b, 0.01));
    }
}
