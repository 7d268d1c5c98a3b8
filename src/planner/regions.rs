//! Regional clustering of flexible appointments.
//!
//! Five fixed regions bias the week toward geographic locality: each day
//! works one region's appointments before the queue moves on. Fixed
//! appointments never enter the clustering, their day is already decided.

use crate::appointments::ResolvedAppointment;
use crate::geo::GeoPoint;

/// The five planning regions, in declaration order (used as tie-break).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Region {
    Nord,
    Ost,
    West,
    Sued,
    Mitte,
}

pub const ALL_REGIONS: [Region; 5] = [
    Region::Nord,
    Region::Ost,
    Region::West,
    Region::Sued,
    Region::Mitte,
];

impl Region {
    pub fn centroid(self) -> GeoPoint {
        match self {
            // Hamburg.
            Region::Nord => GeoPoint::new(53.5511, 9.9937),
            // Berlin.
            Region::Ost => GeoPoint::new(52.5200, 13.4050),
            // Düsseldorf.
            Region::West => GeoPoint::new(51.2277, 6.7735),
            // München.
            Region::Sued => GeoPoint::new(48.1351, 11.5820),
            // Frankfurt am Main.
            Region::Mitte => GeoPoint::new(50.1109, 8.6821),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Region::Nord => "Nord",
            Region::Ost => "Ost",
            Region::West => "West",
            Region::Sued => "Süd",
            Region::Mitte => "Mitte",
        }
    }

    fn index(self) -> usize {
        ALL_REGIONS
            .iter()
            .position(|r| *r == self)
            .expect("region is in ALL_REGIONS")
    }
}

/// The region whose centroid is closest to `point`. Ties go to the earlier
/// declaration.
pub fn nearest_region(point: &GeoPoint) -> Region {
    let mut best = ALL_REGIONS[0];
    let mut best_km = point.haversine_km(&best.centroid());
    for region in &ALL_REGIONS[1..] {
        let km = point.haversine_km(&region.centroid());
        if km < best_km {
            best = *region;
            best_km = km;
        }
    }
    best
}

/// Partition flexible appointments into per-region buckets, indexed like
/// `ALL_REGIONS`.
pub fn cluster(appointments: Vec<ResolvedAppointment>) -> [Vec<ResolvedAppointment>; 5] {
    let mut buckets: [Vec<ResolvedAppointment>; 5] = Default::default();
    for appointment in appointments {
        let region = nearest_region(&appointment.point);
        buckets[region.index()].push(appointment);
    }
    buckets
}

/// Region traversal order for the week: ascending centroid distance from
/// `home`, declaration order on exact ties.
pub fn region_order(home: &GeoPoint) -> [Region; 5] {
    let mut order = ALL_REGIONS;
    // Stable sort keeps declaration order for equal distances.
    order.sort_by(|a, b| {
        let da = home.haversine_km(&a.centroid());
        let db = home.haversine_km(&b.centroid());
        da.partial_cmp(&db).expect("distances are finite")
    });
    order
}
