//! Pairwise travel measurement with layered caching.
//!
//! Resolution order: memory cache, persistent cache (exact, then a ±0.02°
//! "similar route" reuse), closed-form estimates for short hops, the
//! provider's distance matrix, and finally a haversine approximation. Every
//! produced leg is written back through both caches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter};
use serde::Serialize;
use strum_macros::{Display, EnumString};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache_stores::{CacheStore, DistanceRow, SIMILAR_ROUTE_TOLERANCE_DEG};
use crate::geo::GeoPoint;
use crate::provider::{
    disable_provider, provider_disabled, GeoProvider, ProviderError, TrafficModel,
    TravelMode,
};

/// Fixed padding on every leg, for parking and setup.
pub const TRAVEL_PAD_HOURS: f64 = 0.25;

/// Padding used by the haversine path after a live provider call failed.
const DEGRADED_PAD_HOURS: f64 = 0.3;

const TINY_HOP_KM: f64 = 5.0;
const SHORT_HOP_KM: f64 = 50.0;

/// Where a leg's numbers came from.
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LegOrigin {
    Provider,
    DbCache,
    MemoryCache,
    SimilarRoute,
    HaversineFallback,
}

/// A single travel measurement between two points.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Leg {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub distance_km: f64,
    pub duration_hours: f64,
    pub origin: LegOrigin,
}

pub struct DistanceOracle {
    memory: RwLock<HashMap<String, Leg>>,
    store: Arc<dyn CacheStore>,
    provider: Option<Arc<dyn GeoProvider>>,
}

impl DistanceOracle {
    pub fn new(
        store: Arc<dyn CacheStore>,
        provider: Option<Arc<dyn GeoProvider>>,
    ) -> DistanceOracle {
        describe_counter!(
            "tourenplan.distance.legs.total",
            "Legs produced, labeled by origin"
        );

        DistanceOracle {
            memory: RwLock::new(HashMap::new()),
            store,
            provider,
        }
    }

    /// Measure the leg between two points. Never fails; the weakest outcome
    /// is a padded haversine estimate.
    pub async fn leg(&self, from: GeoPoint, to: GeoPoint) -> Leg {
        if from == to {
            return Leg {
                from,
                to,
                distance_km: 0.0,
                duration_hours: 0.0,
                origin: LegOrigin::HaversineFallback,
            };
        }

        let key = crate::cache_stores::distance_key(&from, &to);
        if let Some(hit) = self.memory.read().await.get(&key) {
            let mut leg = *hit;
            leg.origin = LegOrigin::MemoryCache;
            counter!("tourenplan.distance.legs.total", 1, "origin" => "memory_cache");
            return leg;
        }

        let leg = self.resolve_uncached(from, to).await;
        counter!(
            "tourenplan.distance.legs.total",
            1,
            "origin" => leg.origin.to_string()
        );
        self.remember(&key, leg).await;
        leg
    }

    async fn resolve_uncached(&self, from: GeoPoint, to: GeoPoint) -> Leg {
        let now = Utc::now();

        // Persistent cache, exact endpoints, 30-day window.
        match self.store.get_distance(from, to).await {
            Ok(Some(row)) if row.is_fresh(now) => {
                return Leg {
                    from,
                    to,
                    distance_km: row.distance_km,
                    duration_hours: row.duration_hours,
                    origin: LegOrigin::DbCache,
                };
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "distance cache read failed"),
        }

        // Persistent cache, nearby endpoints.
        match self
            .store
            .get_distance_similar(from, to, SIMILAR_ROUTE_TOLERANCE_DEG)
            .await
        {
            Ok(Some(row)) if row.is_fresh(now) => {
                debug!("reusing similar cached route");
                return Leg {
                    from,
                    to,
                    distance_km: row.distance_km,
                    duration_hours: row.duration_hours,
                    origin: LegOrigin::SimilarRoute,
                };
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "distance cache similarity read failed"),
        }

        // Short hops are not worth a provider round trip; the closed-form
        // estimates are good enough inside a city or a region.
        let great_circle = from.haversine_km(&to);
        if great_circle < TINY_HOP_KM {
            let distance_km = great_circle * 1.4;
            return Leg {
                from,
                to,
                distance_km,
                duration_hours: distance_km / 30.0 + TRAVEL_PAD_HOURS,
                origin: LegOrigin::HaversineFallback,
            };
        }
        if great_circle < SHORT_HOP_KM {
            let distance_km = great_circle * 1.25;
            return Leg {
                from,
                to,
                distance_km,
                duration_hours: distance_km / 60.0 + TRAVEL_PAD_HOURS,
                origin: LegOrigin::HaversineFallback,
            };
        }

        // Live provider.
        let mut provider_failed = false;
        if let Some(provider) = &self.provider {
            if provider_disabled() {
                debug!("provider disabled, skipping matrix call");
            } else {
                match provider
                    .distance_matrix(
                        &[from],
                        &[to],
                        TravelMode::Driving,
                        TrafficModel::BestGuess,
                    )
                    .await
                {
                    Ok(matrix) => {
                        if let Some(element) =
                            matrix.elements.first().and_then(|row| row.first()).copied().flatten()
                        {
                            let seconds =
                                element.seconds_in_traffic.unwrap_or(element.seconds);
                            return Leg {
                                from,
                                to,
                                distance_km: element.km,
                                duration_hours: seconds / 3600.0 + TRAVEL_PAD_HOURS,
                                origin: LegOrigin::Provider,
                            };
                        }
                        warn!("provider returned no routable element");
                        provider_failed = true;
                    }
                    Err(err) => {
                        if matches!(err, ProviderError::RequestDenied) {
                            warn!("provider denied request, disabling for this process");
                            disable_provider();
                        } else {
                            debug!(%err, "provider matrix failed, falling back");
                        }
                        provider_failed = true;
                    }
                }
            }
        }

        // Haversine fallback. A failed live call gets the slightly larger
        // pad; the provider-less path keeps the standard one.
        let pad = if provider_failed {
            DEGRADED_PAD_HOURS
        } else {
            TRAVEL_PAD_HOURS
        };
        Leg {
            from,
            to,
            distance_km: great_circle * 1.3,
            duration_hours: great_circle / 80.0 + pad,
            origin: LegOrigin::HaversineFallback,
        }
    }

    /// Write a fresh leg into both caches. Cache failures are logged, never
    /// propagated.
    async fn remember(&self, key: &str, leg: Leg) {
        self.memory.write().await.insert(key.to_owned(), leg);

        let row = DistanceRow {
            from: leg.from,
            to: leg.to,
            distance_km: leg.distance_km,
            duration_hours: leg.duration_hours,
            cached_at: Utc::now(),
        };
        if let Err(err) = self.store.put_distance(row).await {
            warn!(%err, "distance cache write failed");
        }
    }
}
