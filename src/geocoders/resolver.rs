//! Tiered address resolution.
//!
//! `Geocoder::resolve` is a total function: it tries increasingly coarse
//! tiers until one produces a point, ending at the country centroid. Tier
//! errors are logged and drive fallthrough; nothing surfaces to the caller.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::addresses::ParsedAddress;
use crate::cache_stores::{CacheStore, GeocodeRow};
use crate::geo::{GeoPoint, GERMANY_CENTROID};
use crate::provider::{disable_provider, provider_disabled, GeoProvider, ProviderError};
use crate::static_tables;

use super::{
    accuracy_from_provider_tag, confidence_for, Accuracy, Confidence, GeocodeResult,
    Method,
};

/// Jitter applied around a city centroid so two addresses in the same city
/// do not collapse onto the exact same point. Derived from the address hash,
/// never random.
const CITY_JITTER_DEG: f64 = 0.01;

/// Minimum Levenshtein similarity for the fuzzy city tier.
const SIMILARITY_THRESHOLD: f64 = 0.6;

pub struct Geocoder {
    memory: RwLock<HashMap<String, GeocodeResult>>,
    store: Arc<dyn CacheStore>,
    provider: Option<Arc<dyn GeoProvider>>,
    /// Set when the provider rate-limited us during this geocoder's
    /// lifetime. The caller surfaces it as a degraded-plan note.
    degraded: AtomicBool,
}

impl Geocoder {
    pub fn new(
        store: Arc<dyn CacheStore>,
        provider: Option<Arc<dyn GeoProvider>>,
    ) -> Geocoder {
        describe_counter!(
            "tourenplan.geocode.resolved.total",
            "Addresses resolved, labeled by producing tier"
        );
        describe_counter!(
            "tourenplan.geocode.cache_hits.total",
            "Geocode lookups served from a cache"
        );

        Geocoder {
            memory: RwLock::new(HashMap::new()),
            store,
            provider,
            degraded: AtomicBool::new(false),
        }
    }

    /// Did any resolution in this geocoder's lifetime run into provider
    /// rate limiting?
    pub fn was_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Resolve a free-form address to a point. Never fails.
    pub async fn resolve(&self, address: &str) -> GeocodeResult {
        let key = address.trim().to_lowercase();
        if key.is_empty() {
            warn!("empty address, falling back to country centroid");
            return country_fallback();
        }

        // Tier 1: process-local memory cache. Returns the memoized result
        // verbatim so repeated calls are byte-identical.
        if let Some(hit) = self.memory.read().await.get(&key) {
            counter!("tourenplan.geocode.cache_hits.total", 1, "cache" => "memory");
            return hit.clone();
        }

        // Tier 2: persistent cache, 90-day window.
        match self.store.get_geocode(&key).await {
            Ok(Some(row)) if row.is_fresh(Utc::now()) => {
                counter!("tourenplan.geocode.cache_hits.total", 1, "cache" => "db");
                let result = GeocodeResult {
                    point: row.point,
                    formatted_address: row.formatted_address,
                    accuracy: row.accuracy,
                    method: Method::DbCache,
                    confidence: confidence_for(row.accuracy),
                };
                self.memory.write().await.insert(key, result.clone());
                return result;
            }
            Ok(Some(_)) => debug!(address = %key, "cache row expired"),
            Ok(None) => {}
            Err(err) => warn!(%err, "geocode cache read failed"),
        }

        let result = self.resolve_uncached(&key).await;
        counter!(
            "tourenplan.geocode.resolved.total",
            1,
            "method" => result.method.to_string()
        );
        self.remember(&key, &result).await;
        result
    }

    /// Tiers 3-7, in order. Always produces a result.
    async fn resolve_uncached(&self, key: &str) -> GeocodeResult {
        // Tier 3: external provider, unless it has been disabled for the
        // process.
        if let Some(provider) = &self.provider {
            if provider_disabled() {
                debug!("provider disabled, skipping tier");
            } else {
                match provider.geocode(key, "de", "de").await {
                    Ok(geocoded) if geocoded.point.in_germany() => {
                        return GeocodeResult {
                            point: geocoded.point,
                            formatted_address: geocoded.formatted_address,
                            accuracy: accuracy_from_provider_tag(
                                &geocoded.accuracy_tag,
                            ),
                            method: Method::Provider,
                            confidence: Confidence::High,
                        };
                    }
                    Ok(geocoded) => {
                        warn!(
                            lat = geocoded.point.lat,
                            lng = geocoded.point.lng,
                            "provider result outside Germany, rejecting tier"
                        );
                    }
                    Err(err) => self.note_provider_error(&err),
                }
            }
        }

        let parsed = ParsedAddress::parse(key);

        // Tier 4: exact city-table hit with a deterministic jitter.
        if let Some(city) = &parsed.city {
            let city_key = static_tables::normalize_city_key(city);
            if let Some(entry) = static_tables::city_entry(&city_key) {
                debug!(city = entry.name, "resolved via city table");
                return GeocodeResult {
                    point: jittered(entry.point, key),
                    formatted_address: format!("{}, Deutschland", entry.name),
                    accuracy: Accuracy::City,
                    method: Method::Intelligent,
                    confidence: Confidence::High,
                };
            }

            // Tier 5: fuzzy city match.
            if let Some((entry, score)) = static_tables::best_city_match(&city_key) {
                if score >= SIMILARITY_THRESHOLD {
                    debug!(
                        city = entry.name,
                        score, "resolved via fuzzy city match"
                    );
                    return GeocodeResult {
                        point: jittered(entry.point, key),
                        formatted_address: format!("{}, Deutschland", entry.name),
                        accuracy: Accuracy::Approximate,
                        method: Method::Intelligent,
                        confidence: Confidence::Medium,
                    };
                }
            }
        }

        // Tier 6: postal-code anchor with the digit-pair offset.
        if let Some(postal) = &parsed.postal_code {
            if let Some(result) = resolve_postal(postal) {
                debug!(postal = %postal, "resolved via postal anchor");
                return result;
            }
        }

        // Tier 7: country centroid. Always succeeds.
        debug!(address = %key, "all tiers missed, using country centroid");
        country_fallback()
    }

    fn note_provider_error(&self, err: &ProviderError) {
        match err {
            ProviderError::RequestDenied => {
                warn!("provider denied request, disabling for this process");
                disable_provider();
            }
            ProviderError::RateLimited => {
                warn!("provider rate-limited, marking plan degraded");
                self.degraded.store(true, Ordering::SeqCst);
            }
            other => debug!(%other, "provider tier failed, falling through"),
        }
    }

    /// Write a fresh result into both caches. Cache failures are logged,
    /// never propagated.
    async fn remember(&self, key: &str, result: &GeocodeResult) {
        self.memory
            .write()
            .await
            .insert(key.to_owned(), result.clone());

        let row = GeocodeRow {
            address: key.to_owned(),
            point: result.point,
            formatted_address: result.formatted_address.clone(),
            accuracy: result.accuracy,
            method: result.method,
            cached_at: Utc::now(),
        };
        if let Err(err) = self.store.put_geocode(row).await {
            warn!(%err, "geocode cache write failed");
        }
    }
}

/// Postal tier: anchor for the first digit, shifted by the remaining digit
/// pairs so distinct codes in one zone spread out deterministically.
fn resolve_postal(postal: &str) -> Option<GeocodeResult> {
    let digits: Vec<u8> = postal
        .bytes()
        .filter(|b| b.is_ascii_digit())
        .map(|b| b - b'0')
        .collect();
    if digits.len() != 5 {
        return None;
    }
    let anchor = static_tables::postal_anchor(digits[0])?;

    let d2d3 = (digits[1] * 10 + digits[2]) as f64;
    let d4d5 = (digits[3] * 10 + digits[4]) as f64;
    let point = GeoPoint::new(
        anchor.point.lat + (d2d3 - 50.0) * 0.01,
        anchor.point.lng + (d4d5 - 50.0) * 0.01,
    );

    Some(GeocodeResult {
        point,
        formatted_address: format!("PLZ {} ({})", postal, anchor.region),
        accuracy: Accuracy::PostalCode,
        method: Method::Postal,
        confidence: Confidence::Medium,
    })
}

fn country_fallback() -> GeocodeResult {
    GeocodeResult {
        point: GERMANY_CENTROID,
        formatted_address: "Deutschland".to_owned(),
        accuracy: Accuracy::Country,
        method: Method::Fallback,
        confidence: Confidence::Low,
    }
}

/// Deterministic per-address offset of at most `CITY_JITTER_DEG` on each
/// axis, derived from the normalized address.
fn jittered(base: GeoPoint, key: &str) -> GeoPoint {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();

    let lat_unit = ((hash >> 32) & 0xFFFF) as f64 / f64::from(u16::MAX);
    let lng_unit = (hash & 0xFFFF) as f64 / f64::from(u16::MAX);
    GeoPoint::new(
        base.lat + (lat_unit * 2.0 - 1.0) * CITY_JITTER_DEG,
        base.lng + (lng_unit * 2.0 - 1.0) * CITY_JITTER_DEG,
    )
}
