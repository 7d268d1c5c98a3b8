//! Provider-tier behavior of the geocoder and distance oracle: bounding-box
//! rejection, transient fallthrough, cache write-through, rate-limit
//! degradation. The terminal `RequestDenied` path lives in its own test
//! binary because the kill switch is process-wide.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use tourenplan::cache_stores::memory::MemoryCacheStore;
use tourenplan::distance::{DistanceOracle, LegOrigin};
use tourenplan::geo::GeoPoint;
use tourenplan::geocoders::{Accuracy, Geocoder, Method};
use tourenplan::provider::{
    provider_disabled, DistanceMatrix, GeoProvider, ProviderError, ProviderGeocode,
    TrafficModel, TravelMode,
};

/// One scripted response for every call, plus a call counter.
struct ScriptedProvider {
    geocode_response: Box<dyn Fn() -> Result<ProviderGeocode, ProviderError> + Send + Sync>,
    matrix_response: Box<dyn Fn() -> Result<DistanceMatrix, ProviderError> + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn geocoding(
        response: impl Fn() -> Result<ProviderGeocode, ProviderError> + Send + Sync + 'static,
    ) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider {
            geocode_response: Box::new(response),
            matrix_response: Box::new(|| {
                Err(ProviderError::InvalidRequest("not scripted".into()))
            }),
            calls: AtomicUsize::new(0),
        })
    }

    fn matrix(
        response: impl Fn() -> Result<DistanceMatrix, ProviderError> + Send + Sync + 'static,
    ) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider {
            geocode_response: Box::new(|| {
                Err(ProviderError::InvalidRequest("not scripted".into()))
            }),
            matrix_response: Box::new(response),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoProvider for ScriptedProvider {
    fn tag(&self) -> &str {
        "scripted"
    }

    async fn geocode(
        &self,
        _address: &str,
        _region_hint: &str,
        _language_hint: &str,
    ) -> Result<ProviderGeocode, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.geocode_response)()
    }

    async fn distance_matrix(
        &self,
        _origins: &[GeoPoint],
        _destinations: &[GeoPoint],
        _mode: TravelMode,
        _traffic: TrafficModel,
    ) -> Result<DistanceMatrix, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.matrix_response)()
    }
}

fn geocoder_with(provider: Arc<ScriptedProvider>) -> Geocoder {
    Geocoder::new(Arc::new(MemoryCacheStore::new()), Some(provider))
}

#[tokio::test]
async fn out_of_germany_result_is_rejected() {
    // Paris: plausible response, wrong country.
    let provider = ScriptedProvider::geocoding(|| {
        Ok(ProviderGeocode {
            point: GeoPoint::new(48.8566, 2.3522),
            formatted_address: "Paris, France".into(),
            accuracy_tag: "ROOFTOP".into(),
        })
    });
    let geocoder = geocoder_with(provider.clone());

    let result = geocoder.resolve("Salzufer 1, 10587 Berlin").await;
    assert_eq!(provider.call_count(), 1);
    // The Berlin table entry wins instead.
    assert_eq!(result.method, Method::Intelligent);
    assert!((result.point.lat - 52.52).abs() < 0.05);
    assert!(!provider_disabled());
}

#[tokio::test]
async fn transient_error_falls_through_without_disabling() {
    let provider =
        ScriptedProvider::geocoding(|| Err(ProviderError::Transient("503".into())));
    let geocoder = geocoder_with(provider.clone());

    let result = geocoder.resolve("Domkloster 4, 50667 Köln").await;
    assert_eq!(result.method, Method::Intelligent);
    assert!(!provider_disabled());
    assert!(!geocoder.was_degraded());
}

#[tokio::test]
async fn provider_hit_is_cached_for_the_next_process() {
    let provider = ScriptedProvider::geocoding(|| {
        Ok(ProviderGeocode {
            point: GeoPoint::new(52.5145, 13.3222),
            formatted_address: "Salzufer 1, 10587 Berlin, Deutschland".into(),
            accuracy_tag: "ROOFTOP".into(),
        })
    });
    let store = Arc::new(MemoryCacheStore::new());
    let geocoder = Geocoder::new(store.clone(), Some(provider.clone()));

    let first = geocoder.resolve("Salzufer 1, 10587 Berlin").await;
    assert_eq!(first.method, Method::Provider);
    assert_eq!(first.accuracy, Accuracy::Rooftop);
    assert_eq!(provider.call_count(), 1);

    // Same process: memoized, byte-identical, no second provider call.
    let again = geocoder.resolve("Salzufer 1, 10587 Berlin").await;
    assert_eq!(again, first);
    assert_eq!(provider.call_count(), 1);

    // Fresh geocoder over the same store: served from the persistent row.
    let rehydrated = Geocoder::new(store, Some(provider.clone()))
        .resolve("Salzufer 1, 10587 Berlin")
        .await;
    assert_eq!(rehydrated.method, Method::DbCache);
    assert_eq!(rehydrated.point, first.point);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn rate_limit_marks_the_geocoder_degraded() {
    let provider = ScriptedProvider::geocoding(|| Err(ProviderError::RateLimited));
    let geocoder = geocoder_with(provider);

    let result = geocoder.resolve("Augustusplatz 9, 04109 Leipzig").await;
    // Still resolved offline, but the degradation is observable.
    assert_eq!(result.method, Method::Intelligent);
    assert!(geocoder.was_degraded());
    assert!(!provider_disabled());
}

#[tokio::test]
async fn failed_matrix_call_uses_the_larger_fallback_pad() {
    let provider =
        ScriptedProvider::matrix(|| Err(ProviderError::Transient("timeout".into())));
    let oracle = DistanceOracle::new(Arc::new(MemoryCacheStore::new()), Some(provider));

    let hannover = GeoPoint::new(52.3759, 9.732);
    let munich = GeoPoint::new(48.1351, 11.582);
    let gc = hannover.haversine_km(&munich);

    let leg = oracle.leg(hannover, munich).await;
    assert_eq!(leg.origin, LegOrigin::HaversineFallback);
    assert!((leg.distance_km - gc * 1.3).abs() < 1e-9);
    // 0.3 h pad on the degraded path, vs 0.25 h offline.
    assert!((leg.duration_hours - (gc / 80.0 + 0.3)).abs() < 1e-9);
}
