//! External geocoding / distance-matrix provider port.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hyper::{client::HttpConnector, Client};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use thiserror::Error;

use crate::geo::GeoPoint;

pub mod google;

/// A `hyper` client shared between provider calls, so we get keep-alive.
pub type SharedHttpClient = Arc<Client<HttpsConnector<HttpConnector>>>;

pub fn shared_http_client() -> SharedHttpClient {
    Arc::new(
        Client::builder().build(
            HttpsConnectorBuilder::new()
                .with_native_roots()
                .https_only()
                .enable_http2()
                .build(),
        ),
    )
}

/// Process-wide provider kill switch. Set once when the provider denies a
/// request (bad key, quota revoked); every later call in this process skips
/// the provider tier entirely.
static PROVIDER_DISABLED: AtomicBool = AtomicBool::new(false);

pub fn provider_disabled() -> bool {
    PROVIDER_DISABLED.load(Ordering::SeqCst)
}

pub fn disable_provider() {
    PROVIDER_DISABLED.store(true, Ordering::SeqCst);
}

/// Provider failure classes. Only `RequestDenied` is terminal for the
/// process; everything else falls through to the next resolution tier.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider rate limit exceeded")]
    RateLimited,
    #[error("provider denied the request")]
    RequestDenied,
    #[error("invalid provider request: {0}")]
    InvalidRequest(String),
    #[error("transient provider failure: {0}")]
    Transient(String),
}

impl ProviderError {
    /// Should this error permanently disable the provider for the process?
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderError::RequestDenied)
    }
}

/// A successful forward geocode.
#[derive(Clone, Debug)]
pub struct ProviderGeocode {
    pub point: GeoPoint,
    pub formatted_address: String,
    /// Provider-specific accuracy tag, e.g. `ROOFTOP` or `RANGE_INTERPOLATED`.
    pub accuracy_tag: String,
}

/// One origin/destination pair of a distance matrix. `None` when the
/// provider could not route the pair.
#[derive(Clone, Copy, Debug)]
pub struct MatrixElement {
    pub km: f64,
    pub seconds: f64,
    pub seconds_in_traffic: Option<f64>,
}

/// A full `origins x destinations` result grid.
#[derive(Clone, Debug)]
pub struct DistanceMatrix {
    /// `elements[origin][destination]`.
    pub elements: Vec<Vec<Option<MatrixElement>>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TravelMode {
    Driving,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
        }
    }
}

/// Traffic model hint forwarded to the provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrafficModel {
    BestGuess,
    Pessimistic,
}

impl TrafficModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficModel::BestGuess => "best_guess",
            TrafficModel::Pessimistic => "pessimistic",
        }
    }
}

/// Abstract geocoding + routing provider.
#[async_trait]
pub trait GeoProvider: Send + Sync + 'static {
    /// A short name for this provider, used in logs and metrics labels.
    fn tag(&self) -> &str;

    /// Forward-geocode a single free-form address.
    async fn geocode(
        &self,
        address: &str,
        region_hint: &str,
        language_hint: &str,
    ) -> Result<ProviderGeocode, ProviderError>;

    /// Compute driving distance/duration for every origin/destination pair.
    ///
    /// Implementations must keep `origins.len() * destinations.len()` within
    /// the upstream per-request element limit and pause between batches.
    async fn distance_matrix(
        &self,
        origins: &[GeoPoint],
        destinations: &[GeoPoint],
        mode: TravelMode,
        traffic: TrafficModel,
    ) -> Result<DistanceMatrix, ProviderError>;
}
