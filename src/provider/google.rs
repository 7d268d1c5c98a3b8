//! Google Maps Platform client (geocoding + distance matrix REST APIs).

use std::env;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::StreamExt;
use hyper::{Body, Request, StatusCode};
use metrics::{describe_histogram, histogram, Unit};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::geo::GeoPoint;

use super::{
    DistanceMatrix, GeoProvider, MatrixElement, ProviderError, ProviderGeocode,
    SharedHttpClient, TrafficModel, TravelMode,
};

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

const GEOCODE_TIMEOUT: Duration = Duration::from_secs(8);
const MATRIX_TIMEOUT: Duration = Duration::from_secs(15);

/// Upstream hard limit on `origins x destinations` per matrix request.
const MAX_MATRIX_ELEMENTS: usize = 625;

/// Pause between matrix batches. An API contract, not a tuning knob.
const BATCH_PAUSE: Duration = Duration::from_millis(250);

/// Credentials for the Google Maps Platform.
#[derive(Clone, Debug)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    fn from_env() -> crate::Result<Credentials> {
        use anyhow::Context;
        let api_key = env::var("GOOGLE_MAPS_API_KEY")
            .context("could not read GOOGLE_MAPS_API_KEY")?;
        Ok(Credentials { api_key })
    }
}

/// The real Google-backed provider.
pub struct GoogleProvider {
    credentials: Credentials,
    client: SharedHttpClient,
}

impl GoogleProvider {
    pub fn new(client: SharedHttpClient) -> crate::Result<GoogleProvider> {
        describe_histogram!(
            "tourenplan.google.geocode_request.duration_seconds",
            Unit::Seconds,
            "Time for one Google geocoding request"
        );
        describe_histogram!(
            "tourenplan.google.matrix_request.duration_seconds",
            Unit::Seconds,
            "Time for one Google distance-matrix batch"
        );

        Ok(GoogleProvider {
            credentials: Credentials::from_env()?,
            client,
        })
    }

    /// Fetch `url` and return the body, mapping HTTP-level failures onto
    /// provider error classes.
    async fn fetch_json(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<Vec<u8>, ProviderError> {
        let req = Request::builder()
            .method("GET")
            .uri(url.as_str())
            .body(Body::empty())
            .map_err(|err| ProviderError::InvalidRequest(err.to_string()))?;

        let res = tokio::time::timeout(timeout, self.client.request(req))
            .await
            .map_err(|_| ProviderError::Timeout)?
            .map_err(|err| ProviderError::Transient(err.to_string()))?;

        let status = res.status();
        let mut body = res.into_body();
        let mut body_data = vec![];
        while let Some(chunk_result) = body.next().await {
            let chunk =
                chunk_result.map_err(|err| ProviderError::Transient(err.to_string()))?;
            body_data.extend(&chunk[..]);
        }

        match status {
            s if s.is_success() => Ok(body_data),
            StatusCode::FORBIDDEN => Err(ProviderError::RequestDenied),
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
            s if s.is_server_error() => {
                Err(ProviderError::Transient(format!("HTTP {}", s)))
            }
            s => Err(ProviderError::InvalidRequest(format!("HTTP {}", s))),
        }
    }
}

/// Map a Google `status` string onto our error classes. `OK` is handled by
/// the callers before this is reached.
fn status_to_error(status: &str) -> ProviderError {
    match status {
        "REQUEST_DENIED" => ProviderError::RequestDenied,
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => ProviderError::RateLimited,
        "INVALID_REQUEST" => ProviderError::InvalidRequest(status.to_owned()),
        "ZERO_RESULTS" | "NOT_FOUND" => {
            ProviderError::InvalidRequest(format!("no result ({})", status))
        }
        other => ProviderError::Transient(other.to_owned()),
    }
}

fn join_points(points: &[GeoPoint]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.lat, p.lng))
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeocodeCandidate {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
    #[serde(default)]
    location_type: String,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    status: String,
    distance: Option<ValueField>,
    duration: Option<ValueField>,
    duration_in_traffic: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: f64,
}

#[async_trait]
impl GeoProvider for GoogleProvider {
    fn tag(&self) -> &str {
        "google"
    }

    #[instrument(name = "GoogleProvider::geocode", level = "debug", skip_all)]
    async fn geocode(
        &self,
        address: &str,
        region_hint: &str,
        language_hint: &str,
    ) -> Result<ProviderGeocode, ProviderError> {
        let start = Instant::now();

        let mut url = Url::parse(GEOCODE_URL)
            .map_err(|err| ProviderError::InvalidRequest(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("address", address)
            .append_pair("region", region_hint)
            .append_pair("language", language_hint)
            .append_pair("key", &self.credentials.api_key)
            .finish();

        let body = self.fetch_json(&url, GEOCODE_TIMEOUT).await?;
        histogram!(
            "tourenplan.google.geocode_request.duration_seconds",
            (Instant::now() - start).as_secs_f64(),
        );

        let response: GeocodeResponse = serde_json::from_slice(&body)
            .map_err(|err| ProviderError::Transient(err.to_string()))?;
        if response.status != "OK" {
            return Err(status_to_error(&response.status));
        }
        let candidate = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidRequest("empty result list".into()))?;

        Ok(ProviderGeocode {
            point: GeoPoint::new(
                candidate.geometry.location.lat,
                candidate.geometry.location.lng,
            ),
            formatted_address: candidate.formatted_address,
            accuracy_tag: candidate.geometry.location_type,
        })
    }

    #[instrument(
        name = "GoogleProvider::distance_matrix",
        level = "debug",
        skip_all,
        fields(origins = origins.len(), destinations = destinations.len())
    )]
    async fn distance_matrix(
        &self,
        origins: &[GeoPoint],
        destinations: &[GeoPoint],
        mode: TravelMode,
        traffic: TrafficModel,
    ) -> Result<DistanceMatrix, ProviderError> {
        if origins.is_empty() || destinations.is_empty() {
            return Ok(DistanceMatrix { elements: vec![] });
        }

        // Chunk destinations so each request stays under the element limit,
        // and pause between batches.
        let per_batch = (MAX_MATRIX_ELEMENTS / origins.len()).max(1);
        let mut elements: Vec<Vec<Option<MatrixElement>>> =
            vec![Vec::with_capacity(destinations.len()); origins.len()];

        for (batch_idx, batch) in destinations.chunks(per_batch).enumerate() {
            if batch_idx > 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            let start = Instant::now();
            let mut url = Url::parse(MATRIX_URL)
                .map_err(|err| ProviderError::InvalidRequest(err.to_string()))?;
            url.query_pairs_mut()
                .append_pair("origins", &join_points(origins))
                .append_pair("destinations", &join_points(batch))
                .append_pair("mode", mode.as_str())
                .append_pair("traffic_model", traffic.as_str())
                .append_pair("departure_time", "now")
                .append_pair("key", &self.credentials.api_key)
                .finish();

            let body = self.fetch_json(&url, MATRIX_TIMEOUT).await?;
            histogram!(
                "tourenplan.google.matrix_request.duration_seconds",
                (Instant::now() - start).as_secs_f64(),
            );

            let response: MatrixResponse = serde_json::from_slice(&body)
                .map_err(|err| ProviderError::Transient(err.to_string()))?;
            if response.status != "OK" {
                return Err(status_to_error(&response.status));
            }
            if response.rows.len() != origins.len() {
                return Err(ProviderError::Transient(format!(
                    "expected {} matrix rows, got {}",
                    origins.len(),
                    response.rows.len()
                )));
            }

            for (origin_idx, row) in response.rows.into_iter().enumerate() {
                for raw in row.elements {
                    elements[origin_idx].push(element_from_raw(raw));
                }
            }
            debug!(batch = batch_idx, size = batch.len(), "matrix batch done");
        }

        Ok(DistanceMatrix { elements })
    }
}

fn element_from_raw(raw: RawElement) -> Option<MatrixElement> {
    if raw.status != "OK" {
        warn!(status = %raw.status, "unroutable matrix element");
        return None;
    }
    let distance = raw.distance?;
    let duration = raw.duration?;
    Some(MatrixElement {
        km: distance.value / 1000.0,
        seconds: duration.value,
        seconds_in_traffic: raw.duration_in_traffic.map(|v| v.value),
    })
}
