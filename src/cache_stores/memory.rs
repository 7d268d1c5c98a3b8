//! In-process cache store backend.
//!
//! Good enough for a single service instance and for tests. Last write wins;
//! the similar-route lookup is a linear scan, which is fine at the row counts
//! one field worker produces.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::geo::GeoPoint;
use crate::Result;

use super::{distance_key, CacheStore, DistanceRow, GeocodeRow};

#[derive(Default)]
pub struct MemoryCacheStore {
    geocodes: RwLock<HashMap<String, GeocodeRow>>,
    distances: RwLock<HashMap<String, DistanceRow>>,
}

impl MemoryCacheStore {
    pub fn new() -> MemoryCacheStore {
        MemoryCacheStore::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_geocode(&self, address_lower: &str) -> Result<Option<GeocodeRow>> {
        Ok(self.geocodes.read().await.get(address_lower).cloned())
    }

    async fn put_geocode(&self, mut row: GeocodeRow) -> Result<()> {
        row.cached_at = Utc::now();
        self.geocodes
            .write()
            .await
            .insert(row.address.clone(), row);
        Ok(())
    }

    async fn get_distance(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> Result<Option<DistanceRow>> {
        let key = distance_key(&from, &to);
        Ok(self.distances.read().await.get(&key).cloned())
    }

    async fn get_distance_similar(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        tolerance_deg: f64,
    ) -> Result<Option<DistanceRow>> {
        let distances = self.distances.read().await;
        Ok(distances
            .values()
            .find(|row| {
                row.from.within_degrees(&from, tolerance_deg)
                    && row.to.within_degrees(&to, tolerance_deg)
            })
            .cloned())
    }

    async fn put_distance(&self, mut row: DistanceRow) -> Result<()> {
        row.cached_at = Utc::now();
        let key = distance_key(&row.from, &row.to);
        self.distances.write().await.insert(key, row);
        Ok(())
    }
}
