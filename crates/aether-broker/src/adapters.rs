//! Backend adapter traits per information category, with in-memory
//! implementations for tests and demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use aether_types::{AetherError, Result};

/// One record returned by a backend, before sanitization. `id` is the
/// backend's stable identifier; `relevance` orders records for context
/// selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub relevance: f32,
    pub body: Value,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            relevance: 0.5,
            body,
        }
    }

    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance = relevance;
        self
    }
}

/// Request to create a spectrum allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub frequency_min_mhz: f64,
    pub frequency_max_mhz: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mission_id: String,
}

#[async_trait]
pub trait ThreatBackend: Send + Sync {
    async fn query(&self, params: &Value) -> Result<Vec<SourceRecord>>;
}

#[async_trait]
pub trait SpectrumBackend: Send + Sync {
    async fn query(&self, params: &Value) -> Result<Vec<SourceRecord>>;

    /// Return allocations overlapping the given range and window.
    async fn check_conflicts(
        &self,
        range_mhz: (f64, f64),
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<SourceRecord>>;

    async fn create_allocation(&self, request: AllocationRequest) -> Result<SourceRecord>;

    /// Find free ranges of at least `bandwidth_mhz` within `range_mhz`.
    async fn find_available(
        &self,
        range_mhz: (f64, f64),
        bandwidth_mhz: f64,
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<SourceRecord>>;
}

#[async_trait]
pub trait AssetBackend: Send + Sync {
    async fn query_availability(&self, params: &Value) -> Result<Vec<SourceRecord>>;

    /// Reserve an asset for a mission. `Ok(false)` means the reservation was
    /// denied (asset busy or unknown).
    async fn reserve(
        &self,
        asset_id: &str,
        mission_id: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<bool>;
}

#[async_trait]
pub trait MissionBackend: Send + Sync {
    async fn query(&self, params: &Value) -> Result<Vec<SourceRecord>>;
}

#[async_trait]
pub trait OrgBackend: Send + Sync {
    async fn query(&self, params: &Value) -> Result<Vec<SourceRecord>>;
}

#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn query(&self, params: &Value) -> Result<Vec<SourceRecord>>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

fn type_matches(record: &Value, params: &Value, key: &str) -> bool {
    let Some(wanted) = params.get(key) else {
        return true;
    };
    match wanted {
        Value::Array(values) => values.iter().any(|v| record.get(key) == Some(v)),
        other => record.get(key) == Some(other),
    }
}

/// Threat store backed by a vector of records.
#[derive(Default)]
pub struct MemoryThreatStore {
    records: RwLock<Vec<SourceRecord>>,
}

impl MemoryThreatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: SourceRecord) {
        self.records.write().await.push(record);
    }
}

#[async_trait]
impl ThreatBackend for MemoryThreatStore {
    async fn query(&self, params: &Value) -> Result<Vec<SourceRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| type_matches(&r.body, params, "threat_type"))
            .cloned()
            .collect())
    }
}

/// Spectrum store with overlap-based conflict detection.
#[derive(Default)]
pub struct MemorySpectrumStore {
    allocations: RwLock<Vec<SourceRecord>>,
}

impl MemorySpectrumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: SourceRecord) {
        self.allocations.write().await.push(record);
    }

    fn overlaps(body: &Value, range: (f64, f64), window: (DateTime<Utc>, DateTime<Utc>)) -> bool {
        let min = body
            .get("frequency_min_mhz")
            .and_then(Value::as_f64)
            .unwrap_or(f64::MIN);
        let max = body
            .get("frequency_max_mhz")
            .and_then(Value::as_f64)
            .unwrap_or(f64::MAX);
        if max < range.0 || min > range.1 {
            return false;
        }
        let parse = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        };
        match (parse("start_time"), parse("end_time")) {
            (Some(start), Some(end)) => start < window.1 && end > window.0,
            _ => true,
        }
    }
}

#[async_trait]
impl SpectrumBackend for MemorySpectrumStore {
    async fn query(&self, _params: &Value) -> Result<Vec<SourceRecord>> {
        Ok(self.allocations.read().await.clone())
    }

    async fn check_conflicts(
        &self,
        range_mhz: (f64, f64),
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<SourceRecord>> {
        let allocations = self.allocations.read().await;
        Ok(allocations
            .iter()
            .filter(|r| Self::overlaps(&r.body, range_mhz, window))
            .cloned()
            .collect())
    }

    async fn create_allocation(&self, request: AllocationRequest) -> Result<SourceRecord> {
        let mut allocations = self.allocations.write().await;
        let id = format!("ALLOC-{:04}", allocations.len() + 1);
        let record = SourceRecord::new(
            id,
            json!({
                "frequency_min_mhz": request.frequency_min_mhz,
                "frequency_max_mhz": request.frequency_max_mhz,
                "start_time": request.start_time.to_rfc3339(),
                "end_time": request.end_time.to_rfc3339(),
                "mission_id": request.mission_id,
            }),
        );
        allocations.push(record.clone());
        Ok(record)
    }

    async fn find_available(
        &self,
        range_mhz: (f64, f64),
        bandwidth_mhz: f64,
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<SourceRecord>> {
        // Walk the range in bandwidth-sized steps and keep conflict-free slots.
        let mut available = Vec::new();
        let mut cursor = range_mhz.0;
        while cursor + bandwidth_mhz <= range_mhz.1 {
            let slot = (cursor, cursor + bandwidth_mhz);
            if self.check_conflicts(slot, window).await?.is_empty() {
                available.push(SourceRecord::new(
                    format!("AVAIL-{:.0}-{:.0}", slot.0, slot.1),
                    json!({
                        "frequency_min_mhz": slot.0,
                        "frequency_max_mhz": slot.1,
                    }),
                ));
            }
            cursor += bandwidth_mhz;
        }
        Ok(available)
    }
}

/// Asset store tracking availability and reservations.
#[derive(Default)]
pub struct MemoryAssetStore {
    assets: RwLock<Vec<SourceRecord>>,
    reservations: RwLock<Vec<(String, String)>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: SourceRecord) {
        self.assets.write().await.push(record);
    }
}

#[async_trait]
impl AssetBackend for MemoryAssetStore {
    async fn query_availability(&self, params: &Value) -> Result<Vec<SourceRecord>> {
        let assets = self.assets.read().await;
        Ok(assets
            .iter()
            .filter(|r| type_matches(&r.body, params, "asset_type"))
            .cloned()
            .collect())
    }

    async fn reserve(
        &self,
        asset_id: &str,
        mission_id: &str,
        _window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<bool> {
        let assets = self.assets.read().await;
        let known = assets.iter().any(|r| r.id == asset_id);
        if !known {
            return Ok(false);
        }
        drop(assets);

        let mut reservations = self.reservations.write().await;
        if reservations.iter().any(|(a, _)| a == asset_id) {
            return Ok(false);
        }
        reservations.push((asset_id.to_string(), mission_id.to_string()));
        Ok(true)
    }
}

macro_rules! memory_value_store {
    ($name:ident, $trait_name:ident) => {
        #[derive(Default)]
        pub struct $name {
            records: RwLock<Vec<SourceRecord>>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub async fn insert(&self, record: SourceRecord) {
                self.records.write().await.push(record);
            }
        }

        #[async_trait]
        impl $trait_name for $name {
            async fn query(&self, _params: &Value) -> Result<Vec<SourceRecord>> {
                Ok(self.records.read().await.clone())
            }
        }
    };
}

memory_value_store!(MemoryMissionStore, MissionBackend);
memory_value_store!(MemoryOrgStore, OrgBackend);
memory_value_store!(MemoryMetricsStore, MetricsBackend);

/// A backend whose store is down; every call reports the subsystem as
/// unavailable.
pub struct DownBackend(pub &'static str);

#[async_trait]
impl ThreatBackend for DownBackend {
    async fn query(&self, _params: &Value) -> Result<Vec<SourceRecord>> {
        Err(AetherError::unavailable(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spectrum_conflicts_detected_on_overlap() {
        let store = MemorySpectrumStore::new();
        let now = Utc::now();
        store
            .create_allocation(AllocationRequest {
                frequency_min_mhz: 2400.0,
                frequency_max_mhz: 2500.0,
                start_time: now,
                end_time: now + chrono::Duration::hours(4),
                mission_id: "MSN-001".to_string(),
            })
            .await
            .unwrap();

        let conflicts = store
            .check_conflicts((2450.0, 2550.0), (now, now + chrono::Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);

        let clear = store
            .check_conflicts((2600.0, 2700.0), (now, now + chrono::Duration::hours(1)))
            .await
            .unwrap();
        assert!(clear.is_empty());
    }

    #[tokio::test]
    async fn asset_double_reservation_denied() {
        let store = MemoryAssetStore::new();
        store
            .insert(SourceRecord::new(
                "ASSET-EA-001",
                json!({"platform": "EC-130H", "asset_type": "electronic_attack"}),
            ))
            .await;
        let now = Utc::now();
        let window = (now, now + chrono::Duration::hours(2));

        assert!(store.reserve("ASSET-EA-001", "MSN-001", window).await.unwrap());
        assert!(!store.reserve("ASSET-EA-001", "MSN-002", window).await.unwrap());
        assert!(!store.reserve("ASSET-MISSING", "MSN-003", window).await.unwrap());
    }
}
