//! Bounded, time-aware registry of observed transient assets.
//!
//! One tracker instance exists per asset type (drones, vehicles, sensors).
//! The record store lives behind a mutex so a shared tracker is safe under a
//! multithreaded runtime; reads return snapshots with status computed against
//! the current time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Computed asset liveness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    /// Observed within the staleness window
    Active,
    /// Not observed within the staleness window
    Stale,
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Active => write!(f, "active"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Stored record for one observed asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AssetRecord {
    identifier: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    metadata: HashMap<String, serde_json::Value>,
    observation_count: u64,
}

/// Point-in-time view of an asset, with computed status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetSnapshot {
    /// Asset type of the owning tracker
    pub asset_type: String,
    /// Unique identifier within the tracker
    pub identifier: String,
    /// First observation time
    pub first_seen: DateTime<Utc>,
    /// Most recent observation time
    pub last_seen: DateTime<Utc>,
    /// Merged observation metadata (newest values win)
    pub metadata: HashMap<String, serde_json::Value>,
    /// Total observations recorded
    pub observation_count: u64,
    /// Liveness computed at snapshot time
    pub status: AssetStatus,
}

/// Per-type asset counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AssetSummary {
    /// Distinct assets currently retained
    pub total: usize,
    /// Assets observed within the staleness window
    pub active: usize,
    /// Assets past the staleness window
    pub stale: usize,
}

/// Bounded registry of observed transient assets of a single type.
#[derive(Debug)]
pub struct AssetTracker {
    asset_type: String,
    stale_after: Duration,
    max_assets: usize,
    records: Mutex<HashMap<String, AssetRecord>>,
}

impl AssetTracker {
    /// Create a tracker for `asset_type` retaining at most `max_assets` records.
    #[must_use]
    pub fn new(asset_type: impl Into<String>, stale_after_seconds: u64, max_assets: usize) -> Self {
        Self {
            asset_type: asset_type.into(),
            stale_after: Duration::seconds(stale_after_seconds as i64),
            max_assets,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Asset type this tracker covers.
    #[must_use]
    pub fn asset_type(&self) -> &str {
        &self.asset_type
    }

    /// Record an observation of `identifier`.
    ///
    /// Unseen identifiers create a fresh record; repeat observations update
    /// `last_seen`, merge metadata (new values overwrite), and bump the
    /// observation count. If the insert pushed the tracker past capacity, the
    /// records with the smallest `last_seen` are evicted until the count fits.
    pub fn observe(
        &self,
        identifier: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
        observed_at: Option<DateTime<Utc>>,
    ) -> AssetSnapshot {
        let observed_at = observed_at.unwrap_or_else(Utc::now);
        let mut records = self.records.lock().expect("asset tracker lock poisoned");

        let record = records
            .entry(identifier.to_owned())
            .and_modify(|record| {
                record.last_seen = record.last_seen.max(observed_at);
                record.observation_count += 1;
            })
            .or_insert_with(|| AssetRecord {
                identifier: identifier.to_owned(),
                first_seen: observed_at,
                last_seen: observed_at,
                metadata: HashMap::new(),
                observation_count: 1,
            });

        if let Some(metadata) = metadata {
            record.metadata.extend(metadata);
        }
        let snapshot = self.snapshot_of(record, Utc::now());

        while records.len() > self.max_assets {
            let oldest = records
                .values()
                .min_by_key(|record| record.last_seen)
                .map(|record| record.identifier.clone());
            match oldest {
                Some(identifier) => {
                    tracing::debug!(
                        asset_type = %self.asset_type,
                        identifier = %identifier,
                        "Evicting oldest asset record at capacity"
                    );
                    records.remove(&identifier);
                }
                None => break,
            }
        }

        snapshot
    }

    /// Counts of retained assets split by computed status.
    #[must_use]
    pub fn get_summary(&self) -> AssetSummary {
        let records = self.records.lock().expect("asset tracker lock poisoned");
        let now = Utc::now();
        let mut summary = AssetSummary {
            total: records.len(),
            ..AssetSummary::default()
        };
        for record in records.values() {
            match self.status_at(record, now) {
                AssetStatus::Active => summary.active += 1,
                AssetStatus::Stale => summary.stale += 1,
            }
        }
        summary
    }

    /// Snapshots of every retained asset, most recently seen first.
    #[must_use]
    pub fn list_assets(&self) -> Vec<AssetSnapshot> {
        let records = self.records.lock().expect("asset tracker lock poisoned");
        let now = Utc::now();
        let mut snapshots: Vec<AssetSnapshot> = records
            .values()
            .map(|record| self.snapshot_of(record, now))
            .collect();
        snapshots.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        snapshots
    }

    /// Snapshot of one asset by identifier.
    #[must_use]
    pub fn get_asset(&self, identifier: &str) -> Option<AssetSnapshot> {
        let records = self.records.lock().expect("asset tracker lock poisoned");
        records
            .get(identifier)
            .map(|record| self.snapshot_of(record, Utc::now()))
    }

    fn status_at(&self, record: &AssetRecord, now: DateTime<Utc>) -> AssetStatus {
        if now.signed_duration_since(record.last_seen) > self.stale_after {
            AssetStatus::Stale
        } else {
            AssetStatus::Active
        }
    }

    fn snapshot_of(&self, record: &AssetRecord, now: DateTime<Utc>) -> AssetSnapshot {
        AssetSnapshot {
            asset_type: self.asset_type.clone(),
            identifier: record.identifier.clone(),
            first_seen: record.first_seen,
            last_seen: record.last_seen,
            metadata: record.metadata.clone(),
            observation_count: record.observation_count,
            status: self.status_at(record, now),
        }
    }
}
