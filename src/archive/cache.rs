use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;

use crate::core::Enrichment;
use crate::db::ActorRecord;
use crate::signals::score;

/// Latest known view of one actor, for fast reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub tag: String,
    pub risk_level: u8,
    pub enrichment: Option<Enrichment>,
}

/// Process-local read cache in front of the registry. Derived data only:
/// it is rebuilt from the store on startup and never persisted itself.
#[derive(Debug, Default)]
pub struct ActorCache {
    map: RwLock<HashMap<String, CacheEntry>>,
}

#[derive(Deserialize)]
struct SnapshotApi {
    #[serde(default)]
    api: Option<Enrichment>,
}

impl CacheEntry {
    fn from_record(record: &ActorRecord) -> Self {
        let enrichment = serde_json::from_str::<SnapshotApi>(&record.historical_data_json)
            .ok()
            .and_then(|s| s.api);
        Self {
            tag: record.behavior_pattern.clone(),
            risk_level: score::base_risk(&record.behavior_pattern),
            enrichment,
        }
    }
}

impl ActorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with entries derived from `records`.
    pub fn rebuild(&self, records: &[ActorRecord]) -> usize {
        let fresh: HashMap<String, CacheEntry> = records
            .iter()
            .map(|r| (r.wallet_id.clone(), CacheEntry::from_record(r)))
            .collect();
        let len = fresh.len();
        *self.write() = fresh;
        len
    }

    // Entries are replaced whole, so a poisoned lock never exposes a torn value.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.map.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.map.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn insert(&self, wallet_id: &str, entry: CacheEntry) {
        self.write().insert(wallet_id.to_string(), entry);
    }

    pub fn get(&self, wallet_id: &str) -> Option<CacheEntry> {
        self.read().get(wallet_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
