//! Geohash-keyed cache of provider results.
//!
//! Entries live in a [`KeyValueStore`] as individual JSON documents so that one
//! corrupt entry never takes the rest down with it. Insertion order is kept in a
//! separate index document and drives eviction: once the cache holds more than
//! `capacity` cells, the earliest-inserted cells are dropped. Expiry is lazy; a
//! stale entry reads as absent and stays indexed until eviction reaches it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use wildfire_core::{CacheConfig, StorageError};

use crate::store::KeyValueStore;
use crate::types::{Freshness, RiskAssessment};

pub const CACHE_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL_HOURS: i64 = 6;

const INDEX_KEY: &str = "risk_cache.index";
const ENTRY_PREFIX: &str = "risk_cache.entry.";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    key: String,
    value: RiskAssessment,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    version: u32,
    keys: Vec<String>,
}

enum EntryState {
    Fresh(RiskAssessment),
    Stale,
    Missing,
    Corrupt(String),
}

pub struct SpatialCache {
    store: Arc<dyn KeyValueStore>,
    /// Insertion order, oldest first. Held for the whole of every mutation.
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    ttl: Duration,
}

impl std::fmt::Debug for SpatialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialCache")
            .field("len", &self.order.lock().len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SpatialCache {
    /// Open the cache on `store` with default capacity (100) and TTL (6 h).
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_limits(store, DEFAULT_CAPACITY, Duration::hours(DEFAULT_TTL_HOURS))
    }

    /// Open the cache with limits taken from configuration.
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self::with_limits(store, config.capacity, Duration::hours(i64::from(config.ttl_hours)))
    }

    /// Open the cache, restoring insertion order from the persisted index.
    /// An unreadable index starts the cache empty.
    pub fn with_limits(store: Arc<dyn KeyValueStore>, capacity: usize, ttl: Duration) -> Self {
        let order = load_index(store.as_ref());
        tracing::debug!("Opened risk cache with {} indexed cells", order.len());

        Self {
            store,
            order: Mutex::new(order),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Look up a cell. Returns the stored assessment re-tagged as `Cached`.
    pub fn get(&self, geohash: &str) -> Option<RiskAssessment> {
        self.get_at(geohash, Utc::now())
    }

    /// [`get`](Self::get) evaluated against an explicit clock.
    pub fn get_at(&self, geohash: &str, now: DateTime<Utc>) -> Option<RiskAssessment> {
        match self.read_entry(geohash, now) {
            EntryState::Fresh(assessment) => Some(assessment.with_freshness(Freshness::Cached)),
            EntryState::Stale => {
                tracing::debug!("Cache entry {} expired", geohash);
                None
            }
            EntryState::Missing => None,
            EntryState::Corrupt(reason) => {
                tracing::warn!("Dropping corrupt cache entry {}: {}", geohash, reason);
                self.drop_entry(geohash);
                None
            }
        }
    }

    /// Store an assessment for a cell, evicting the oldest cells if over capacity.
    pub fn put(&self, geohash: &str, assessment: RiskAssessment) -> Result<(), StorageError> {
        self.put_at(geohash, assessment, Utc::now())
    }

    /// [`put`](Self::put) with an explicit `stored_at` timestamp.
    pub fn put_at(
        &self,
        geohash: &str,
        assessment: RiskAssessment,
        stored_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let entry = CacheEntry {
            version: CACHE_SCHEMA_VERSION,
            key: geohash.to_string(),
            value: assessment,
            stored_at,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| StorageError::QueryFailed(format!("serialize cache entry: {}", e)))?;

        let mut order = self.order.lock();
        self.store.set(&entry_key(geohash), &json)?;

        // Re-inserting a cell moves it to the back
        order.retain(|k| k != geohash);
        order.push_back(geohash.to_string());

        self.evict(&mut order);

        self.persist_index(&order)
    }

    /// Remove every cached cell.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut order = self.order.lock();
        for key in order.iter() {
            self.store.remove(&entry_key(key))?;
        }
        order.clear();
        self.store.remove(INDEX_KEY)
    }

    /// Number of indexed cells, including stale ones not yet evicted.
    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict(&self, order: &mut VecDeque<String>) {
        while order.len() > self.capacity {
            if let Some(key) = order.pop_front() {
                tracing::debug!("Evicting cache cell {}", key);
                self.remove_quietly(&key);
            }
        }
    }

    fn read_entry(&self, geohash: &str, now: DateTime<Utc>) -> EntryState {
        let raw = match self.store.get(&entry_key(geohash)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return EntryState::Missing,
            Err(e) => {
                // Backend failure is a miss, not a reason to drop the entry
                tracing::warn!("Cache read failed for {}: {}", geohash, e);
                return EntryState::Missing;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => return EntryState::Corrupt(e.to_string()),
        };

        if entry.version != CACHE_SCHEMA_VERSION {
            return EntryState::Corrupt(format!(
                "schema version {} (expected {})",
                entry.version, CACHE_SCHEMA_VERSION
            ));
        }
        if entry.key != geohash {
            return EntryState::Corrupt(format!("entry keyed as {}", entry.key));
        }

        if now - entry.stored_at > self.ttl {
            EntryState::Stale
        } else {
            EntryState::Fresh(entry.value)
        }
    }

    /// Remove a corrupt cell. Re-checked under the lock so a concurrent `put` of a
    /// valid entry for the same cell survives.
    fn drop_entry(&self, geohash: &str) {
        let mut order = self.order.lock();
        if !matches!(self.read_entry(geohash, Utc::now()), EntryState::Corrupt(_)) {
            return;
        }
        self.remove_quietly(geohash);
        let before = order.len();
        order.retain(|k| k != geohash);
        if order.len() != before {
            if let Err(e) = self.persist_index(&order) {
                tracing::warn!("Failed to persist cache index: {}", e);
            }
        }
    }

    fn remove_quietly(&self, geohash: &str) {
        if let Err(e) = self.store.remove(&entry_key(geohash)) {
            tracing::warn!("Failed to remove cache entry {}: {}", geohash, e);
        }
    }

    fn persist_index(&self, order: &VecDeque<String>) -> Result<(), StorageError> {
        let index = CacheIndex {
            version: CACHE_SCHEMA_VERSION,
            keys: order.iter().cloned().collect(),
        };
        let json = serde_json::to_string(&index)
            .map_err(|e| StorageError::QueryFailed(format!("serialize cache index: {}", e)))?;
        self.store.set(INDEX_KEY, &json)
    }
}

fn entry_key(geohash: &str) -> String {
    format!("{}{}", ENTRY_PREFIX, geohash)
}

fn load_index(store: &dyn KeyValueStore) -> VecDeque<String> {
    let raw = match store.get(INDEX_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return VecDeque::new(),
        Err(e) => {
            tracing::warn!("Failed to read cache index, starting empty: {}", e);
            return VecDeque::new();
        }
    };

    match serde_json::from_str::<CacheIndex>(&raw) {
        Ok(index) if index.version == CACHE_SCHEMA_VERSION => {
            let mut order = VecDeque::with_capacity(index.keys.len());
            for key in index.keys {
                if !order.contains(&key) {
                    order.push_back(key);
                }
            }
            order
        }
        Ok(index) => {
            tracing::warn!(
                "Cache index has schema version {}, starting empty",
                index.version
            );
            VecDeque::new()
        }
        Err(e) => {
            tracing::warn!("Cache index corrupt, starting empty: {}", e);
            VecDeque::new()
        }
    }
}
