//! Market Cache - TTL cache for Kalshi responses
//!
//! Two layers:
//! - memory: `key -> (value, stored_at)` behind a read/write lock
//! - file (optional): `{dir}/{key}.json` plus `{dir}/cache_metadata.json`
//!   mapping each key to the RFC 3339 time it was written
//!
//! Entries older than the TTL are ignored in both layers. Concurrent writers
//! race with last-writer-wins.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const METADATA_FILE: &str = "cache_metadata.json";

/// Source of "now" for TTL checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// TTL cache for market data
pub struct MarketCache {
    entries: RwLock<HashMap<String, (Value, DateTime<Utc>)>>,
    ttl: Duration,
    dir: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl MarketCache {
    pub fn new(ttl: Duration, dir: Option<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            dir,
            clock,
        }
    }

    /// Memory-only cache on the wall clock
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(ttl, None, Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, stored_at: DateTime<Utc>) -> bool {
        self.clock.now() - stored_at < self.ttl
    }

    /// Get a cached value, checking memory first and then the file layer
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        // Check memory first
        {
            let entries = self.entries.read().await;
            if let Some((value, stored_at)) = entries.get(key) {
                if self.is_fresh(*stored_at) {
                    return serde_json::from_value(value.clone()).ok();
                }
            }
        }

        let (value, stored_at) = self.read_file(key).await?;
        let typed = serde_json::from_value(value.clone()).ok()?;

        // Warm memory with the file's own timestamp so the TTL is not extended
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, stored_at));
        debug!("[Cache] {} loaded from file layer", key);
        Some(typed)
    }

    /// Store a value in memory and, if configured, on disk
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("[Cache] could not serialize {}: {}", key, e);
                return;
            }
        };
        let now = self.clock.now();

        {
            let mut entries = self.entries.write().await;
            entries.insert(key.to_string(), (value.clone(), now));
        }

        if let Err(e) = self.write_file(key, &value, now).await {
            // The file layer is best effort; memory is authoritative
            warn!("[Cache] file write failed for {}: {}", key, e);
        }
    }

    /// Drop every entry from memory and delete cache files
    pub async fn clear(&self) {
        self.entries.write().await.clear();

        let Some(dir) = &self.dir else { return };
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(_) => return,
        };
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("[Cache] could not remove {}: {}", path.display(), e);
                }
            }
        }
    }

    fn entry_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.json", key))
    }

    async fn read_metadata(dir: &Path) -> HashMap<String, String> {
        match tokio::fs::read_to_string(dir.join(METADATA_FILE)).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    async fn read_file(&self, key: &str) -> Option<(Value, DateTime<Utc>)> {
        let dir = self.dir.as_ref()?;
        let meta = Self::read_metadata(dir).await;
        let stored_at = DateTime::parse_from_rfc3339(meta.get(key)?)
            .ok()?
            .with_timezone(&Utc);
        if !self.is_fresh(stored_at) {
            return None;
        }
        let text = tokio::fs::read_to_string(Self::entry_path(dir, key)).await.ok()?;
        let value = serde_json::from_str(&text).ok()?;
        Some((value, stored_at))
    }

    async fn write_file(&self, key: &str, value: &Value, now: DateTime<Utc>) -> std::io::Result<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(Self::entry_path(dir, key), value.to_string()).await?;

        let mut meta = Self::read_metadata(dir).await;
        meta.insert(key.to_string(), now.to_rfc3339());
        let meta_text = serde_json::to_string(&meta).map_err(std::io::Error::other)?;
        tokio::fs::write(dir.join(METADATA_FILE), meta_text).await
    }
}
