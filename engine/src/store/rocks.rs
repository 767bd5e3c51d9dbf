//! RocksDB-backed durable store (feature `durable-state`).
//!
//! Column families give logical separation per keyspace. Values are stored
//! as JSON for debuggability, wrapped in an envelope carrying the expiry
//! deadline — RocksDB has no native TTL for this access pattern, so expiry
//! is simulated on read. Mutating operations take the write lock so
//! increments and conditional writes stay atomic across threads.

use std::path::PathBuf;
use std::sync::RwLock;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{
    keys, unix_now, unix_now_f64, CallRecord, ContextMap, ContextSnapshot, EngineStore,
    StoreError, StoreResult,
};
use crate::lifecycle::CallLifecycle;

/// Column family for call lifecycle records
const CF_CALLS: &str = "calls";

/// Column family for shared context bags
const CF_CONTEXT: &str = "context";

/// Column family for shared counters
const CF_COUNTERS: &str = "counters";

/// Column family for SLA window samples
const CF_SAMPLES: &str = "samples";

const ALL_CFS: &[&str] = &[CF_CALLS, CF_CONTEXT, CF_COUNTERS, CF_SAMPLES];

/// Stored value with its simulated-TTL deadline.
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    expires_at: f64,
}

impl<T> Envelope<T> {
    fn fresh(value: T, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: unix_now_f64() + ttl_secs as f64,
        }
    }

    fn live(&self) -> bool {
        unix_now_f64() <= self.expires_at
    }
}

/// Durable [`EngineStore`] implementation over RocksDB.
pub struct RocksStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// The database path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_live<T: DeserializeOwned>(db: &DB, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {}", cf_name)))?;
        match db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => {
                let envelope: Envelope<T> = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(envelope.live().then_some(envelope.value))
            }
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(
        db: &DB,
        cf_name: &str,
        key: &str,
        value: T,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {}", cf_name)))?;
        let bytes = serde_json::to_vec(&Envelope::fresh(value, ttl_secs))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        db.put_cf(&cf, key.as_bytes(), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

// Counters never expire; a very long deadline keeps the envelope shape.
const COUNTER_TTL_SECS: u64 = u64::MAX / 4;

impl EngineStore for RocksStore {
    fn get_call(&self, call_id: &str) -> StoreResult<Option<CallRecord>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::read_live(&db, CF_CALLS, &keys::call(call_id))
    }

    fn init_call_if_missing(&self, call_id: &str, ttl_secs: u64) -> StoreResult<CallRecord> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::call(call_id);
        if let Some(record) = Self::read_live::<CallRecord>(&db, CF_CALLS, &key)? {
            return Ok(record);
        }
        let record = CallRecord::fresh();
        Self::write(&db, CF_CALLS, &key, record.clone(), ttl_secs)?;
        Ok(record)
    }

    fn update_call(
        &self,
        call_id: &str,
        state: Option<CallLifecycle>,
        retry_count: Option<u32>,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::call(call_id);
        let mut record =
            Self::read_live::<CallRecord>(&db, CF_CALLS, &key)?.unwrap_or_else(CallRecord::fresh);
        if state == Some(CallLifecycle::Completed) {
            let tombstone = CallRecord::tombstone(record.created_at);
            return Self::write(&db, CF_CALLS, &key, tombstone, ttl_secs);
        }
        if let Some(state) = state {
            record.state = state;
        }
        if let Some(retry_count) = retry_count {
            record.retry_count = retry_count;
        }
        record.updated_at = unix_now();
        Self::write(&db, CF_CALLS, &key, record, ttl_secs)
    }

    fn increment_retry(&self, call_id: &str, ttl_secs: u64) -> StoreResult<u32> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::call(call_id);
        let mut record =
            Self::read_live::<CallRecord>(&db, CF_CALLS, &key)?.unwrap_or_else(CallRecord::fresh);
        record.retry_count += 1;
        record.updated_at = unix_now();
        let count = record.retry_count;
        Self::write(&db, CF_CALLS, &key, record, ttl_secs)?;
        Ok(count)
    }

    fn context_get(&self, call_id: &str) -> StoreResult<ContextSnapshot> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(
            Self::read_live::<ContextSnapshot>(&db, CF_CONTEXT, &keys::context(call_id))?
                .unwrap_or_else(ContextSnapshot::empty),
        )
    }

    fn context_put_if_version(
        &self,
        call_id: &str,
        expected_version: u64,
        values: ContextMap,
        ttl_secs: u64,
    ) -> StoreResult<bool> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::context(call_id);
        let current_version = Self::read_live::<ContextSnapshot>(&db, CF_CONTEXT, &key)?
            .map(|snapshot| snapshot.version)
            .unwrap_or(0);
        if current_version != expected_version {
            return Ok(false);
        }
        let snapshot = ContextSnapshot {
            version: expected_version + 1,
            values,
        };
        Self::write(&db, CF_CONTEXT, &key, snapshot, ttl_secs)?;
        Ok(true)
    }

    fn counter_incr(&self, key: &str) -> StoreResult<i64> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let value = Self::read_live::<i64>(&db, CF_COUNTERS, key)?.unwrap_or(0) + 1;
        Self::write(&db, CF_COUNTERS, key, value, COUNTER_TTL_SECS)?;
        Ok(value)
    }

    fn counter_decr(&self, key: &str) -> StoreResult<i64> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let value = Self::read_live::<i64>(&db, CF_COUNTERS, key)?.unwrap_or(0) - 1;
        Self::write(&db, CF_COUNTERS, key, value, COUNTER_TTL_SECS)?;
        Ok(value)
    }

    fn counter_get(&self, key: &str) -> StoreResult<i64> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Self::read_live::<i64>(&db, CF_COUNTERS, key)?.unwrap_or(0))
    }

    fn push_sample(
        &self,
        metric: &str,
        timestamp: f64,
        value: f64,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::sla_window(metric);
        let mut series =
            Self::read_live::<Vec<(f64, f64)>>(&db, CF_SAMPLES, &key)?.unwrap_or_default();
        series.push((timestamp, value));
        Self::write(&db, CF_SAMPLES, &key, series, ttl_secs)
    }

    fn samples_since(&self, metric: &str, cutoff: f64) -> StoreResult<Vec<f64>> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::sla_window(metric);
        let mut series = match Self::read_live::<Vec<(f64, f64)>>(&db, CF_SAMPLES, &key)? {
            Some(series) => series,
            None => return Ok(Vec::new()),
        };
        let before = series.len();
        series.retain(|(timestamp, _)| *timestamp >= cutoff);
        if series.len() != before {
            // Compact the stored window while we hold the write lock.
            Self::write(&db, CF_SAMPLES, &key, series.clone(), COUNTER_TTL_SECS)?;
        }
        Ok(series.iter().map(|(_, value)| *value).collect())
    }
}
