//! Process-local ephemeral store.
//!
//! The default backend, and the substitute [`DegradedStore`] falls back to
//! when a durable backend is unavailable. Data is lost on restart. Expiry
//! is simulated: deadlines are checked on read, and write paths purge dead
//! entries for their key.
//!
//! [`DegradedStore`]: super::DegradedStore

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use super::{
    keys, unix_now, unix_now_f64, CallRecord, ContextMap, ContextSnapshot, EngineStore,
    StoreError, StoreResult,
};
use crate::lifecycle::CallLifecycle;

/// Value with a simulated TTL deadline.
#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: f64,
}

impl<T> Expiring<T> {
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

/// In-memory implementation of [`EngineStore`].
///
/// Per-namespace `RwLock<HashMap>` maps; counters are `AtomicI64` so
/// increments stay atomic without taking the map write lock on the hot
/// path.
#[derive(Default)]
pub struct MemoryStore {
    calls: RwLock<HashMap<String, Expiring<CallRecord>>>,
    contexts: RwLock<HashMap<String, Expiring<ContextSnapshot>>>,
    counters: RwLock<HashMap<String, Arc<AtomicI64>>>,
    samples: RwLock<HashMap<String, Vec<(f64, f64)>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, key: &str) -> StoreResult<Arc<AtomicI64>> {
        if let Some(counter) = self
            .counters
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(key)
        {
            return Ok(counter.clone());
        }
        let mut counters = self.counters.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(counters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone())
    }
}

impl EngineStore for MemoryStore {
    fn get_call(&self, call_id: &str) -> StoreResult<Option<CallRecord>> {
        let calls = self.calls.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(calls
            .get(&keys::call(call_id))
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone()))
    }

    fn init_call_if_missing(&self, call_id: &str, ttl_secs: u64) -> StoreResult<CallRecord> {
        let mut calls = self.calls.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::call(call_id);
        match calls.get(&key) {
            Some(entry) if entry.live() => Ok(entry.value.clone()),
            _ => {
                let record = CallRecord::fresh();
                calls.insert(key, Expiring::fresh(record.clone(), ttl_secs));
                Ok(record)
            }
        }
    }

    fn update_call(
        &self,
        call_id: &str,
        state: Option<CallLifecycle>,
        retry_count: Option<u32>,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let mut calls = self.calls.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::call(call_id);
        let mut record = match calls.get(&key) {
            Some(entry) if entry.live() => entry.value.clone(),
            _ => CallRecord::fresh(),
        };
        if state == Some(CallLifecycle::Completed) {
            // Terminal cleanup: the tombstone outlives the call only until
            // its TTL, after which the id is as if never seen.
            let tombstone = CallRecord::tombstone(record.created_at);
            calls.insert(key, Expiring::fresh(tombstone, ttl_secs));
            return Ok(());
        }
        if let Some(state) = state {
            record.state = state;
        }
        if let Some(retry_count) = retry_count {
            record.retry_count = retry_count;
        }
        record.updated_at = unix_now();
        calls.insert(key, Expiring::fresh(record, ttl_secs));
        Ok(())
    }

    fn increment_retry(&self, call_id: &str, ttl_secs: u64) -> StoreResult<u32> {
        let mut calls = self.calls.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::call(call_id);
        let mut record = match calls.get(&key) {
            Some(entry) if entry.live() => entry.value.clone(),
            _ => CallRecord::fresh(),
        };
        record.retry_count += 1;
        record.updated_at = unix_now();
        let count = record.retry_count;
        calls.insert(key, Expiring::fresh(record, ttl_secs));
        Ok(count)
    }

    fn context_get(&self, call_id: &str) -> StoreResult<ContextSnapshot> {
        let contexts = self.contexts.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(contexts
            .get(&keys::context(call_id))
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone())
            .unwrap_or_else(ContextSnapshot::empty))
    }

    fn context_put_if_version(
        &self,
        call_id: &str,
        expected_version: u64,
        values: ContextMap,
        ttl_secs: u64,
    ) -> StoreResult<bool> {
        let mut contexts = self.contexts.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = keys::context(call_id);
        let current_version = match contexts.get(&key) {
            Some(entry) if entry.live() => entry.value.version,
            _ => 0,
        };
        if current_version != expected_version {
            return Ok(false);
        }
        let snapshot = ContextSnapshot {
            version: expected_version + 1,
            values,
        };
        contexts.insert(key, Expiring::fresh(snapshot, ttl_secs));
        Ok(true)
    }

    fn counter_incr(&self, key: &str) -> StoreResult<i64> {
        Ok(self.counter(key)?.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn counter_decr(&self, key: &str) -> StoreResult<i64> {
        Ok(self.counter(key)?.fetch_sub(1, Ordering::SeqCst) - 1)
    }

    fn counter_get(&self, key: &str) -> StoreResult<i64> {
        Ok(self.counter(key)?.load(Ordering::SeqCst))
    }

    fn push_sample(
        &self,
        metric: &str,
        timestamp: f64,
        value: f64,
        _ttl_secs: u64,
    ) -> StoreResult<()> {
        let mut samples = self.samples.write().map_err(|_| StoreError::LockPoisoned)?;
        samples
            .entry(keys::sla_window(metric))
            .or_default()
            .push((timestamp, value));
        Ok(())
    }

    fn samples_since(&self, metric: &str, cutoff: f64) -> StoreResult<Vec<f64>> {
        let mut samples = self.samples.write().map_err(|_| StoreError::LockPoisoned)?;
        match samples.get_mut(&keys::sla_window(metric)) {
            Some(series) => {
                // Reads double as compaction so stale samples never pile up.
                series.retain(|(timestamp, _)| *timestamp >= cutoff);
                Ok(series.iter().map(|(_, value)| *value).collect())
            }
            None => Ok(Vec::new()),
        }
    }
}
