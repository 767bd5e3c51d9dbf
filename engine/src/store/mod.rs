//! Storage layer for the decision engine.
//!
//! Everything the engine mutates lives behind the [`EngineStore`] trait:
//! per-call lifecycle records, the versioned shared-context bag, the global
//! admission counter, and the SLA window samples. Two implementations are
//! provided — the process-local [`MemoryStore`] and, behind the
//! `durable-state` feature, a RocksDB-backed [`RocksStore`] — plus
//! [`DegradedStore`], which falls back to a memory substitute when the
//! primary backend fails. Selection happens once at startup.
//!
//! TTL is the only garbage collection mechanism. Backends without native
//! expiry simulate it by checking deadlines on read.

mod degraded;
pub mod keys;
mod memory;
#[cfg(feature = "durable-state")]
mod rocks;

pub use degraded::{DegradedStore, StoreHealth};
pub use memory::MemoryStore;
#[cfg(feature = "durable-state")]
pub use rocks::RocksStore;

use crate::lifecycle::CallLifecycle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Current unix time in whole seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Current unix time with sub-second precision, for window samples and
/// expiry deadlines.
pub(crate) fn unix_now_f64() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Mutable per-call lifecycle record, keyed by call id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Current lifecycle state.
    pub state: CallLifecycle,
    /// Retry attempts so far. Non-decreasing until the record expires.
    pub retry_count: u32,
    /// Unix seconds when the record was created.
    pub created_at: i64,
    /// Unix seconds of the last mutation.
    pub updated_at: i64,
}

impl CallRecord {
    /// Fresh record in INIT with zero retries.
    pub fn fresh() -> Self {
        let now = unix_now();
        Self {
            state: CallLifecycle::Init,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Terminal tombstone. Retry bookkeeping is cleared; the record stays
    /// until its TTL so later events hit terminal protection instead of
    /// restarting the lifecycle early.
    pub fn tombstone(created_at: i64) -> Self {
        Self {
            state: CallLifecycle::Completed,
            retry_count: 0,
            created_at,
            updated_at: unix_now(),
        }
    }
}

/// Open key/value audit bag shared across components for one call.
pub type ContextMap = Map<String, Value>;

/// Versioned snapshot of a call's shared context.
///
/// The version increments on every successful conditional write and is the
/// basis for the optimistic merge in [`merge_context`]. The context is pure
/// observability — control flow never reads it as a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Conditional-write version. 0 means "never written".
    pub version: u64,
    /// Latest known attributes, shallow-merged by writers.
    pub values: ContextMap,
}

impl ContextSnapshot {
    /// Empty snapshot for a call with no context yet.
    pub fn empty() -> Self {
        Self {
            version: 0,
            values: ContextMap::new(),
        }
    }
}

/// Storage operations required by the engine.
///
/// Counter increments and retry increments must be atomic with respect to
/// concurrent callers — never read-then-write. Context writes are
/// conditional on the snapshot version to support optimistic merges.
pub trait EngineStore: Send + Sync {
    /// Fetch the call record, honoring expiry.
    fn get_call(&self, call_id: &str) -> StoreResult<Option<CallRecord>>;

    /// Atomic create-if-absent: returns the existing live record or a fresh
    /// INIT record. Concurrent first arrivals for the same id all observe
    /// the same record.
    fn init_call_if_missing(&self, call_id: &str, ttl_secs: u64) -> StoreResult<CallRecord>;

    /// Merge the provided fields into the record, refreshing updated_at and
    /// the TTL. A COMPLETED state writes a terminal tombstone (see
    /// [`CallRecord::tombstone`]).
    fn update_call(
        &self,
        call_id: &str,
        state: Option<CallLifecycle>,
        retry_count: Option<u32>,
        ttl_secs: u64,
    ) -> StoreResult<()>;

    /// Atomic increment-and-return of the retry counter, refreshing the TTL.
    fn increment_retry(&self, call_id: &str, ttl_secs: u64) -> StoreResult<u32>;

    /// Read the versioned context snapshot (empty if absent or expired).
    fn context_get(&self, call_id: &str) -> StoreResult<ContextSnapshot>;

    /// Conditionally replace the context: succeeds only when the stored
    /// version still equals `expected_version`. Returns whether the write
    /// was applied.
    fn context_put_if_version(
        &self,
        call_id: &str,
        expected_version: u64,
        values: ContextMap,
        ttl_secs: u64,
    ) -> StoreResult<bool>;

    /// Atomic increment of a shared counter, returning the new value.
    fn counter_incr(&self, key: &str) -> StoreResult<i64>;

    /// Atomic decrement of a shared counter, returning the new value.
    fn counter_decr(&self, key: &str) -> StoreResult<i64>;

    /// Current counter value (0 if never touched).
    fn counter_get(&self, key: &str) -> StoreResult<i64>;

    /// Append a timestamped sample to a metric window.
    fn push_sample(&self, metric: &str, timestamp: f64, value: f64, ttl_secs: u64)
        -> StoreResult<()>;

    /// All sample values with timestamp >= cutoff. Reads prune expired
    /// samples as a side effect so windows stay bounded.
    fn samples_since(&self, metric: &str, cutoff: f64) -> StoreResult<Vec<f64>>;
}

/// Bound on optimistic merge retries before the update is dropped.
const MERGE_RETRY_BOUND: usize = 8;

/// Read–merge–conditional-write combinator for the shared context.
///
/// Shallow-merges `updates` into the current snapshot, retrying on version
/// conflict up to [`MERGE_RETRY_BOUND`] times. Exhaustion or a store error
/// drops the update with a warning — context writes are observability and
/// must never fail the request.
pub fn merge_context(store: &dyn EngineStore, call_id: &str, updates: ContextMap, ttl_secs: u64) {
    if updates.is_empty() {
        return;
    }
    for _ in 0..MERGE_RETRY_BOUND {
        let snapshot = match store.context_get(call_id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(call_id, error = %err, "context read failed; dropping update");
                return;
            }
        };
        let mut merged = snapshot.values;
        for (key, value) in updates.clone() {
            merged.insert(key, value);
        }
        match store.context_put_if_version(call_id, snapshot.version, merged, ttl_secs) {
            Ok(true) => return,
            Ok(false) => continue, // conflicting writer won; re-read and retry
            Err(err) => {
                warn!(call_id, error = %err, "context write failed; dropping update");
                return;
            }
        }
    }
    warn!(call_id, "context merge retries exhausted; last writer wins");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_context_shallow() {
        let store = MemoryStore::new();

        let mut first = ContextMap::new();
        first.insert("a".into(), json!(1));
        merge_context(&store, "c-1", first, 60);

        let mut second = ContextMap::new();
        second.insert("b".into(), json!(2));
        merge_context(&store, "c-1", second, 60);

        let snapshot = store.context_get("c-1").unwrap();
        assert_eq!(snapshot.values.get("a"), Some(&json!(1)));
        assert_eq!(snapshot.values.get("b"), Some(&json!(2)));
        assert_eq!(snapshot.version, 2);
    }

    #[test]
    fn test_merge_context_overwrites_named_fields() {
        let store = MemoryStore::new();

        let mut first = ContextMap::new();
        first.insert("load_level".into(), json!("NORMAL"));
        merge_context(&store, "c-2", first, 60);

        let mut second = ContextMap::new();
        second.insert("load_level".into(), json!("OVERLOAD"));
        merge_context(&store, "c-2", second, 60);

        let snapshot = store.context_get("c-2").unwrap();
        assert_eq!(snapshot.values.get("load_level"), Some(&json!("OVERLOAD")));
    }

    #[test]
    fn test_stale_version_write_rejected() {
        let store = MemoryStore::new();

        let mut values = ContextMap::new();
        values.insert("k".into(), json!("v1"));
        assert!(store.context_put_if_version("c-3", 0, values, 60).unwrap());

        // A writer holding the pre-write snapshot loses.
        let mut stale = ContextMap::new();
        stale.insert("k".into(), json!("v2"));
        assert!(!store.context_put_if_version("c-3", 0, stale, 60).unwrap());

        let snapshot = store.context_get("c-3").unwrap();
        assert_eq!(snapshot.values.get("k"), Some(&json!("v1")));
    }

    #[test]
    fn test_empty_update_is_noop() {
        let store = MemoryStore::new();
        merge_context(&store, "c-4", ContextMap::new(), 60);
        assert_eq!(store.context_get("c-4").unwrap().version, 0);
    }
}
