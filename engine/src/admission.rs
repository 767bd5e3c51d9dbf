//! Admission control over a shared active-call counter.
//!
//! Optimistic semaphore: increment first, then roll back if the limit was
//! exceeded. Two concurrent acquisitions racing for the last slot can both
//! observe a count over the limit and both roll back; the limit is never
//! exceeded, at the cost of occasionally admitting fewer than max.

use std::sync::Arc;

use crate::store::{keys, EngineStore, StoreResult};

/// Gate on the number of concurrently active calls.
pub struct AdmissionController {
    store: Arc<dyn EngineStore>,
    max_concurrency: i64,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn EngineStore>, max_concurrency: i64) -> Self {
        Self {
            store,
            max_concurrency,
        }
    }

    /// Try to admit a new call. Returns false when the system is at
    /// capacity.
    pub fn try_acquire(&self) -> StoreResult<bool> {
        let count = self.store.counter_incr(keys::ACTIVE_CALLS)?;
        if count > self.max_concurrency {
            self.store.counter_decr(keys::ACTIVE_CALLS)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Release a previously admitted call's slot.
    pub fn release(&self) -> StoreResult<()> {
        self.store.counter_decr(keys::ACTIVE_CALLS)?;
        Ok(())
    }

    /// Current in-flight count, clamped at zero for display.
    pub fn active_calls(&self) -> StoreResult<i64> {
        Ok(self.store.counter_get(keys::ACTIVE_CALLS)?.max(0))
    }

    /// The configured limit.
    pub fn max_concurrency(&self) -> i64 {
        self.max_concurrency
    }
}
