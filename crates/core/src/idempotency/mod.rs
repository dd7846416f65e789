use std::collections::HashMap;
use std::sync::Arc;

use chargegate_types::charges::ChargeResponse;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

/// Per-key slot holding the response produced by the first request bearing
/// the key. `None` means the first request is still in flight (or failed and
/// left the slot open for a retry).
pub type Slot = Arc<AsyncMutex<Option<ChargeResponse>>>;

/// In-process idempotency cache.
///
/// The outer map lock makes `slot()` an atomic get-or-insert, so under N
/// concurrent requests with the same unused key every caller receives the
/// same slot. The slot's async mutex is the per-key critical section: exactly
/// one caller finds it empty and processes the charge while the others wait,
/// then replay the cached response. Entries are never evicted; keys live for
/// the process lifetime.
#[derive(Default)]
pub struct IdempotencyCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the slot for `key`. The map lock is held only for the
    /// lookup itself, never across request processing.
    pub fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock();
        slots.entry(key.to_string()).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
