use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Durable set of already-processed provider event ids.
///
/// The gateway delivers at-least-once; `admit` is the atomic
/// insert-if-absent consulted before any webhook side effect. An existing
/// record means the event's effects were already applied (or intentionally
/// consumed) and must not be reapplied.
#[derive(Default)]
pub struct IdempotencyLedger {
    seen: DashMap<String, DateTime<Utc>>,
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true exactly once per distinct event id.
    pub fn admit(&self, event_id: &str, now: DateTime<Utc>) -> bool {
        match self.seen.entry(event_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.seen.contains_key(event_id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
