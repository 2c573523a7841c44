use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One successful renewal reconciliation, kept for statements and support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub guardian_id: Uuid,
    pub child_id: Uuid,
    pub previous_end: DateTime<Utc>,
    pub new_start: DateTime<Utc>,
    pub new_end: DateTime<Utc>,
    pub payment_ref: String,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Append-only renewal ledger keyed by booking.
#[derive(Default)]
pub struct RenewalHistory {
    records: DashMap<Uuid, Vec<RenewalRecord>>,
}

impl RenewalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: RenewalRecord) {
        self.records
            .entry(entry.booking_id)
            .or_default()
            .push(entry);
    }

    pub fn for_booking(&self, booking_id: Uuid) -> Vec<RenewalRecord> {
        self.records
            .get(&booking_id)
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}
