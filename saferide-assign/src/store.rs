use dashmap::DashMap;
use uuid::Uuid;

use saferide_core::EngineError;

use crate::model::{Assignment, AssignmentStatus};

/// Concurrent assignment storage, keyed by booking.
///
/// Every assignment of a booking lives under one entry, so creation and
/// acceptance both re-check shift occupancy under the same lock: two
/// operations can never both observe "slot free". A secondary id index
/// resolves driver-facing lookups back to the owning booking.
#[derive(Default)]
pub struct AssignmentStore {
    by_booking: DashMap<Uuid, Vec<Assignment>>,
    booking_of: DashMap<Uuid, Uuid>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a draft of the booking's assignment set under its
    /// entry lock. On error nothing is written; on success the draft
    /// replaces the set and the id index is synchronized.
    pub fn with_booking<T>(
        &self,
        booking_id: Uuid,
        f: impl FnOnce(&mut Vec<Assignment>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut entry = self.by_booking.entry(booking_id).or_default();
        let mut draft = entry.clone();
        let out = f(&mut draft)?;

        for removed in entry
            .iter()
            .filter(|old| !draft.iter().any(|a| a.id == old.id))
        {
            self.booking_of.remove(&removed.id);
        }
        for assignment in &draft {
            self.booking_of.insert(assignment.id, booking_id);
        }
        *entry = draft;
        Ok(out)
    }

    /// Booking that owns an assignment id.
    pub fn booking_of(&self, assignment_id: Uuid) -> Option<Uuid> {
        self.booking_of.get(&assignment_id).map(|b| *b)
    }

    pub fn find(&self, assignment_id: Uuid) -> Option<Assignment> {
        let booking_id = self.booking_of(assignment_id)?;
        self.by_booking
            .get(&booking_id)?
            .iter()
            .find(|a| a.id == assignment_id)
            .cloned()
    }

    pub fn for_booking(&self, booking_id: Uuid) -> Vec<Assignment> {
        self.by_booking
            .get(&booking_id)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    pub fn for_driver(&self, driver_id: Uuid) -> Vec<Assignment> {
        let mut out: Vec<Assignment> = self
            .by_booking
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|a| a.driver_id == driver_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Accepted assignments the driver holds across all bookings.
    pub fn accepted_count_for_driver(&self, driver_id: Uuid) -> usize {
        self.by_booking
            .iter()
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|a| {
                        a.driver_id == driver_id && a.status == AssignmentStatus::Accepted
                    })
                    .count()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use saferide_shared::ShiftSlot;

    #[test]
    fn index_follows_inserts_and_removals() {
        let store = AssignmentStore::new();
        let booking_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();
        let now = Utc::now();

        let assignment = store
            .with_booking(booking_id, |set| {
                let a = Assignment::new(booking_id, driver_id, Uuid::new_v4(), ShiftSlot::Morning, now);
                set.push(a.clone());
                Ok(a)
            })
            .unwrap();

        assert_eq!(store.booking_of(assignment.id), Some(booking_id));
        assert_eq!(store.find(assignment.id).unwrap().driver_id, driver_id);
        assert_eq!(store.for_driver(driver_id).len(), 1);

        store
            .with_booking(booking_id, |set| {
                set.retain(|a| a.id != assignment.id);
                Ok(())
            })
            .unwrap();
        assert_eq!(store.booking_of(assignment.id), None);
        assert!(store.find(assignment.id).is_none());
    }

    #[test]
    fn failed_mutation_leaves_the_set_untouched() {
        let store = AssignmentStore::new();
        let booking_id = Uuid::new_v4();
        let now = Utc::now();

        let result: Result<(), EngineError> = store.with_booking(booking_id, |set| {
            set.push(Assignment::new(
                booking_id,
                Uuid::new_v4(),
                Uuid::new_v4(),
                ShiftSlot::WholeRide,
                now,
            ));
            Err(EngineError::conflict("abandon"))
        });
        assert!(result.is_err());
        assert!(store.for_booking(booking_id).is_empty());
    }
}
