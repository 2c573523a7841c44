use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use saferide_core::EngineError;

use crate::model::{Booking, BookingStatus};

/// Concurrent booking storage.
///
/// All mutation goes through [`BookingStore::update_with`], which runs the
/// caller's check-then-write under the record's entry lock: whichever
/// transition arrives first wins, later arrivals observe the new state and
/// either no-op or return a conflict. The child index makes the
/// one-active-booking-per-child invariant atomic at insert time.
#[derive(Default)]
pub struct BookingStore {
    bookings: DashMap<Uuid, Booking>,
    active_by_child: DashMap<Uuid, Uuid>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh booking, enforcing that the child has no other active
    /// booking. The check and the index claim happen under the child's entry
    /// lock, so two concurrent creates for the same child cannot both pass.
    pub fn insert_active(&self, booking: Booking) -> Result<Booking, EngineError> {
        match self.active_by_child.entry(booking.child_id) {
            Entry::Occupied(mut slot) => {
                let blocking = self
                    .bookings
                    .get(slot.get())
                    .map(|b| b.status.is_active())
                    .unwrap_or(false);
                if blocking {
                    return Err(EngineError::conflict(
                        "an active booking already exists for this child",
                    ));
                }
                slot.insert(booking.id);
            }
            Entry::Vacant(slot) => {
                slot.insert(booking.id);
            }
        }
        self.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    pub fn get(&self, id: Uuid) -> Option<Booking> {
        self.bookings.get(&id).map(|b| b.clone())
    }

    /// Conditional update: `f` receives a draft of the current record and
    /// either proposes the changed record (by mutating the draft) or fails.
    /// On failure nothing is written. The whole read-check-write runs under
    /// the record's entry lock.
    pub fn update_with<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Booking) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let (out, child_id, release_child) = {
            let mut slot = self
                .bookings
                .get_mut(&id)
                .ok_or_else(|| EngineError::not_found("booking not found"))?;
            let mut draft = slot.clone();
            let out = f(&mut draft)?;
            let release_child = slot.status.is_active() && !draft.status.is_active();
            let child_id = draft.child_id;
            *slot = draft;
            (out, child_id, release_child)
        };
        // Index maintenance happens after the record lock is released so the
        // two maps are never locked nested in this direction.
        if release_child {
            self.active_by_child.remove_if(&child_id, |_, bid| *bid == id);
        }
        Ok(out)
    }

    pub fn list_by_guardian(&self, guardian_id: Uuid) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| b.guardian_id == guardian_id)
            .map(|b| b.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn list_by_child(&self, child_id: Uuid) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| b.child_id == child_id)
            .map(|b| b.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn list_by_status(&self, status: BookingStatus) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|b| b.status == status)
            .map(|b| b.clone())
            .collect()
    }

    pub fn list_all(&self) -> Vec<Booking> {
        let mut out: Vec<Booking> = self.bookings.iter().map(|b| b.clone()).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;
    use chrono::Utc;
    use saferide_shared::{ScheduleKind, TripShape};
    use std::sync::Arc;

    fn booking() -> Booking {
        let now = Utc::now();
        let request = fixtures::request(TripShape::Return, ScheduleKind::Monthly, now.date_naive());
        Booking::new(request, Uuid::new_v4(), Uuid::new_v4(), now)
    }

    #[test]
    fn second_active_booking_for_a_child_is_rejected() {
        let store = BookingStore::new();
        let first = booking();
        let child_id = first.child_id;
        store.insert_active(first.clone()).unwrap();

        let mut second = booking();
        second.child_id = child_id;
        assert!(matches!(
            store.insert_active(second.clone()),
            Err(EngineError::Conflict(_))
        ));

        // Terminal statuses release the slot.
        store
            .update_with(first.id, |b| {
                b.status = BookingStatus::Cancelled;
                Ok(())
            })
            .unwrap();
        store.insert_active(second).unwrap();
    }

    #[test]
    fn failed_update_leaves_the_record_untouched() {
        let store = BookingStore::new();
        let b = booking();
        store.insert_active(b.clone()).unwrap();

        let result: Result<(), EngineError> = store.update_with(b.id, |draft| {
            draft.status = BookingStatus::Paid;
            Err(EngineError::conflict("abandon"))
        });
        assert!(result.is_err());
        assert_eq!(store.get(b.id).unwrap().status, BookingStatus::Booked);
    }

    #[test]
    fn concurrent_conditional_transitions_have_a_single_winner() {
        let store = Arc::new(BookingStore::new());
        let mut b = booking();
        b.status = BookingStatus::Paid;
        store.insert_active(b.clone()).unwrap();

        let mut handles = Vec::new();
        for target in [BookingStatus::Expired, BookingStatus::Cancelled] {
            let store = Arc::clone(&store);
            let id = b.id;
            handles.push(std::thread::spawn(move || {
                store.update_with(id, |draft| {
                    if draft.status != BookingStatus::Paid {
                        return Err(EngineError::conflict("stale status"));
                    }
                    draft.status = target;
                    Ok(())
                })
            }));
        }

        let outcomes: Vec<bool> = handles
            .into_iter()
            .map(|h| h.join().unwrap().is_ok())
            .collect();
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert_ne!(store.get(b.id).unwrap().status, BookingStatus::Paid);
    }
}
