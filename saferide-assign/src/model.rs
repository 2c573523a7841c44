use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use saferide_shared::ShiftSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

impl AssignmentStatus {
    /// Live assignments count against the one-driver-per-booking rule.
    pub fn is_live(self) -> bool {
        matches!(self, AssignmentStatus::Pending | AssignmentStatus::Accepted)
    }
}

/// A driver's claim on all or part of a booking's rides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub driver_id: Uuid,
    /// Admin who created the assignment.
    pub assigned_by: Uuid,
    pub shift: ShiftSlot,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(
        booking_id: Uuid,
        driver_id: Uuid,
        assigned_by: Uuid,
        shift: ShiftSlot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            driver_id,
            assigned_by,
            shift,
            status: AssignmentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Which slots the accepted assignments of a booking currently occupy.
///
/// Always derived from the live accepted set at the moment of a mutating
/// operation, never cached.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShiftOccupancy {
    pub morning_taken: bool,
    pub afternoon_taken: bool,
    pub whole_ride_taken: bool,
}

impl ShiftOccupancy {
    pub fn of<'a>(accepted: impl Iterator<Item = &'a Assignment>) -> Self {
        let mut occ = Self::default();
        for assignment in accepted {
            match assignment.shift {
                ShiftSlot::Morning => occ.morning_taken = true,
                ShiftSlot::Afternoon => occ.afternoon_taken = true,
                ShiftSlot::WholeRide => occ.whole_ride_taken = true,
            }
        }
        occ
    }

    /// Reason the requested slot cannot be taken, if any.
    pub fn blocks(&self, slot: ShiftSlot) -> Option<&'static str> {
        if self.whole_ride_taken {
            return Some("the whole ride is already taken");
        }
        match slot {
            ShiftSlot::WholeRide if self.morning_taken || self.afternoon_taken => {
                Some("a shift is already taken, assign the remaining shift instead")
            }
            ShiftSlot::Morning if self.morning_taken => Some("morning shift is already taken"),
            ShiftSlot::Afternoon if self.afternoon_taken => {
                Some("afternoon shift is already taken")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(shift: ShiftSlot) -> Assignment {
        let now = Utc::now();
        let mut a = Assignment::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), shift, now);
        a.status = AssignmentStatus::Accepted;
        a
    }

    #[test]
    fn whole_ride_blocks_everything() {
        let set = [accepted(ShiftSlot::WholeRide)];
        let occ = ShiftOccupancy::of(set.iter());
        assert!(occ.blocks(ShiftSlot::Morning).is_some());
        assert!(occ.blocks(ShiftSlot::Afternoon).is_some());
        assert!(occ.blocks(ShiftSlot::WholeRide).is_some());
    }

    #[test]
    fn a_taken_shift_blocks_itself_and_the_whole_ride() {
        let set = [accepted(ShiftSlot::Morning)];
        let occ = ShiftOccupancy::of(set.iter());
        assert!(occ.blocks(ShiftSlot::Morning).is_some());
        assert!(occ.blocks(ShiftSlot::WholeRide).is_some());
        assert!(occ.blocks(ShiftSlot::Afternoon).is_none());
    }

    #[test]
    fn pending_assignments_do_not_occupy() {
        let pending = Assignment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            ShiftSlot::WholeRide,
            Utc::now(),
        );
        // Caller filters to accepted; an empty accepted set blocks nothing.
        let occ = ShiftOccupancy::of(
            [pending]
                .iter()
                .filter(|a| a.status == AssignmentStatus::Accepted),
        );
        assert_eq!(occ, ShiftOccupancy::default());
        assert!(occ.blocks(ShiftSlot::WholeRide).is_none());
    }
}
