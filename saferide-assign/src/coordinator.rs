use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use saferide_booking::model::BookingStatus;
use saferide_booking::store::BookingStore;
use saferide_core::identity::{require_role, Actor, IdentityProvider, Role};
use saferide_core::notify::NotificationDispatcher;
use saferide_core::EngineError;
use saferide_shared::events::NotificationMessage;
use saferide_shared::ShiftSlot;

use crate::model::{Assignment, AssignmentStatus, ShiftOccupancy};
use crate::store::AssignmentStore;

/// Enforces the shift-assignment invariants while admins and drivers act
/// concurrently.
///
/// Occupancy is recomputed from the accepted set under the booking's
/// assignment lock at both creation and acceptance time. Two drivers may
/// legally hold `pending` claims on the same slot; only the first acceptance
/// wins. Booking status changes are applied afterwards as separate
/// conditional updates — the two stores are never locked nested, and both
/// interleavings converge.
pub struct AssignmentCoordinator {
    assignments: Arc<AssignmentStore>,
    bookings: Arc<BookingStore>,
    directory: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl AssignmentCoordinator {
    pub fn new(
        assignments: Arc<AssignmentStore>,
        bookings: Arc<BookingStore>,
        directory: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            assignments,
            bookings,
            directory,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<AssignmentStore> {
        &self.assignments
    }

    /// Admin assigns a driver to a slot. The assignment starts `pending`;
    /// the booking is not touched until the driver actually commits.
    pub async fn assign_driver(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        driver_id: Uuid,
        shift: ShiftSlot,
        now: DateTime<Utc>,
    ) -> Result<Assignment, EngineError> {
        require_role(actor, Role::Admin)?;

        let booking = self
            .bookings
            .get(booking_id)
            .ok_or_else(|| EngineError::not_found("booking not found"))?;
        if !matches!(booking.status, BookingStatus::Paid | BookingStatus::Assigned) {
            return Err(EngineError::conflict(
                "booking must be paid before a driver can be assigned",
            ));
        }

        let driver = self
            .directory
            .driver(driver_id)
            .await?
            .ok_or_else(|| EngineError::not_found("driver not found"))?;
        if !driver.approved {
            return Err(EngineError::conflict("driver is not approved"));
        }

        let admin_id = actor.id;
        let assignment = self.assignments.with_booking(booking_id, |set| {
            if set
                .iter()
                .any(|a| a.driver_id == driver_id && a.shift == shift)
            {
                return Err(EngineError::conflict(
                    "driver already has this assignment on the booking",
                ));
            }
            if set
                .iter()
                .any(|a| a.driver_id == driver_id && a.status.is_live())
            {
                return Err(EngineError::conflict(
                    "driver already holds an assignment on this booking",
                ));
            }

            let occupancy = ShiftOccupancy::of(
                set.iter().filter(|a| a.status == AssignmentStatus::Accepted),
            );
            if let Some(reason) = occupancy.blocks(shift) {
                return Err(EngineError::conflict(reason));
            }

            let assignment = Assignment::new(booking_id, driver_id, admin_id, shift, now);
            set.push(assignment.clone());
            Ok(assignment)
        })?;

        self.notify_driver(
            driver_id,
            NotificationMessage::new(
                "New ride assignment",
                "You have been assigned a ride. Accept or reject it in the app.",
            )
            .with_booking(booking_id),
        )
        .await;

        Ok(assignment)
    }

    /// Driver commits to a pending assignment. Occupancy is re-validated at
    /// accept time: of several pending claims on one slot, only the first
    /// acceptance succeeds, the rest get a conflict.
    pub async fn driver_accept(
        &self,
        actor: &Actor,
        assignment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Assignment, EngineError> {
        require_role(actor, Role::Driver)?;

        let booking_id = self
            .assignments
            .booking_of(assignment_id)
            .ok_or_else(|| EngineError::not_found("assignment not found"))?;

        let driver_id = actor.id;
        let accepted = self.assignments.with_booking(booking_id, |set| {
            let position = set
                .iter()
                .position(|a| a.id == assignment_id)
                .ok_or_else(|| EngineError::not_found("assignment not found"))?;
            if set[position].driver_id != driver_id {
                return Err(EngineError::Authorization(
                    "assignment belongs to another driver".to_string(),
                ));
            }
            if set[position].status != AssignmentStatus::Pending {
                return Err(EngineError::conflict("assignment is not pending"));
            }

            let occupancy = ShiftOccupancy::of(
                set.iter().filter(|a| a.status == AssignmentStatus::Accepted),
            );
            if let Some(reason) = occupancy.blocks(set[position].shift) {
                return Err(EngineError::conflict(reason));
            }

            set[position].status = AssignmentStatus::Accepted;
            set[position].updated_at = now;
            Ok(set[position].clone())
        })?;

        // A driver has committed: promote the booking if it was still paid.
        let promote = self.bookings.update_with(booking_id, |b| {
            if b.status == BookingStatus::Paid {
                b.status = BookingStatus::Assigned;
                b.updated_at = now;
            }
            Ok(b.clone())
        });
        let guardian_id = match promote {
            Ok(b) => Some(b.guardian_id),
            Err(err) => {
                tracing::warn!(booking_id = %booking_id, error = %err, "booking promotion skipped");
                None
            }
        };

        if let Err(err) = self.directory.set_driver_engaged(driver_id, true).await {
            tracing::warn!(driver_id = %driver_id, error = %err, "could not flag driver engaged");
        }
        if let Some(guardian_id) = guardian_id {
            self.notify_guardian(
                guardian_id,
                NotificationMessage::new(
                    "Driver confirmed",
                    "A driver has accepted your booking.",
                )
                .with_booking(booking_id),
            )
            .await;
        }

        Ok(accepted)
    }

    /// Driver declines a pending assignment. Accepted assignments cannot be
    /// rejected; only an admin unassign removes a committed driver.
    pub async fn driver_reject(
        &self,
        actor: &Actor,
        assignment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Assignment, EngineError> {
        require_role(actor, Role::Driver)?;

        let booking_id = self
            .assignments
            .booking_of(assignment_id)
            .ok_or_else(|| EngineError::not_found("assignment not found"))?;

        let driver_id = actor.id;
        let (rejected, any_accepted) = self.assignments.with_booking(booking_id, |set| {
            let position = set
                .iter()
                .position(|a| a.id == assignment_id)
                .ok_or_else(|| EngineError::not_found("assignment not found"))?;
            if set[position].driver_id != driver_id {
                return Err(EngineError::Authorization(
                    "assignment belongs to another driver".to_string(),
                ));
            }
            if set[position].status != AssignmentStatus::Pending {
                return Err(EngineError::conflict("assignment is not pending"));
            }

            set[position].status = AssignmentStatus::Rejected;
            set[position].updated_at = now;
            let any_accepted = set.iter().any(|a| a.status == AssignmentStatus::Accepted);
            Ok((set[position].clone(), any_accepted))
        })?;

        if !any_accepted {
            self.demote_if_unassigned(booking_id, now);
        }

        self.notify_admins(
            NotificationMessage::new(
                "Assignment rejected",
                "A driver rejected an assignment. Assign a replacement.",
            )
            .with_booking(booking_id),
        )
        .await;

        Ok(rejected)
    }

    /// Admin removes a driver from a booking entirely. Reconciles the
    /// booking status and the driver's engaged flag.
    pub async fn admin_unassign(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        driver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        require_role(actor, Role::Admin)?;

        let any_accepted_left = self.assignments.with_booking(booking_id, |set| {
            let before = set.len();
            set.retain(|a| a.driver_id != driver_id);
            if set.len() == before {
                return Err(EngineError::not_found(
                    "driver has no assignment on this booking",
                ));
            }
            Ok(set.iter().any(|a| a.status == AssignmentStatus::Accepted))
        })?;

        if !any_accepted_left {
            self.demote_if_unassigned(booking_id, now);
        }

        if self.assignments.accepted_count_for_driver(driver_id) == 0 {
            if let Err(err) = self.directory.set_driver_engaged(driver_id, false).await {
                tracing::warn!(driver_id = %driver_id, error = %err, "could not clear driver engaged flag");
            }
        }

        Ok(())
    }

    /// Conditional `assigned -> paid` so the booking re-enters the
    /// assignable pool. No-op when another accepted assignment kept the
    /// booking covered or a concurrent acceptance already re-promoted it.
    fn demote_if_unassigned(&self, booking_id: Uuid, now: DateTime<Utc>) {
        let result = self.bookings.update_with(booking_id, |b| {
            if b.status == BookingStatus::Assigned {
                b.status = BookingStatus::Paid;
                b.updated_at = now;
            }
            Ok(())
        });
        if let Err(err) = result {
            tracing::warn!(booking_id = %booking_id, error = %err, "booking demotion skipped");
        }
    }

    async fn notify_driver(&self, driver_id: Uuid, message: NotificationMessage) {
        match self.directory.driver_tokens(driver_id).await {
            Ok(tokens) if !tokens.is_empty() => {
                if let Err(err) = self.notifier.notify(&tokens, &message).await {
                    tracing::warn!(driver_id = %driver_id, error = %err, "driver notification failed");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(driver_id = %driver_id, error = %err, "could not load driver tokens"),
        }
    }

    async fn notify_guardian(&self, guardian_id: Uuid, message: NotificationMessage) {
        match self.directory.guardian_tokens(guardian_id).await {
            Ok(tokens) if !tokens.is_empty() => {
                if let Err(err) = self.notifier.notify(&tokens, &message).await {
                    tracing::warn!(guardian_id = %guardian_id, error = %err, "guardian notification failed");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(guardian_id = %guardian_id, error = %err, "could not load guardian tokens"),
        }
    }

    async fn notify_admins(&self, message: NotificationMessage) {
        match self.directory.admin_tokens().await {
            Ok(tokens) if !tokens.is_empty() => {
                if let Err(err) = self.notifier.notify(&tokens, &message).await {
                    tracing::warn!(error = %err, "admin notification failed");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "could not load admin tokens"),
        }
    }
}
