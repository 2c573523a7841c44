use std::sync::Arc;

use chrono::{DateTime, Utc};

use saferide_core::identity::IdentityProvider;
use saferide_core::notify::NotificationDispatcher;
use saferide_core::EngineError;
use saferide_shared::events::NotificationMessage;

use crate::model::BookingStatus;
use crate::store::BookingStore;
use crate::window::{days_remaining, REMINDER_LEAD_DAYS};

/// Outcome of one sweep over the paid bookings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub reminders_sent: usize,
    pub expired: usize,
    pub errors: usize,
}

/// Periodic pass that issues the once-only expiry reminder and moves
/// bookings past their paid window into `expired`.
///
/// Both writes are conditional updates that re-read status and window under
/// the record lock, so a renewal webhook that lands mid-sweep is never
/// clobbered.
pub struct ExpirationSweeper {
    store: Arc<BookingStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    directory: Arc<dyn IdentityProvider>,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<BookingStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        directory: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            notifier,
            directory,
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for booking in self.store.list_by_status(BookingStatus::Paid) {
            let Some(end) = booking.service_end_date else {
                continue;
            };
            report.examined += 1;
            let days_left = days_remaining(end, now);

            if days_left > 0 && days_left <= REMINDER_LEAD_DAYS && !booking.reminder_sent {
                match self.send_reminder(booking.id, booking.guardian_id, days_left, now).await {
                    Ok(true) => report.reminders_sent += 1,
                    Ok(false) => {}
                    Err(err) => {
                        report.errors += 1;
                        tracing::warn!(booking_id = %booking.id, error = %err, "reminder pass failed");
                    }
                }
            }

            if days_left <= 0 {
                match self.expire(booking.id, now) {
                    Ok(true) => {
                        report.expired += 1;
                        tracing::info!(booking_id = %booking.id, "booking expired");
                    }
                    Ok(false) => {}
                    Err(err) => {
                        report.errors += 1;
                        tracing::warn!(booking_id = %booking.id, error = %err, "expiry pass failed");
                    }
                }
            }
        }

        report
    }

    /// Claim the reminder flag with a compare-and-set; only the winning
    /// writer dispatches. A delivery failure rolls the flag back so the next
    /// sweep retries, bounded by the window expiring regardless.
    async fn send_reminder(
        &self,
        booking_id: uuid::Uuid,
        guardian_id: uuid::Uuid,
        days_left: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let claimed = self.store.update_with(booking_id, |b| {
            if b.status != BookingStatus::Paid || b.reminder_sent {
                return Ok(false);
            }
            let still_inside_lead = b
                .service_end_date
                .map(|end| {
                    let d = days_remaining(end, now);
                    d > 0 && d <= REMINDER_LEAD_DAYS
                })
                .unwrap_or(false);
            if !still_inside_lead {
                return Ok(false);
            }
            b.reminder_sent = true;
            b.updated_at = now;
            Ok(true)
        })?;

        if !claimed {
            return Ok(false);
        }

        let mut tokens = self.directory.guardian_tokens(guardian_id).await?;
        tokens.extend(self.directory.admin_tokens().await?);
        let message = NotificationMessage::new(
            "Service expiration reminder",
            format!("Booking expires in {days_left} day(s). Renew to keep rides scheduled."),
        )
        .with_booking(booking_id);

        if let Err(err) = self.notifier.notify(&tokens, &message).await {
            tracing::warn!(booking_id = %booking_id, error = %err, "reminder delivery failed, releasing flag");
            self.store.update_with(booking_id, |b| {
                if b.reminder_sent {
                    b.reminder_sent = false;
                }
                Ok(())
            })?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Conditional `paid -> expired`. Re-reads the window under the lock so
    /// a renewal that already extended it (or advanced the status) wins.
    fn expire(&self, booking_id: uuid::Uuid, now: DateTime<Utc>) -> Result<bool, EngineError> {
        self.store.update_with(booking_id, |b| {
            if b.status != BookingStatus::Paid {
                return Ok(false);
            }
            let still_lapsed = b
                .service_end_date
                .map(|end| days_remaining(end, now) <= 0)
                .unwrap_or(false);
            if !still_lapsed {
                return Ok(false);
            }
            b.status = BookingStatus::Expired;
            b.updated_at = now;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fixtures, Booking};
    use chrono::Duration;
    use saferide_core::identity::InMemoryDirectory;
    use saferide_core::notify::RecordingDispatcher;
    use saferide_shared::{ScheduleKind, TripShape};
    use uuid::Uuid;

    struct Harness {
        sweeper: ExpirationSweeper,
        store: Arc<BookingStore>,
        notifier: Arc<RecordingDispatcher>,
    }

    fn harness() -> Harness {
        let store = Arc::new(BookingStore::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.register_admin_tokens(vec!["admin-tok".to_string()]);
        let sweeper = ExpirationSweeper::new(
            Arc::clone(&store),
            notifier.clone(),
            directory,
        );
        Harness {
            sweeper,
            store,
            notifier,
        }
    }

    fn paid_booking(store: &BookingStore, end_in: Duration, now: DateTime<Utc>) -> Booking {
        let request = fixtures::request(TripShape::Return, ScheduleKind::Monthly, now.date_naive());
        let booking = Booking::new(request, Uuid::new_v4(), Uuid::new_v4(), now);
        let booking = store.insert_active(booking).unwrap();
        store
            .update_with(booking.id, |b| {
                b.status = BookingStatus::Paid;
                b.service_end_date = Some(now + end_in);
                Ok(b.clone())
            })
            .unwrap()
    }

    #[tokio::test]
    async fn reminder_fires_once_inside_the_lead_window() {
        let h = harness();
        let now = Utc::now();
        let booking = paid_booking(&h.store, Duration::days(2), now);

        let report = h.sweeper.run_once(now).await;
        assert_eq!(report.reminders_sent, 1);
        assert!(h.store.get(booking.id).unwrap().reminder_sent);

        // Second sweep is a no-op: the flag already won.
        let report = h.sweeper.run_once(now).await;
        assert_eq!(report.reminders_sent, 0);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_releases_the_flag_for_the_next_sweep() {
        let h = harness();
        let now = Utc::now();
        let booking = paid_booking(&h.store, Duration::days(2), now);

        h.notifier.fail_next();
        let report = h.sweeper.run_once(now).await;
        assert_eq!(report.reminders_sent, 0);
        assert!(!h.store.get(booking.id).unwrap().reminder_sent);

        let report = h.sweeper.run_once(now).await;
        assert_eq!(report.reminders_sent, 1);
        assert!(h.store.get(booking.id).unwrap().reminder_sent);
    }

    #[tokio::test]
    async fn lapsed_bookings_expire_with_a_conditional_write() {
        let h = harness();
        let now = Utc::now();
        let booking = paid_booking(&h.store, Duration::days(-1), now);

        let report = h.sweeper.run_once(now).await;
        assert_eq!(report.expired, 1);
        assert_eq!(
            h.store.get(booking.id).unwrap().status,
            BookingStatus::Expired
        );

        // Already expired, so the next sweep no longer sees it as paid.
        let report = h.sweeper.run_once(now).await;
        assert_eq!(report.expired, 0);
    }

    #[tokio::test]
    async fn renewal_that_extended_the_window_beats_the_sweep() {
        let h = harness();
        let now = Utc::now();
        let booking = paid_booking(&h.store, Duration::days(-1), now);

        // A renewal webhook lands between the sweeper's read and its
        // conditional write: the window re-check under the lock must keep
        // the booking paid.
        h.store
            .update_with(booking.id, |b| {
                b.service_end_date = Some(now + Duration::days(14));
                Ok(())
            })
            .unwrap();

        let report = h.sweeper.run_once(now).await;
        assert_eq!(report.expired, 0);
        assert_eq!(h.store.get(booking.id).unwrap().status, BookingStatus::Paid);
    }

    #[tokio::test]
    async fn one_bad_booking_does_not_stop_the_sweep() {
        let h = harness();
        let now = Utc::now();
        // No guardian tokens registered anywhere: reminder delivery still
        // succeeds with admin tokens only, so instead simulate failure.
        let _near = paid_booking(&h.store, Duration::days(1), now);
        let lapsed = paid_booking(&h.store, Duration::days(-3), now);

        h.notifier.fail_next();
        let report = h.sweeper.run_once(now).await;

        // The reminder failed and was released, the expiry still happened.
        assert_eq!(report.expired, 1);
        assert_eq!(
            h.store.get(lapsed.id).unwrap().status,
            BookingStatus::Expired
        );
    }
}
