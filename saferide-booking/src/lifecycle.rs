use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use saferide_core::identity::{require_role, Actor, IdentityProvider, Role};
use saferide_core::notify::NotificationDispatcher;
use saferide_core::payment::{
    CheckoutRequest, CheckoutSession, CorrelationMetadata, PaymentGateway,
};
use saferide_core::EngineError;
use saferide_rates::{resolve, RateProvider};
use saferide_shared::events::NotificationMessage;
use saferide_shared::PaymentPurpose;

use crate::history::{RenewalHistory, RenewalRecord};
use crate::model::{Booking, BookingRequest, BookingStatus, Cancellation};
use crate::store::BookingStore;
use crate::window::{days_remaining, period_days, stacked_window, RENEWAL_WINDOW_DAYS};

/// The only settlement currency the engine accepts.
pub const SETTLEMENT_CURRENCY: &str = "cad";

/// Drives the booking state machine for guardian and admin actions, plus the
/// reconciliation entry points invoked by the payment webhook path.
pub struct BookingService {
    store: Arc<BookingStore>,
    history: Arc<RenewalHistory>,
    rates: Arc<dyn RateProvider>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatcher>,
    directory: Arc<dyn IdentityProvider>,
}

impl BookingService {
    pub fn new(
        store: Arc<BookingStore>,
        history: Arc<RenewalHistory>,
        rates: Arc<dyn RateProvider>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        directory: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            history,
            rates,
            gateway,
            notifier,
            directory,
        }
    }

    pub fn store(&self) -> &Arc<BookingStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<RenewalHistory> {
        &self.history
    }

    /// Create a booking in `booked` for a child owned by the calling
    /// guardian. Admins are notified best-effort; a delivery failure never
    /// aborts the creation.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        child_id: Uuid,
        request: BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        require_role(actor, Role::Guardian)?;
        request.validate(now.date_naive())?;

        match self.directory.child_guardian(child_id).await? {
            Some(owner) if owner == actor.id => {}
            _ => {
                return Err(EngineError::Authorization(
                    "child does not belong to the calling guardian".to_string(),
                ))
            }
        }

        let booking = self
            .store
            .insert_active(Booking::new(request, actor.id, child_id, now))?;

        self.notify_admins(
            NotificationMessage::new(
                "New booking created",
                "A booking was created and is awaiting payment.",
            )
            .with_booking(booking.id),
        )
        .await;

        Ok(booking)
    }

    /// Open a checkout session for a first (or retried) payment. The booking
    /// stays in its current status; only a confirmed webhook advances it.
    pub async fn start_checkout(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        currency: &str,
    ) -> Result<CheckoutSession, EngineError> {
        require_role(actor, Role::Guardian)?;
        let booking = self.owned_booking(actor, booking_id)?;

        if currency != SETTLEMENT_CURRENCY {
            return Err(EngineError::validation("only CAD currency is supported"));
        }
        if !matches!(
            booking.status,
            BookingStatus::Booked | BookingStatus::PaymentFailed
        ) {
            return Err(EngineError::conflict("booking is not eligible for payment"));
        }

        self.open_session(&booking, PaymentPurpose::New).await
    }

    /// Open a renewal checkout session. Only allowed close to (or past) the
    /// end of the paid window.
    pub async fn start_renewal(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession, EngineError> {
        require_role(actor, Role::Guardian)?;
        let booking = self.owned_booking(actor, booking_id)?;

        if currency != SETTLEMENT_CURRENCY {
            return Err(EngineError::validation("only CAD currency is supported"));
        }
        if !matches!(booking.status, BookingStatus::Paid | BookingStatus::Expired) {
            return Err(EngineError::conflict("booking is not eligible for renewal"));
        }
        let end = booking
            .service_end_date
            .ok_or_else(|| EngineError::validation("booking has no service end date"))?;
        if days_remaining(end, now) > RENEWAL_WINDOW_DAYS {
            return Err(EngineError::Validation(format!(
                "renewal is only allowed within {RENEWAL_WINDOW_DAYS} days of expiration"
            )));
        }

        self.open_session(&booking, PaymentPurpose::Renewal).await
    }

    /// Admin-only direct status set, used for manual correction. Cancelling
    /// records the cancellation metadata.
    pub async fn override_status(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        require_role(actor, Role::Admin)?;
        self.store.update_with(booking_id, |b| {
            b.status = status;
            if status == BookingStatus::Cancelled {
                b.cancellation = Some(Cancellation {
                    reason: reason.clone(),
                    at: now,
                });
            }
            b.updated_at = now;
            Ok(b.clone())
        })
    }

    /// Apply a verified successful payment: conditional transition to
    /// `paid`, stacked service window, reminder flag reset, and a history
    /// entry for renewals. Conflicts mean the event was stale (the booking
    /// moved on) and nothing is written.
    pub fn apply_payment_success(
        &self,
        booking_id: Uuid,
        purpose: PaymentPurpose,
        payment_ref: &str,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let (booking, previous_end, new_start, new_end) =
            self.store.update_with(booking_id, |b| {
                let allowed: &[BookingStatus] = match purpose {
                    PaymentPurpose::New => &[BookingStatus::Booked, BookingStatus::PaymentFailed],
                    PaymentPurpose::Renewal => &[BookingStatus::Paid, BookingStatus::Expired],
                };
                if !allowed.contains(&b.status) {
                    return Err(EngineError::Conflict(format!(
                        "payment event arrived for a booking in {:?}",
                        b.status
                    )));
                }

                let period = period_days(b.schedule, b.number_of_days)?;
                let previous_end = b.service_end_date;
                let (start, end) = stacked_window(previous_end, now, period);

                b.status = BookingStatus::Paid;
                b.service_end_date = Some(end);
                b.reminder_sent = false;
                b.updated_at = now;
                Ok((b.clone(), previous_end, start, end))
            })?;

        if purpose == PaymentPurpose::Renewal {
            self.history.record(RenewalRecord {
                id: Uuid::new_v4(),
                booking_id,
                guardian_id: booking.guardian_id,
                child_id: booking.child_id,
                previous_end: previous_end.unwrap_or(now),
                new_start,
                new_end,
                payment_ref: payment_ref.to_string(),
                amount_cents,
                created_at: now,
            });
        }

        Ok(booking)
    }

    /// Apply a failed or abandoned payment. New purchases drop to
    /// `payment_failed`; renewals leave the booking untouched because it was
    /// already `paid` or `expired`.
    pub fn apply_payment_failure(
        &self,
        booking_id: Uuid,
        purpose: PaymentPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, EngineError> {
        if purpose == PaymentPurpose::Renewal {
            return Ok(None);
        }
        let booking = self.store.update_with(booking_id, |b| {
            if !matches!(
                b.status,
                BookingStatus::Booked | BookingStatus::PaymentFailed
            ) {
                return Err(EngineError::Conflict(format!(
                    "failure event arrived for a booking in {:?}",
                    b.status
                )));
            }
            b.status = BookingStatus::PaymentFailed;
            b.updated_at = now;
            Ok(b.clone())
        })?;
        Ok(Some(booking))
    }

    /// Amount for the booking's current attributes against a fresh rate
    /// table snapshot.
    pub async fn price(&self, booking: &Booking) -> Result<i64, EngineError> {
        let table = self.rates.current().await?;
        resolve(
            &table,
            booking.category,
            booking.schedule,
            booking.trip_shape,
            booking.number_of_days,
        )
    }

    async fn open_session(
        &self,
        booking: &Booking,
        purpose: PaymentPurpose,
    ) -> Result<CheckoutSession, EngineError> {
        let amount_cents = self.price(booking).await?;
        let description = match purpose {
            PaymentPurpose::New => format!("Ride booking ({:?} schedule)", booking.schedule),
            PaymentPurpose::Renewal => format!("Booking renewal ({:?} schedule)", booking.schedule),
        };
        self.gateway
            .create_checkout_session(CheckoutRequest {
                amount_cents,
                currency: SETTLEMENT_CURRENCY.to_string(),
                description,
                metadata: CorrelationMetadata {
                    booking_id: booking.id,
                    guardian_id: booking.guardian_id,
                    purpose,
                },
            })
            .await
    }

    fn owned_booking(&self, actor: &Actor, booking_id: Uuid) -> Result<Booking, EngineError> {
        let booking = self
            .store
            .get(booking_id)
            .ok_or_else(|| EngineError::not_found("booking not found"))?;
        if booking.guardian_id != actor.id {
            return Err(EngineError::Authorization(
                "booking does not belong to the calling guardian".to_string(),
            ));
        }
        Ok(booking)
    }

    async fn notify_admins(&self, message: NotificationMessage) {
        let tokens = match self.directory.admin_tokens().await {
            Ok(tokens) if !tokens.is_empty() => tokens,
            Ok(_) => return,
            Err(err) => {
                tracing::warn!(error = %err, "could not load admin tokens");
                return;
            }
        };
        if let Err(err) = self.notifier.notify(&tokens, &message).await {
            tracing::warn!(error = %err, "admin notification failed");
        }
    }
}
