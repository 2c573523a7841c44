use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use saferide_booking::model::Booking;
use saferide_booking::store::BookingStore;
use saferide_booking::BookingService;
use saferide_core::identity::IdentityProvider;
use saferide_core::notify::NotificationDispatcher;
use saferide_core::EngineError;
use saferide_rates::{resolve, RateProvider};
use saferide_shared::events::NotificationMessage;

use crate::event::{ProviderEvent, ProviderEventKind};
use crate::ledger::IdempotencyLedger;
use crate::signature;

/// Transport-level acknowledgment for a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAck {
    /// Admitted and handed to business processing.
    Processed,
    /// Event id already in the ledger; redelivery acknowledged, no effects.
    Duplicate,
    /// Event type this engine does not consume.
    Ignored,
}

/// Applies provider payment events to booking state exactly once.
///
/// Order is fixed: signature verification (no side effects on failure),
/// idempotency admission, acknowledgment, business effect. Failures after
/// admission are logged and never surface as transport errors, so the
/// gateway does not redeliver for business-side problems.
pub struct PaymentReconciler {
    secret: String,
    tolerance_seconds: i64,
    ledger: Arc<IdempotencyLedger>,
    bookings: Arc<BookingStore>,
    service: Arc<BookingService>,
    rates: Arc<dyn RateProvider>,
    notifier: Arc<dyn NotificationDispatcher>,
    directory: Arc<dyn IdentityProvider>,
}

impl PaymentReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        secret: impl Into<String>,
        tolerance_seconds: i64,
        ledger: Arc<IdempotencyLedger>,
        bookings: Arc<BookingStore>,
        service: Arc<BookingService>,
        rates: Arc<dyn RateProvider>,
        notifier: Arc<dyn NotificationDispatcher>,
        directory: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds,
            ledger,
            bookings,
            service,
            rates,
            notifier,
            directory,
        }
    }

    pub fn ledger(&self) -> &Arc<IdempotencyLedger> {
        &self.ledger
    }

    /// Handle one raw delivery. Errors returned here mean the delivery was
    /// rejected before admission (bad signature, unparseable payload) and
    /// the gateway should retry; everything after admission acknowledges.
    pub async fn handle_event(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, EngineError> {
        signature::verify(
            &self.secret,
            signature_header,
            payload,
            self.tolerance_seconds,
            now,
        )?;

        let event: ProviderEvent = serde_json::from_slice(payload)
            .map_err(|err| EngineError::Validation(format!("unparseable event payload: {err}")))?;

        if event.kind == ProviderEventKind::Other {
            tracing::debug!(event_id = %event.id, "ignoring unhandled event type");
            return Ok(WebhookAck::Ignored);
        }

        if !self.ledger.admit(&event.id, now) {
            tracing::info!(event_id = %event.id, "duplicate delivery acknowledged");
            return Ok(WebhookAck::Duplicate);
        }

        // Admitted: the event is consumed no matter what happens below.
        if let Err(err) = self.apply(&event, now).await {
            match err {
                EngineError::AmountMismatch { .. } => {
                    tracing::error!(
                        event_id = %event.id,
                        booking_id = %event.data.object.metadata.booking_id,
                        error = %err,
                        "webhook amount does not match computed amount, booking left untouched"
                    );
                }
                _ => {
                    tracing::warn!(
                        event_id = %event.id,
                        error = %err,
                        "webhook business effect failed after acknowledgment"
                    );
                }
            }
        }

        Ok(WebhookAck::Processed)
    }

    async fn apply(&self, event: &ProviderEvent, now: DateTime<Utc>) -> Result<(), EngineError> {
        let object = &event.data.object;
        let meta = &object.metadata;

        match event.kind {
            ProviderEventKind::PaymentSucceeded => {
                let booking = self
                    .bookings
                    .get(meta.booking_id)
                    .ok_or_else(|| EngineError::not_found("booking referenced by event"))?;

                // Amount integrity: recompute with the booking's current
                // attributes and a fresh rate snapshot. A mismatch is a
                // fraud/misconfiguration signal, never a paid transition.
                let table = self.rates.current().await?;
                let expected_cents = resolve(
                    &table,
                    booking.category,
                    booking.schedule,
                    booking.trip_shape,
                    booking.number_of_days,
                )?;
                if expected_cents != object.amount_cents {
                    return Err(EngineError::AmountMismatch {
                        expected_cents,
                        reported_cents: object.amount_cents,
                    });
                }

                let updated = self.service.apply_payment_success(
                    meta.booking_id,
                    meta.purpose,
                    &object.reference,
                    object.amount_cents,
                    now,
                )?;
                tracing::info!(
                    booking_id = %updated.id,
                    purpose = ?meta.purpose,
                    "payment reconciled, booking paid"
                );

                self.notify_outcome(
                    &updated,
                    NotificationMessage::new(
                        "Payment received",
                        "Your booking payment was received. Rides are being scheduled.",
                    )
                    .with_booking(updated.id),
                )
                .await;
            }
            ProviderEventKind::PaymentFailed | ProviderEventKind::SessionExpired => {
                if let Some(updated) =
                    self.service
                        .apply_payment_failure(meta.booking_id, meta.purpose, now)?
                {
                    tracing::info!(booking_id = %updated.id, "payment failure reconciled");
                    self.notify_outcome(
                        &updated,
                        NotificationMessage::new(
                            "Payment failed",
                            "Your booking payment did not complete. You can try again.",
                        )
                        .with_booking(updated.id),
                    )
                    .await;
                }
            }
            ProviderEventKind::Other => {}
        }

        Ok(())
    }

    /// Guardian and admins hear about both outcomes; delivery problems are
    /// logged and swallowed, never re-attempted via event redelivery.
    async fn notify_outcome(&self, booking: &Booking, message: NotificationMessage) {
        let mut tokens = match self.directory.guardian_tokens(booking.guardian_id).await {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::warn!(error = %err, "could not load guardian tokens");
                Vec::new()
            }
        };
        match self.directory.admin_tokens().await {
            Ok(admin_tokens) => tokens.extend(admin_tokens),
            Err(err) => tracing::warn!(error = %err, "could not load admin tokens"),
        }
        if tokens.is_empty() {
            return;
        }
        if let Err(err) = self.notifier.notify(&tokens, &message).await {
            tracing::warn!(booking_id = %booking.id, error = %err, "payment notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};
    use saferide_booking::history::RenewalHistory;
    use saferide_booking::model::{Booking, BookingRequest, BookingStatus, Leg};
    use saferide_core::identity::{Actor, InMemoryDirectory, Role};
    use saferide_core::notify::RecordingDispatcher;
    use saferide_core::payment::MockGateway;
    use saferide_rates::{CategoryRates, RateTable, StaticRates, TripRates};
    use saferide_shared::{
        PaymentPurpose, RideCategory, ScheduleKind, Stop, TripShape, Weekday,
    };
    use uuid::Uuid;

    const SECRET: &str = "whsec_test";

    struct Harness {
        reconciler: PaymentReconciler,
        store: Arc<BookingStore>,
        notifier: Arc<RecordingDispatcher>,
        guardian: Actor,
    }

    fn rates() -> RateTable {
        RateTable {
            in_house: CategoryRates {
                daily_cents: 4_000,
                bi_weekly: TripRates {
                    one_way_cents: 30_000,
                    return_cents: 52_000,
                },
                monthly: TripRates {
                    one_way_cents: 56_000,
                    return_cents: 98_000,
                },
            },
            freelance: CategoryRates {
                daily_cents: 3_500,
                bi_weekly: TripRates {
                    one_way_cents: 26_000,
                    return_cents: 46_000,
                },
                monthly: TripRates {
                    one_way_cents: 50_000,
                    return_cents: 88_000,
                },
            },
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(BookingStore::new());
        let history = Arc::new(RenewalHistory::new());
        let rates_provider: Arc<StaticRates> = Arc::new(StaticRates::new(rates()));
        let notifier = Arc::new(RecordingDispatcher::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let guardian = Actor::new(Uuid::new_v4(), Role::Guardian);
        directory.register_guardian(guardian.id, vec!["guardian-tok".to_string()]);
        directory.register_admin_tokens(vec!["admin-tok".to_string()]);

        let service = Arc::new(BookingService::new(
            Arc::clone(&store),
            history,
            rates_provider.clone(),
            Arc::new(MockGateway::new()),
            notifier.clone(),
            directory.clone(),
        ));

        let reconciler = PaymentReconciler::new(
            SECRET,
            300,
            Arc::new(IdempotencyLedger::new()),
            Arc::clone(&store),
            service,
            rates_provider,
            notifier.clone(),
            directory,
        );

        Harness {
            reconciler,
            store,
            notifier,
            guardian,
        }
    }

    fn booked(store: &BookingStore, guardian_id: Uuid, now: DateTime<Utc>) -> Booking {
        let request = BookingRequest {
            category: RideCategory::InHouse,
            trip_shape: TripShape::OneWay,
            schedule: ScheduleKind::Custom,
            number_of_days: Some(5),
            pickup_days: vec![Weekday::Monday],
            start_date: now.date_naive(),
            morning: Some(Leg {
                from: Stop::Home,
                to: Stop::School,
                time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            }),
            afternoon: None,
        };
        store
            .insert_active(Booking::new(request, guardian_id, Uuid::new_v4(), now))
            .unwrap()
    }

    fn success_payload(event_id: &str, booking: &Booking, amount: i64, purpose: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": "checkout.payment_succeeded",
            "data": {
                "object": {
                    "reference": "pay_1",
                    "amount": amount,
                    "currency": "cad",
                    "metadata": {
                        "booking_id": booking.id,
                        "guardian_id": booking.guardian_id,
                        "purpose": purpose
                    }
                }
            }
        }))
        .unwrap()
    }

    async fn deliver(
        h: &Harness,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, EngineError> {
        let header = signature::signature_header(SECRET, now.timestamp(), payload);
        h.reconciler.handle_event(payload, &header, now).await
    }

    #[tokio::test]
    async fn matched_amount_marks_the_booking_paid() {
        let h = harness();
        let now = Utc::now();
        let booking = booked(&h.store, h.guardian.id, now);

        // 5 custom days at $40/day.
        let payload = success_payload("evt_1", &booking, 20_000, "new");
        let ack = deliver(&h, &payload, now).await.unwrap();
        assert_eq!(ack, WebhookAck::Processed);

        let updated = h.store.get(booking.id).unwrap();
        assert_eq!(updated.status, BookingStatus::Paid);
        assert!(updated.service_end_date.is_some());
        assert!(h
            .notifier
            .sent_titles()
            .contains(&"Payment received".to_string()));
    }

    #[tokio::test]
    async fn replaying_the_same_event_applies_exactly_once() {
        let h = harness();
        let now = Utc::now();
        let booking = booked(&h.store, h.guardian.id, now);
        let payload = success_payload("evt_1", &booking, 20_000, "new");

        assert_eq!(deliver(&h, &payload, now).await.unwrap(), WebhookAck::Processed);
        let end_after_first = h.store.get(booking.id).unwrap().service_end_date;

        for _ in 0..5 {
            assert_eq!(
                deliver(&h, &payload, now).await.unwrap(),
                WebhookAck::Duplicate
            );
        }

        let updated = h.store.get(booking.id).unwrap();
        assert_eq!(updated.status, BookingStatus::Paid);
        // Exactly one window extension.
        assert_eq!(updated.service_end_date, end_after_first);
    }

    #[tokio::test]
    async fn amount_mismatch_never_marks_paid_but_consumes_the_event() {
        let h = harness();
        let now = Utc::now();
        let booking = booked(&h.store, h.guardian.id, now);

        let payload = success_payload("evt_1", &booking, 15_000, "new");
        let ack = deliver(&h, &payload, now).await.unwrap();
        assert_eq!(ack, WebhookAck::Processed);

        assert_eq!(h.store.get(booking.id).unwrap().status, BookingStatus::Booked);
        assert!(h.reconciler.ledger().contains("evt_1"));

        // Redelivery of the mismatching event stays consumed.
        assert_eq!(
            deliver(&h, &payload, now).await.unwrap(),
            WebhookAck::Duplicate
        );
        assert_eq!(h.store.get(booking.id).unwrap().status, BookingStatus::Booked);
    }

    #[tokio::test]
    async fn bad_signature_leaves_no_trace() {
        let h = harness();
        let now = Utc::now();
        let booking = booked(&h.store, h.guardian.id, now);
        let payload = success_payload("evt_1", &booking, 20_000, "new");

        let header = signature::signature_header("whsec_wrong", now.timestamp(), &payload);
        let err = h
            .reconciler
            .handle_event(&payload, &header, now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));
        assert!(h.reconciler.ledger().is_empty());
        assert_eq!(h.store.get(booking.id).unwrap().status, BookingStatus::Booked);

        // The same event with a valid signature still processes afterwards.
        assert_eq!(deliver(&h, &payload, now).await.unwrap(), WebhookAck::Processed);
        assert_eq!(h.store.get(booking.id).unwrap().status, BookingStatus::Paid);
    }

    #[tokio::test]
    async fn failure_events_drop_new_purchases_only() {
        let h = harness();
        let now = Utc::now();
        let booking = booked(&h.store, h.guardian.id, now);

        let failed = serde_json::to_vec(&serde_json::json!({
            "id": "evt_f1",
            "type": "checkout.payment_failed",
            "data": {
                "object": {
                    "reference": "pay_1",
                    "amount": 20000,
                    "currency": "cad",
                    "metadata": {
                        "booking_id": booking.id,
                        "guardian_id": booking.guardian_id,
                        "purpose": "new"
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(deliver(&h, &failed, now).await.unwrap(), WebhookAck::Processed);
        assert_eq!(
            h.store.get(booking.id).unwrap().status,
            BookingStatus::PaymentFailed
        );

        // Pay successfully, then a stale renewal failure leaves it paid.
        let success = success_payload("evt_2", &booking, 20_000, "new");
        deliver(&h, &success, now).await.unwrap();
        let renewal_failure = serde_json::to_vec(&serde_json::json!({
            "id": "evt_f2",
            "type": "checkout.session_expired",
            "data": {
                "object": {
                    "reference": "pay_2",
                    "amount": 20000,
                    "currency": "cad",
                    "metadata": {
                        "booking_id": booking.id,
                        "guardian_id": booking.guardian_id,
                        "purpose": "renewal"
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(
            deliver(&h, &renewal_failure, now).await.unwrap(),
            WebhookAck::Processed
        );
        assert_eq!(h.store.get(booking.id).unwrap().status, BookingStatus::Paid);
    }

    #[tokio::test]
    async fn renewal_and_sweeper_order_is_settled_by_preconditions() {
        let h = harness();
        let now = Utc::now();
        let booking = booked(&h.store, h.guardian.id, now);

        // Initial payment, window forced into the past.
        let payload = success_payload("evt_1", &booking, 20_000, "new");
        deliver(&h, &payload, now).await.unwrap();
        h.store
            .update_with(booking.id, |b| {
                b.service_end_date = Some(now - Duration::days(1));
                Ok(())
            })
            .unwrap();

        // Renewal success lands first; the booking advances and stacks from
        // now (old window lapsed).
        let renewal = success_payload("evt_2", &booking, 20_000, "renewal");
        deliver(&h, &renewal, now).await.unwrap();
        let updated = h.store.get(booking.id).unwrap();
        assert_eq!(updated.status, BookingStatus::Paid);
        assert!(updated.service_end_date.unwrap() > now);

        // A sweep running after the renewal finds the precondition gone.
        let sweeper = saferide_booking::ExpirationSweeper::new(
            Arc::clone(&h.store),
            Arc::new(RecordingDispatcher::new()),
            Arc::new(InMemoryDirectory::new()),
        );
        let report = sweeper.run_once(now).await;
        assert_eq!(report.expired, 0);
        assert_eq!(h.store.get(booking.id).unwrap().status, BookingStatus::Paid);
    }
}
