use std::sync::Arc;

use saferide_assign::{AssignmentCoordinator, AssignmentStore};
use saferide_booking::history::RenewalHistory;
use saferide_booking::{BookingService, BookingStore, ExpirationSweeper};
use saferide_core::identity::IdentityProvider;
use saferide_core::notify::NotificationDispatcher;
use saferide_core::payment::PaymentGateway;
use saferide_payments::{IdempotencyLedger, PaymentReconciler};
use saferide_rates::RateProvider;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthSettings {
    pub secret: String,
}

#[derive(Clone)]
pub struct WebhookSettings {
    pub secret: String,
    pub tolerance_seconds: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingStore>,
    pub assignments: Arc<AssignmentStore>,
    pub booking_service: Arc<BookingService>,
    pub coordinator: Arc<AssignmentCoordinator>,
    pub reconciler: Arc<PaymentReconciler>,
    pub sweeper: Arc<ExpirationSweeper>,
    pub directory: Arc<dyn IdentityProvider>,
    pub metrics: Metrics,
    pub auth: AuthSettings,
}

impl AppState {
    /// Wire the engine together around the external collaborators. Used by
    /// both the binary and the integration tests (with mocks plugged in).
    pub fn new(
        auth: AuthSettings,
        webhook: WebhookSettings,
        rates: Arc<dyn RateProvider>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        directory: Arc<dyn IdentityProvider>,
    ) -> Self {
        let bookings = Arc::new(BookingStore::new());
        let assignments = Arc::new(AssignmentStore::new());
        let history = Arc::new(RenewalHistory::new());

        let booking_service = Arc::new(BookingService::new(
            Arc::clone(&bookings),
            history,
            Arc::clone(&rates),
            gateway,
            Arc::clone(&notifier),
            Arc::clone(&directory),
        ));

        let coordinator = Arc::new(AssignmentCoordinator::new(
            Arc::clone(&assignments),
            Arc::clone(&bookings),
            Arc::clone(&directory),
            Arc::clone(&notifier),
        ));

        let reconciler = Arc::new(PaymentReconciler::new(
            webhook.secret,
            webhook.tolerance_seconds,
            Arc::new(IdempotencyLedger::new()),
            Arc::clone(&bookings),
            Arc::clone(&booking_service),
            rates,
            Arc::clone(&notifier),
            Arc::clone(&directory),
        ));

        let sweeper = Arc::new(ExpirationSweeper::new(
            Arc::clone(&bookings),
            notifier,
            Arc::clone(&directory),
        ));

        Self {
            bookings,
            assignments,
            booking_service,
            coordinator,
            reconciler,
            sweeper,
            directory,
            metrics: Metrics::new(),
            auth,
        }
    }
}
