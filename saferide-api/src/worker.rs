use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::info;

use crate::state::AppState;

/// Long-running expiration sweeper.
///
/// Each tick runs one pass over the paid bookings; per-booking failures are
/// already isolated inside the pass, so the loop itself never dies.
pub async fn run_expiration_sweeper(state: AppState, period: Duration) {
    let mut ticker = interval(period);
    info!(period_secs = period.as_secs(), "expiration sweeper started");

    loop {
        ticker.tick().await;
        let report = state.sweeper.run_once(Utc::now()).await;

        state
            .metrics
            .sweeper_reminders_total
            .inc_by(report.reminders_sent as u64);
        state
            .metrics
            .sweeper_expired_total
            .inc_by(report.expired as u64);

        info!(
            examined = report.examined,
            reminders = report.reminders_sent,
            expired = report.expired,
            errors = report.errors,
            "expiration sweep finished"
        );
    }
}
