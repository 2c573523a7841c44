use chrono::{DateTime, Duration, Utc};

use saferide_core::EngineError;
use saferide_shared::ScheduleKind;

/// Renewal checkout opens this many days before the window ends.
pub const RENEWAL_WINDOW_DAYS: i64 = 3;
/// Expiry reminder fires inside this many days before the window ends.
pub const REMINDER_LEAD_DAYS: i64 = 3;

const SECONDS_PER_DAY: i64 = 86_400;

/// Length of the paid service window, in days.
pub fn period_days(
    schedule: ScheduleKind,
    number_of_days: Option<u32>,
) -> Result<i64, EngineError> {
    match schedule {
        ScheduleKind::Custom => number_of_days
            .map(i64::from)
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                EngineError::validation("custom schedule without a valid number_of_days")
            }),
        ScheduleKind::BiWeekly => Ok(14),
        ScheduleKind::Monthly => Ok(30),
    }
}

/// Whole days until the window ends, rounded up. Zero or negative means the
/// window has closed.
pub fn days_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = end.signed_duration_since(now).num_seconds();
    (seconds + SECONDS_PER_DAY - 1).div_euclid(SECONDS_PER_DAY)
}

/// Window produced by a successful payment.
///
/// Renewals stack: when an unexpired window exists the new one starts the
/// day after it ends, so paying early never shortens the service the
/// guardian already owns. Otherwise service starts at reconciliation time.
pub fn stacked_window(
    current_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    period: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = match current_end {
        Some(end) if end > now => end + Duration::days(1),
        _ => now,
    };
    (start, start + Duration::days(period))
}
