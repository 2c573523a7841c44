use saferide_core::EngineError;
use saferide_shared::{RideCategory, ScheduleKind, TripShape};

use crate::table::RateTable;

/// Compute the checkout amount for a booking, in cents.
///
/// Pure function over a rate table snapshot; the caller never trusts a
/// client-supplied amount and recomputes with the booking's current
/// attributes every time (checkout, renewal, and webhook verification).
pub fn resolve(
    table: &RateTable,
    category: RideCategory,
    schedule: ScheduleKind,
    shape: TripShape,
    number_of_days: Option<u32>,
) -> Result<i64, EngineError> {
    let rates = table.category(category);

    let amount = match schedule {
        ScheduleKind::Custom => {
            let days = number_of_days.ok_or_else(|| {
                EngineError::validation("number_of_days is required for custom schedules")
            })?;
            if days == 0 {
                return Err(EngineError::validation(
                    "number_of_days must be at least 1",
                ));
            }
            rates.daily_cents * i64::from(days)
        }
        ScheduleKind::BiWeekly => rates.bi_weekly.for_shape(shape),
        ScheduleKind::Monthly => rates.monthly.for_shape(shape),
    };

    if amount < 0 {
        return Err(EngineError::ExternalDependency(format!(
            "rate table produced a negative amount for {category:?}/{schedule:?}/{shape:?}"
        )));
    }

    Ok(amount)
}
