use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use saferide_core::EngineError;
use saferide_shared::{RideCategory, ScheduleKind, Stop, TripShape, Weekday};

/// How far ahead a booking may start.
pub const MAX_DAYS_AHEAD: i64 = 90;
/// Timezone tolerance for "today" bookings submitted late in the day.
pub const MAX_DAYS_PAST: i64 = 1;
pub const MAX_CUSTOM_DAYS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Booked,
    Paid,
    Assigned,
    Ongoing,
    PaymentFailed,
    Completed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    /// Active bookings block a second booking for the same child.
    /// `payment_failed` is recoverable but not active, so the guardian may
    /// start over with a fresh booking.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            BookingStatus::Booked
                | BookingStatus::Paid
                | BookingStatus::Assigned
                | BookingStatus::Ongoing
        )
    }
}

/// One half of the day's transport. All fields are required; a partially
/// specified leg is unrepresentable by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub from: Stop,
    pub to: Stop,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Guardian-supplied booking parameters, validated before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub category: RideCategory,
    pub trip_shape: TripShape,
    pub schedule: ScheduleKind,
    #[serde(default)]
    pub number_of_days: Option<u32>,
    pub pickup_days: Vec<Weekday>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub morning: Option<Leg>,
    #[serde(default)]
    pub afternoon: Option<Leg>,
}

impl BookingRequest {
    /// Full request validation: schedule/day-count coupling, pickup days,
    /// start-date window, and leg shape against the trip type.
    pub fn validate(&self, today: NaiveDate) -> Result<(), EngineError> {
        match self.schedule {
            ScheduleKind::Custom => {
                let days = self.number_of_days.ok_or_else(|| {
                    EngineError::validation("number_of_days is required for custom schedules")
                })?;
                if days == 0 || days > MAX_CUSTOM_DAYS {
                    return Err(EngineError::Validation(format!(
                        "number_of_days must be between 1 and {MAX_CUSTOM_DAYS}"
                    )));
                }
            }
            _ => {
                if self.number_of_days.is_some() {
                    return Err(EngineError::validation(
                        "number_of_days is only allowed for custom schedules",
                    ));
                }
            }
        }

        if self.pickup_days.is_empty() {
            return Err(EngineError::validation("pickup_days must not be empty"));
        }
        let mut seen = self.pickup_days.clone();
        seen.sort_by_key(|d| *d as u8);
        seen.dedup();
        if seen.len() != self.pickup_days.len() {
            return Err(EngineError::validation("pickup_days contains duplicates"));
        }

        let offset = self.start_date.signed_duration_since(today).num_days();
        if offset < -MAX_DAYS_PAST {
            return Err(EngineError::validation("start date cannot be in the past"));
        }
        if offset > MAX_DAYS_AHEAD {
            return Err(EngineError::validation(
                "start date is too far in the future",
            ));
        }

        for (name, leg) in [("morning", &self.morning), ("afternoon", &self.afternoon)] {
            if let Some(leg) = leg {
                if leg.from == leg.to {
                    return Err(EngineError::Validation(format!(
                        "{name} pickup and dropoff cannot be the same"
                    )));
                }
            }
        }

        match self.trip_shape {
            TripShape::OneWay => {
                if self.morning.is_some() == self.afternoon.is_some() {
                    return Err(EngineError::validation(
                        "one-way trips must have exactly one of the morning or afternoon legs",
                    ));
                }
            }
            TripShape::Return => {
                if self.morning.is_none() || self.afternoon.is_none() {
                    return Err(EngineError::validation(
                        "return trips must have both morning and afternoon legs",
                    ));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub guardian_id: Uuid,
    pub child_id: Uuid,
    pub category: RideCategory,
    pub trip_shape: TripShape,
    pub schedule: ScheduleKind,
    pub number_of_days: Option<u32>,
    pub pickup_days: Vec<Weekday>,
    pub start_date: NaiveDate,
    pub morning: Option<Leg>,
    pub afternoon: Option<Leg>,
    pub status: BookingStatus,
    pub cancellation: Option<Cancellation>,
    /// End of the paid service window; only meaningful from `paid` onward.
    pub service_end_date: Option<DateTime<Utc>>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        request: BookingRequest,
        guardian_id: Uuid,
        child_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guardian_id,
            child_id,
            category: request.category,
            trip_shape: request.trip_shape,
            schedule: request.schedule,
            number_of_days: request.number_of_days,
            pickup_days: request.pickup_days,
            start_date: request.start_date,
            morning: request.morning,
            afternoon: request.afternoon,
            status: BookingStatus::Booked,
            cancellation: None,
            service_end_date: None,
            reminder_sent: false,
            created_at: now,
            updated_at: now,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn return_trip_requires_both_legs() {
        let mut request = fixtures::request(TripShape::Return, ScheduleKind::Monthly, today());
        assert!(request.validate(today()).is_ok());

        request.afternoon = None;
        assert!(matches!(
            request.validate(today()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn one_way_trip_requires_exactly_one_leg() {
        let mut request = fixtures::request(TripShape::OneWay, ScheduleKind::Monthly, today());
        assert!(request.validate(today()).is_ok());

        request.afternoon = request.morning;
        assert!(request.validate(today()).is_err());

        request.morning = None;
        request.afternoon = None;
        assert!(request.validate(today()).is_err());
    }

    #[test]
    fn leg_endpoints_must_differ() {
        let mut request = fixtures::request(TripShape::OneWay, ScheduleKind::Monthly, today());
        request.morning = Some(Leg {
            from: Stop::Home,
            to: Stop::Home,
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        });
        assert!(request.validate(today()).is_err());
    }

    #[test]
    fn day_count_is_coupled_to_the_custom_schedule() {
        let mut request = fixtures::request(TripShape::Return, ScheduleKind::Custom, today());
        request.number_of_days = None;
        assert!(request.validate(today()).is_err());

        request.number_of_days = Some(MAX_CUSTOM_DAYS + 1);
        assert!(request.validate(today()).is_err());

        let mut monthly = fixtures::request(TripShape::Return, ScheduleKind::Monthly, today());
        monthly.number_of_days = Some(5);
        assert!(monthly.validate(today()).is_err());
    }

    #[test]
    fn start_date_window_is_enforced() {
        let mut request = fixtures::request(TripShape::Return, ScheduleKind::Monthly, today());

        request.start_date = today() - Duration::days(2);
        assert!(request.validate(today()).is_err());

        // One day in the past is tolerated for timezone skew.
        request.start_date = today() - Duration::days(1);
        assert!(request.validate(today()).is_ok());

        request.start_date = today() + Duration::days(MAX_DAYS_AHEAD + 1);
        assert!(request.validate(today()).is_err());
    }

    #[test]
    fn pickup_days_must_be_present_and_unique() {
        let mut request = fixtures::request(TripShape::Return, ScheduleKind::Monthly, today());
        request.pickup_days = vec![];
        assert!(request.validate(today()).is_err());

        request.pickup_days = vec![Weekday::Monday, Weekday::Monday];
        assert!(request.validate(today()).is_err());
    }

    #[test]
    fn payment_failed_is_not_active() {
        assert!(BookingStatus::Booked.is_active());
        assert!(BookingStatus::Ongoing.is_active());
        assert!(!BookingStatus::PaymentFailed.is_active());
        assert!(!BookingStatus::Expired.is_active());
    }
}
