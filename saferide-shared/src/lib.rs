pub mod events;
pub mod types;

pub use types::{
    PaymentPurpose, RideCategory, ScheduleKind, ShiftSlot, Stop, TripShape, Weekday,
};
