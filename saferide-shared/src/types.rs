use serde::{Deserialize, Serialize};

/// Which driver pool serves the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideCategory {
    InHouse,
    Freelance,
}

/// One-way rides have a single leg, return rides have both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripShape {
    OneWay,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Caller picks the number of service days explicitly.
    Custom,
    BiWeekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

/// Named pickup/dropoff points registered on the child profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stop {
    Home,
    School,
    Daycare,
}

/// The portion of a booking's rides a single assignment covers.
///
/// `WholeRide` replaces the legacy null-shift convention: an assignment
/// either claims one half of a return trip or the entire booking, never an
/// ambiguous absence of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftSlot {
    Morning,
    Afternoon,
    WholeRide,
}

/// Correlation tag carried through the payment gateway and back on webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    New,
    Renewal,
}
