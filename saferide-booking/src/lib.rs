pub mod history;
pub mod lifecycle;
pub mod model;
pub mod store;
pub mod sweeper;
pub mod window;

pub use lifecycle::BookingService;
pub use model::{Booking, BookingRequest, BookingStatus, Cancellation, Leg};
pub use store::BookingStore;
pub use sweeper::{ExpirationSweeper, SweepReport};
