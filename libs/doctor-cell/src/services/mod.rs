pub mod availability;
pub mod calendar;
pub mod doctor;
pub mod locks;

pub use availability::{day_bounds, interval_end, AvailabilityService};
pub use calendar::{DaySlots, DoctorCalendar};
pub use doctor::DoctorService;
pub use locks::{DoctorGuard, DoctorLocks};
