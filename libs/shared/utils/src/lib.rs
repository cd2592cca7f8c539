pub mod clock;
pub mod test_utils;
pub mod timeout;

pub use clock::{Clock, FixedClock, SystemClock};
pub use timeout::{run_with_timeout, TimedOut};
