// billing-backend/src/utils/mod.rs
pub mod clock;

pub use clock::{Clock, ClockMock, SystemClock};
