pub mod inflight;

pub use inflight::{InFlightGuard, InFlightLocks};
