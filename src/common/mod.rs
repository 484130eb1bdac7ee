//! Common utilities shared across pipeline components
//!
//! - Readiness polling with bounded timeout and backoff, used for the
//!   process settle window, browser login detection and engine recalculation

pub mod readiness;

pub use readiness::{PollOutcome, ReadinessPoll};
