//! # speedbridge
//!
//! Drives a speed-test engine through its phases and streams a consistent
//! result snapshot to a single subscriber.
//!
//! - [`bridge::ControlSurface`] takes configuration and stop requests and
//!   hands out the event stream
//! - [`bridge::TestSession`] runs the per-test state machine
//! - [`speedtest::engine::Engine`] is the seam to the wrapped engine

pub mod bridge;
pub mod speedtest;

pub use bridge::{ControlError, ControlSurface, EventStream, SessionEvent};
pub use speedtest::{ResultSnapshot, TestStatus};
