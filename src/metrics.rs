//! Metric helpers for `streamwire`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "streamwire_connections_active";
/// Name of the counter tracking frames written or read.
pub const FRAMES_PROCESSED: &str = "streamwire_frames_processed_total";
/// Name of the counter tracking connection-fatal errors.
pub const ERRORS_TOTAL: &str = "streamwire_errors_total";
/// Name of the counter tracking request handler panics.
pub const HANDLER_PANICS: &str = "streamwire_handler_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from the peer.
    Inbound,
    /// Frames written to the peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "metrics disabled"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a connection-fatal error.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Record a request handler panic.
pub fn inc_handler_panics() {
    #[cfg(feature = "metrics")]
    counter!(HANDLER_PANICS).increment(1);
}
