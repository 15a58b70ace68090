//! Connection configuration.
//!
//! [`ProtocolConfig`] is a plain builder value shared by the sender, the
//! receiver and the adapter of one connection. Both peers must agree on the
//! maximum frame payload out of band.

use std::time::Duration;

use crate::{
    frame::FrameCodec,
    header::{DEFAULT_MAX_FRAME_PAYLOAD, MAX_PAYLOAD_LENGTH},
};

/// Default number of finished stream ids remembered per connection.
pub const DEFAULT_COMPLETED_ID_WINDOW: usize = 1024;
/// Default buffer size of the receiver event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Settings for one protocol connection.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use streamwire::ProtocolConfig;
///
/// let config = ProtocolConfig::default()
///     .max_payload_length(1024)
///     .request_timeout(Some(Duration::from_secs(5)));
/// assert_eq!(config.max_payload_length_value(), 1024);
/// assert_eq!(config.request_timeout_value(), Some(Duration::from_secs(5)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolConfig {
    max_payload_length: usize,
    request_timeout: Option<Duration>,
    completed_id_window: usize,
    event_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_payload_length: DEFAULT_MAX_FRAME_PAYLOAD,
            request_timeout: None,
            completed_id_window: DEFAULT_COMPLETED_ID_WINDOW,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ProtocolConfig {
    /// Set the largest payload carried by a single frame.
    ///
    /// The value is clamped between 1 byte and the 999 999 bytes the length
    /// field can express.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamwire::ProtocolConfig;
    ///
    /// let config = ProtocolConfig::default().max_payload_length(5_000_000);
    /// assert_eq!(config.max_payload_length_value(), 999_999);
    /// ```
    #[must_use]
    pub fn max_payload_length(mut self, max_payload_length: usize) -> Self {
        self.max_payload_length = max_payload_length.clamp(1, MAX_PAYLOAD_LENGTH);
        self
    }

    /// Set how long `send_request` waits for a response. `None` waits forever.
    #[must_use]
    pub fn request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Set how many finished stream ids are remembered to reject late frames.
    ///
    /// At least one id is always remembered.
    #[must_use]
    pub fn completed_id_window(mut self, completed_id_window: usize) -> Self {
        self.completed_id_window = completed_id_window.max(1);
        self
    }

    /// Set the buffer size of the receiver event channel.
    ///
    /// At least one event is always buffered.
    #[must_use]
    pub fn event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity.max(1);
        self
    }

    /// Return the configured maximum frame payload.
    #[must_use]
    pub const fn max_payload_length_value(&self) -> usize { self.max_payload_length }

    /// Return the configured request timeout.
    #[must_use]
    pub const fn request_timeout_value(&self) -> Option<Duration> { self.request_timeout }

    /// Return the configured finished id window.
    #[must_use]
    pub const fn completed_id_window_value(&self) -> usize { self.completed_id_window }

    /// Return the configured event channel capacity.
    #[must_use]
    pub const fn event_capacity_value(&self) -> usize { self.event_capacity }

    pub(crate) fn build_codec(&self) -> FrameCodec { FrameCodec::new(self.max_payload_length) }
}
