//! Panic capture for request handlers.
//!
//! A handler that panics must not take the connection down with it. The
//! adapter runs each handler through [`catch_panic`] and answers the request
//! with a server error carrying the [`PanicMessage`].

use std::{any::Any, fmt, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;

/// Printable text recovered from a panic payload.
///
/// `String` and `&'static str` payloads are kept verbatim; anything else is
/// rendered with `Debug`.
///
/// ```
/// use streamwire::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("boom"))).as_str(), "boom");
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct PanicMessage(String);

impl PanicMessage {
    /// Borrow the recovered text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Extract a [`PanicMessage`] from a caught panic payload.
pub fn format_panic(payload: Box<dyn Any + Send>) -> PanicMessage {
    match payload.downcast::<String>() {
        Ok(text) => PanicMessage(*text),
        Err(payload) => match payload.downcast_ref::<&'static str>() {
            Some(text) => PanicMessage((*text).to_owned()),
            None => PanicMessage(format!("{payload:?}")),
        },
    }
}

/// Drive `future` to completion, converting a panic into an error.
///
/// # Errors
///
/// Returns the [`PanicMessage`] if `future` panics while being polled.
pub async fn catch_panic<F>(future: F) -> Result<F::Output, PanicMessage>
where
    F: Future,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(format_panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn explode() -> u32 { panic!("handler exploded") }

    #[tokio::test]
    async fn panicking_future_yields_its_message() {
        let err = catch_panic(explode()).await.expect_err("future panicked");
        assert_eq!(err.as_str(), "handler exploded");
    }

    #[tokio::test]
    async fn completed_future_passes_through() {
        assert_eq!(catch_panic(async { 7 }).await, Ok(7));
    }
}
