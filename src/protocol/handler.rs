//! Pluggable request handling.

use std::future::Future;

use async_trait::async_trait;

use crate::message::{ReceiveRequest, StreamingResponse};

/// Error type request handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Answers requests arriving from the peer.
///
/// Errors and panics are turned into a `500` response by the adapter, so a
/// failing handler never tears down the connection.
///
/// Closures returning a future implement this trait:
///
/// ```
/// use streamwire::{
///     message::{ReceiveRequest, StreamingResponse},
///     protocol::{BoxError, ProtocolAdapter},
///     ProtocolConfig,
/// };
///
/// let adapter = ProtocolAdapter::new(
///     |request: ReceiveRequest| async move {
///         Ok::<_, BoxError>(StreamingResponse::ok().with_text_body(request.path().to_owned()))
///     },
///     ProtocolConfig::default(),
/// );
/// assert!(!adapter.is_connected());
/// ```
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response to `request`.
    async fn process_request(
        &self,
        request: ReceiveRequest,
    ) -> Result<StreamingResponse, BoxError>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StreamingResponse, BoxError>> + Send,
{
    async fn process_request(
        &self,
        request: ReceiveRequest,
    ) -> Result<StreamingResponse, BoxError> {
        (self)(request).await
    }
}
