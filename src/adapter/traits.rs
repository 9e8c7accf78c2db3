use crate::errors::ConnResult;
use bytes::Bytes;
use std::any::Any;

/// The boundary between a [`Conn`](crate::Conn) and whatever carries the
/// request.
///
/// Everything observable about a connection (laziness, state transitions,
/// errors) lives in `Conn`. An adapter only supplies the raw request data
/// and delivers what `Conn` decided to send, which is why the live and the
/// test variants behave identically.
///
/// Methods take `&self`: a `Conn` and all of its clones share one adapter.
pub trait Adapter: Send + Sync + 'static {
    /// Host and port the request was received on.
    fn local_addr(&self) -> (String, u16);

    /// Request headers as received, in arrival order.
    fn raw_headers(&self) -> &[(String, String)];

    /// Reads the whole request body.
    ///
    /// A body longer than `limit` bytes is a
    /// [`ConnError::BodyTooLarge`](crate::ConnError::BodyTooLarge) and must
    /// be rejected before it is read. Adapters that consume a stream must
    /// keep the result so that clones of a connection see the same body.
    fn read_body(&self, limit: usize) -> ConnResult<Bytes>;

    /// Delivers a complete response.
    fn send(&self, status: u16, headers: &[(String, String)], body: &Bytes) -> ConnResult<()>;

    /// Delivers the head of a chunked response.
    fn send_chunked(&self, status: u16, headers: &[(String, String)]) -> ConnResult<()>;

    fn chunk(&self, data: &Bytes) -> ConnResult<()>;

    fn end_chunked(&self) -> ConnResult<()>;

    /// Whether anything was delivered through this adapter.
    fn delivered(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}
