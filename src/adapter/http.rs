//! HTTP/1.x adapter over a byte transport
//!
//! The adapter does not own sockets: a [`Transport`] supplies the local
//! address, the body bytes and a sink for the encoded response.
//!
//! # Examples
//! ```
//! use maker_conn::{
//!     adapter::http::{HttpAdapter, StreamTransport},
//!     http::wire::RequestHead,
//!     limits::FetchLimits,
//! };
//! use std::{io::Cursor, sync::Arc};
//!
//! let raw = b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n";
//! let (head, len) = RequestHead::parse(raw, 64).unwrap();
//!
//! let stream = Cursor::new(Vec::new());
//! let transport = StreamTransport::new(stream, ("127.0.0.1", 8080), &raw[len..]);
//! let conn = HttpAdapter::conn(transport, head, Arc::new(FetchLimits::default())).unwrap();
//!
//! assert_eq!(conn.path(), "/hello");
//! conn.send(200_u16, "hi").unwrap();
//! ```

use crate::{
    adapter::Adapter,
    errors::{ConnError, ConnResult},
    http::{
        types::Version,
        wire::{self, RequestHead, WireError},
    },
    limits::FetchLimits,
    Conn,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    any::Any,
    io::{self, Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Source of the request body and sink for the response bytes.
pub trait Transport: Send + 'static {
    /// Host and port the request was received on.
    fn local_addr(&self) -> (String, u16);

    /// Reads exactly `len` body bytes.
    fn read_body(&mut self, len: usize) -> io::Result<Bytes>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// [`Transport`] over any blocking `Read + Write` stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    local: (String, u16),
    buffered: Bytes,
}

impl<S: Read + Write + Send + 'static> StreamTransport<S> {
    /// `buffered` holds bytes already read past the request head.
    pub fn new(stream: S, (host, port): (&str, u16), buffered: &[u8]) -> Self {
        Self {
            stream,
            local: (host.to_owned(), port),
            buffered: Bytes::copy_from_slice(buffered),
        }
    }

    #[inline(always)]
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: Read + Write + Send + 'static> Transport for StreamTransport<S> {
    fn local_addr(&self) -> (String, u16) {
        self.local.clone()
    }

    fn read_body(&mut self, len: usize) -> io::Result<Bytes> {
        if self.buffered.len() >= len {
            return Ok(self.buffered.split_to(len));
        }

        // Grows with what actually arrives, not with the announced length.
        let mut body = self.buffered.to_vec();
        self.buffered.clear();

        let missing = (len - body.len()) as u64;
        Read::take(&mut self.stream, missing).read_to_end(&mut body)?;
        if body.len() < len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(Bytes::from(body))
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }
}

/// Adapter that encodes responses as HTTP/1.x onto a [`Transport`].
pub struct HttpAdapter<T> {
    transport: Mutex<T>,
    version: Version,
    headers: Vec<(String, String)>,
    content_length: usize,
    body: Mutex<Option<Bytes>>,
    delivered: AtomicBool,
}

impl<T: Transport> HttpAdapter<T> {
    /// Builds a connection for `head`, received through `transport`.
    ///
    /// # Errors
    /// An invalid `content-length` header.
    pub fn conn(transport: T, head: RequestHead, limits: Arc<FetchLimits>) -> Result<Conn, WireError> {
        let content_length = head.content_length()?.unwrap_or(0);
        let adapter = HttpAdapter {
            transport: Mutex::new(transport),
            version: head.version,
            headers: head.headers,
            content_length,
            body: Mutex::new(None),
            delivered: AtomicBool::new(false),
        };

        Ok(Conn::new(
            Arc::new(adapter),
            &head.method,
            &head.target,
            head.version,
            limits,
        ))
    }

    /// Access to the transport, e.g. to inspect what was written.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.transport.lock())
    }

    fn write(&self, out: &[u8]) -> ConnResult<()> {
        self.transport.lock().write_all(out)?;
        self.delivered.store(true, Ordering::Release);
        Ok(())
    }
}

impl<T: Transport> Adapter for HttpAdapter<T> {
    fn local_addr(&self) -> (String, u16) {
        self.transport.lock().local_addr()
    }

    fn raw_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    fn read_body(&self, limit: usize) -> ConnResult<Bytes> {
        if self.content_length > limit {
            return Err(ConnError::BodyTooLarge {
                len: self.content_length,
                limit,
            });
        }

        let mut cached = self.body.lock();
        if let Some(body) = cached.as_ref() {
            return Ok(body.clone());
        }

        let body = match self.content_length {
            0 => Bytes::new(),
            len => self.transport.lock().read_body(len)?,
        };
        *cached = Some(body.clone());
        Ok(body)
    }

    fn send(&self, status: u16, headers: &[(String, String)], body: &Bytes) -> ConnResult<()> {
        let mut out = Vec::with_capacity(128 + body.len());
        wire::encode_response(&mut out, self.version, status, headers, body);
        self.write(&out)
    }

    fn send_chunked(&self, status: u16, headers: &[(String, String)]) -> ConnResult<()> {
        let mut out = Vec::with_capacity(128);
        wire::encode_chunked_head(&mut out, self.version, status, headers);
        self.write(&out)
    }

    fn chunk(&self, data: &Bytes) -> ConnResult<()> {
        let mut out = Vec::with_capacity(data.len() + 12);
        wire::encode_chunk(&mut out, data);
        self.write(&out)
    }

    fn end_chunked(&self) -> ConnResult<()> {
        let mut out = Vec::with_capacity(5);
        wire::encode_last_chunk(&mut out);
        self.write(&out)
    }

    fn delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
