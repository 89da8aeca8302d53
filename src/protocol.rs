// Copyright 2026 Acme Engineering

//! Connection-level framing.
//!
//! An ACME connection carries a stream of request envelopes. Each one may be
//! preceded by a minimal HTTP request line and headers, and the very first
//! one may be preceded by a PROXY protocol (v1) header. The scanner finds
//! those units in the byte stream one byte at a time, so a read may end
//! anywhere, including in the middle of a marker.
//!
//! Markers:
//!
//! * `PROXY ` ... `\r\n`: proxy header, first unit only
//! * `GET ` or `POST ` ... `HTTP/1.1\r\n`: marks the next envelope as HTTP
//! * `<?Acme ` or `<acme>` ... `</acme>`: the envelope itself
//!
//! Bytes outside a captured unit are dropped. The HTTP request line and
//! headers are never captured, so an envelope unit always starts with one
//! of the envelope begin markers.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

pub const MAX_REQUEST_OVERHEAD_SIZE: usize = 2048;
pub const MAX_URI_SIZE: usize = 2048;
pub const MAX_REQUEST_SIZE: usize = MAX_REQUEST_OVERHEAD_SIZE + MAX_URI_SIZE;

/// Longest legal PROXY v1 header, including the trailing CRLF.
pub const MAX_PROXY_HEADER_SIZE: usize = 107;

const PROXY_HEADER_BEGIN: &[u8] = b"PROXY ";
const PROXY_HEADER_END: &[u8] = b"\r\n";
const HTTP_REQUEST_HEADER_BEGIN_1: &[u8] = b"GET ";
const HTTP_REQUEST_HEADER_BEGIN_2: &[u8] = b"POST ";
const HTTP_REQUEST_HEADER_END: &[u8] = b"HTTP/1.1\r\n";
const ACME_REQUEST_BEGIN_1: &[u8] = b"<?Acme ";
const ACME_REQUEST_BEGIN_2: &[u8] = b"<acme>";
const ACME_REQUEST_END: &[u8] = b"</acme>";

/// Smallest buffer that can hold the longest begin marker plus the end
/// marker.
pub const MIN_REQUEST_SIZE: usize = 16;

/// One complete unit found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramedUnit {
    /// The PROXY header text without its trailing CRLF.
    ProxyHeader(String),
    /// A whole envelope, from its begin marker through `</acme>`.
    Request {
        envelope: Bytes,
        arrived_as_http: bool,
    },
}

/// Literal prefix tracking for one marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Matcher {
    pattern: &'static [u8],
    matched: usize,
}

impl Matcher {
    const fn new(pattern: &'static [u8]) -> Matcher {
        Matcher {
            pattern,
            matched: 0,
        }
    }

    /// Feed one byte. Returns true when the whole marker has been seen, at
    /// which point the matcher starts over.
    fn step(&mut self, byte: u8) -> bool {
        if byte == self.pattern[self.matched] {
            self.matched += 1;
        } else if byte == self.pattern[0] {
            self.matched = 1;
        } else {
            self.matched = 0;
        }

        if self.matched == self.pattern.len() {
            self.matched = 0;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.matched = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Proxy,
    Envelope,
}

/// Everything the scanner remembers between bytes, except the captured
/// bytes themselves. Returns to its default after every unit.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScanState {
    proxy_begin: Matcher,
    proxy_end: Matcher,
    http_begin_1: Matcher,
    http_begin_2: Matcher,
    http_end: Matcher,
    acme_begin_1: Matcher,
    acme_begin_2: Matcher,
    acme_end: Matcher,
    in_http_header: bool,
    arrived_as_http: bool,
    capture: Option<Capture>,
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState {
            proxy_begin: Matcher::new(PROXY_HEADER_BEGIN),
            proxy_end: Matcher::new(PROXY_HEADER_END),
            http_begin_1: Matcher::new(HTTP_REQUEST_HEADER_BEGIN_1),
            http_begin_2: Matcher::new(HTTP_REQUEST_HEADER_BEGIN_2),
            http_end: Matcher::new(HTTP_REQUEST_HEADER_END),
            acme_begin_1: Matcher::new(ACME_REQUEST_BEGIN_1),
            acme_begin_2: Matcher::new(ACME_REQUEST_BEGIN_2),
            acme_end: Matcher::new(ACME_REQUEST_END),
            in_http_header: false,
            arrived_as_http: false,
            capture: None,
        }
    }
}

/// Per-connection byte stream scanner.
#[derive(Debug)]
pub struct FrameScanner {
    state: ScanState,
    buffer: BytesMut,
    max_request_size: usize,
    units: u64,
}

impl FrameScanner {
    pub fn new() -> FrameScanner {
        FrameScanner::with_max_request_size(MAX_REQUEST_SIZE)
    }

    pub fn with_max_request_size(max_request_size: usize) -> FrameScanner {
        let max_request_size = max_request_size.max(MIN_REQUEST_SIZE);
        FrameScanner {
            state: ScanState::default(),
            buffer: BytesMut::with_capacity(max_request_size),
            max_request_size,
            units: 0,
        }
    }

    /// Number of units emitted so far on this connection.
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Scan `chunk` until one unit completes or the chunk runs out.
    ///
    /// Returns how many bytes of `chunk` were consumed. When a unit is
    /// returned, bytes after it are left unconsumed and must be offered
    /// again on the next call.
    pub fn consume(&mut self, chunk: &[u8]) -> Result<(usize, Option<FramedUnit>), FrameError> {
        for (offset, &byte) in chunk.iter().enumerate() {
            let unit = match self.state.capture {
                None => {
                    self.scan_for_begin(byte)?;
                    None
                }
                Some(Capture::Envelope) => {
                    self.push(byte)?;
                    if self.state.acme_end.step(byte) {
                        Some(self.finish_request())
                    } else {
                        None
                    }
                }
                Some(Capture::Proxy) => {
                    self.push(byte)?;
                    if self.state.proxy_end.step(byte) {
                        Some(self.finish_proxy_header()?)
                    } else if self.buffer.len() >= MAX_PROXY_HEADER_SIZE {
                        return Err(FrameError::MalformedProxyHeader(
                            "header too long".to_string(),
                        ));
                    } else {
                        None
                    }
                }
            };

            if unit.is_some() {
                return Ok((offset + 1, unit));
            }
        }

        Ok((chunk.len(), None))
    }

    fn scan_for_begin(&mut self, byte: u8) -> Result<(), FrameError> {
        let state = &mut self.state;

        if state.in_http_header {
            if state.http_end.step(byte) {
                state.in_http_header = false;
                state.arrived_as_http = true;
                state.http_begin_1.reset();
                state.http_begin_2.reset();
            }
        } else {
            let get = state.http_begin_1.step(byte);
            let post = state.http_begin_2.step(byte);
            if get || post {
                state.in_http_header = true;
                state.http_end.reset();
            }
        }

        // A PROXY header is only honoured ahead of everything else.
        let proxy_eligible =
            self.units == 0 && !state.in_http_header && !state.arrived_as_http;
        let proxy = proxy_eligible && state.proxy_begin.step(byte);
        let acme_1 = state.acme_begin_1.step(byte);
        let acme_2 = state.acme_begin_2.step(byte);

        if acme_1 {
            self.start_capture(Capture::Envelope, ACME_REQUEST_BEGIN_1)
        } else if acme_2 {
            self.start_capture(Capture::Envelope, ACME_REQUEST_BEGIN_2)
        } else if proxy {
            self.start_capture(Capture::Proxy, PROXY_HEADER_BEGIN)
        } else {
            Ok(())
        }
    }

    fn start_capture(&mut self, capture: Capture, prefix: &[u8]) -> Result<(), FrameError> {
        self.state.capture = Some(capture);
        self.buffer.clear();
        for &byte in prefix {
            self.push(byte)?;
        }
        Ok(())
    }

    fn push(&mut self, byte: u8) -> Result<(), FrameError> {
        if self.buffer.len() >= self.max_request_size {
            return Err(FrameError::RequestTooLarge {
                limit: self.max_request_size,
            });
        }
        self.buffer.put_u8(byte);
        Ok(())
    }

    fn finish_request(&mut self) -> FramedUnit {
        let unit = FramedUnit::Request {
            envelope: Bytes::copy_from_slice(&self.buffer),
            arrived_as_http: self.state.arrived_as_http,
        };
        self.reset();
        unit
    }

    fn finish_proxy_header(&mut self) -> Result<FramedUnit, FrameError> {
        let end = self.buffer.len() - PROXY_HEADER_END.len();
        let text = String::from_utf8(self.buffer[..end].to_vec())
            .map_err(|_| FrameError::MalformedProxyHeader("not ASCII".to_string()))?;
        self.reset();
        Ok(FramedUnit::ProxyHeader(text))
    }

    fn reset(&mut self) {
        self.state = ScanState::default();
        self.buffer.clear();
        self.units += 1;
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        FrameScanner::new()
    }
}

/// Bytes to put on the wire for one message: an optional HTTP head
/// followed by the XML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub head: Option<Bytes>,
    pub body: Bytes,
}

impl OutboundFrame {
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, Bytes::len) + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `tokio_util` codec for ACME connections: decodes framed units, encodes
/// outbound frames.
#[derive(Debug, Default)]
pub struct AcmeRpc {
    scanner: FrameScanner,
}

impl AcmeRpc {
    pub fn new() -> AcmeRpc {
        AcmeRpc::default()
    }

    pub fn with_max_request_size(max_request_size: usize) -> AcmeRpc {
        AcmeRpc {
            scanner: FrameScanner::with_max_request_size(max_request_size),
        }
    }

    pub fn scanner(&self) -> &FrameScanner {
        &self.scanner
    }
}

impl Decoder for AcmeRpc {
    type Item = FramedUnit;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, FrameError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let (consumed, unit) = self.scanner.consume(&buf[..])?;
        buf.advance(consumed);
        Ok(unit)
    }
}

impl Encoder<OutboundFrame> for AcmeRpc {
    type Error = io::Error;

    fn encode(&mut self, item: OutboundFrame, buf: &mut BytesMut) -> Result<(), io::Error> {
        buf.reserve(item.len());
        if let Some(head) = item.head {
            buf.put(head);
        }
        buf.put(item.body);
        Ok(())
    }
}
