// Copyright 2026 Acme Engineering

//! A minimal ACME client.
//!
//! Responses are framed by the same scanner the server uses: everything
//! before `<?Acme ` (an HTTP status block, for instance) is skipped and the
//! envelope runs through `</acme>`.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::envelope;
use crate::error::{EnvelopeError, FrameError};
use crate::protocol::{AcmeRpc, FramedUnit, OutboundFrame};
use crate::request::RequestEnvelope;
use crate::response::{parse_response, ResponseEnvelope};

/// Responses echo the URI several times, so they get more room than
/// requests.
pub const MAX_RESPONSE_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("failed to decode response: {0}")]
    Decode(#[from] quick_xml::de::DeError),
    #[error("connection closed before a response arrived")]
    Closed,
    #[error("server sent a PROXY header")]
    UnexpectedProxyHeader,
}

pub struct AcmeClient<S> {
    framed: Framed<S, AcmeRpc>,
    host: String,
}

impl<S> AcmeClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> AcmeClient<S> {
        AcmeClient {
            framed: Framed::new(stream, AcmeRpc::with_max_request_size(MAX_RESPONSE_SIZE)),
            host: "localhost".to_string(),
        }
    }

    /// `Host` header for requests sent as HTTP.
    pub fn with_host<H: Into<String>>(mut self, host: H) -> AcmeClient<S> {
        self.host = host.into();
        self
    }

    /// Send one request, as a bare envelope or as an HTTP POST. Returns
    /// the number of bytes written.
    pub async fn send(&mut self, request: &RequestEnvelope, as_http: bool) -> Result<usize, ClientError> {
        let body = request.encode()?;
        let head = if as_http {
            Some(envelope::http_request_head("/", &self.host, body.len()))
        } else {
            None
        };
        let frame = OutboundFrame { head, body };
        let written = frame.len();
        self.framed.send(frame).await?;
        Ok(written)
    }

    /// Write bytes exactly as given.
    pub async fn send_raw(&mut self, bytes: Bytes) -> Result<(), ClientError> {
        self.framed.send(OutboundFrame { head: None, body: bytes }).await?;
        Ok(())
    }

    /// Read and decode the next response envelope.
    pub async fn receive(&mut self) -> Result<ResponseEnvelope, ClientError> {
        match self.framed.next().await {
            None => Err(ClientError::Closed),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(FramedUnit::ProxyHeader(_))) => Err(ClientError::UnexpectedProxyHeader),
            Some(Ok(FramedUnit::Request { envelope, .. })) => Ok(parse_response(&envelope)?),
        }
    }

    pub async fn call(&mut self, request: &RequestEnvelope, as_http: bool) -> Result<ResponseEnvelope, ClientError> {
        self.send(request, as_http).await?;
        self.receive().await
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use tokio_test::{block_on, io::Builder};

    use crate::auth::Credential;
    use crate::status::AcmeStatusCode;

    const RESPONSE: &[u8] = b"<?Acme version=acme/1.1?><acme><seqnum>5</seqnum><response>\
<status>401</status><statusmsg>Unauthorized</statusmsg></response></acme>";

    fn request() -> RequestEnvelope {
        let mut request = RequestEnvelope::new("auth", Credential::new("oem", "device", "999"));
        request.seqnum = Some(5);
        request
    }

    #[test]
    fn call_round_trip() {
        let encoded = request().encode().unwrap();
        let mock = Builder::new().write(&encoded).read(RESPONSE).build();
        let mut client = AcmeClient::new(mock);
        let response = block_on(client.call(&request(), false)).unwrap();
        assert_eq!(response.seqnum, Some(5));
        assert_eq!(response.status(), Some(AcmeStatusCode::Unauthorized));
    }

    #[test]
    fn http_response_head_is_skipped() {
        let encoded = request().encode().unwrap();
        let head = envelope::http_request_head("/", "gateway", encoded.len());
        let mut reply = Vec::new();
        reply.extend_from_slice(&envelope::http_response_head(200, "application/xml", RESPONSE.len()));
        reply.extend_from_slice(RESPONSE);

        let mock = Builder::new()
            .write(&head)
            .write(&encoded)
            .read(&reply)
            .build();
        let mut client = AcmeClient::new(mock).with_host("gateway");
        let response = block_on(client.call(&request(), true)).unwrap();
        assert_eq!(response.response.status, 401);
    }

    #[test]
    fn closed_connection() {
        let mock = Builder::new().build();
        let mut client = AcmeClient::new(mock);
        assert!(matches!(block_on(client.receive()), Err(ClientError::Closed)));
    }
}
