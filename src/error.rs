// Copyright 2026 Acme Engineering

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::auth::Authorization;
use crate::status::AcmeStatusCode;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors raised by the frame scanner. All of them are fatal to the
/// connection: no response is sent and the socket is dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("request exceeds the maximum size of {limit} bytes")]
    RequestTooLarge { limit: usize },
    #[error("malformed PROXY header: {0}")]
    MalformedProxyHeader(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure writing an envelope. Writing into memory should not fail, so
/// these surface as internal server errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("XML writer failure: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML writer failure: {0}")]
    Io(#[from] io::Error),
}

/// A fault raised while decoding or dispatching one request.
///
/// Each field is optional: whatever the fault leaves unset is recovered
/// from the partially decoded request when the pipeline turns the fault
/// into an error response. A fault without a status is an unexpected one
/// and is reported as `InternalServerError` unless the request's
/// authorization already failed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AcmeFault {
    pub seqnum: Option<i32>,
    pub authorization: Option<Authorization>,
    pub raw_method: Option<String>,
    pub status: Option<AcmeStatusCode>,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl AcmeFault {
    pub fn new<M: Into<String>>(status: AcmeStatusCode, message: M) -> AcmeFault {
        AcmeFault {
            seqnum: None,
            authorization: None,
            raw_method: None,
            status: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// A fault with no protocol status attached.
    pub fn unexpected<E>(err: E) -> AcmeFault
    where
        E: Into<BoxError>,
    {
        let source = err.into();
        AcmeFault {
            seqnum: None,
            authorization: None,
            raw_method: None,
            status: None,
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn with_seqnum(mut self, seqnum: Option<i32>) -> AcmeFault {
        self.seqnum = seqnum;
        self
    }

    pub fn with_authorization(mut self, authorization: Option<Authorization>) -> AcmeFault {
        self.authorization = authorization;
        self
    }

    pub fn with_raw_method(mut self, raw_method: Option<String>) -> AcmeFault {
        self.raw_method = raw_method;
        self
    }

    pub fn with_source<E>(mut self, err: E) -> AcmeFault
    where
        E: Into<BoxError>,
    {
        self.source = Some(err.into());
        self
    }

    /// Message plus every message down the source chain, for logging.
    pub fn messages(&self) -> String {
        let mut out = self.message.clone();
        let mut next = self.source.as_deref().map(|e| e as &(dyn StdError + 'static));
        while let Some(err) = next {
            let text = err.to_string();
            if !out.contains(&text) {
                out.push_str(": ");
                out.push_str(&text);
            }
            next = err.source();
        }
        out
    }
}

impl From<EnvelopeError> for AcmeFault {
    fn from(err: EnvelopeError) -> Self {
        AcmeFault::new(AcmeStatusCode::InternalServerError, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn messages_walks_the_source_chain() {
        let inner = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let fault = AcmeFault::new(AcmeStatusCode::InternalServerError, "lookup failed")
            .with_source(inner);
        assert_eq!(fault.messages(), "lookup failed: disk on fire");
    }

    #[test]
    fn unexpected_fault_has_no_status() {
        let fault = AcmeFault::unexpected("boom");
        assert_eq!(fault.status, None);
        assert_eq!(fault.message, "boom");
        assert_eq!(fault.messages(), "boom");
    }
}
