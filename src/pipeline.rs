// Copyright 2026 Acme Engineering

//! Request processing: decode, authorize, dispatch, encode and send one
//! request unit.
//!
//! Every fault raised while handling a unit is caught once, in
//! [`Pipeline::execute`], and turned into an error response. Nothing but
//! framing and transport failures ever reaches the connection loop.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use slog::{debug, error, o, warn, Drain, Logger};
use tokio::sync::mpsc;

use crate::auth::AllowList;
use crate::error::AcmeFault;
use crate::methods::{self, MethodOutcome};
use crate::protocol::OutboundFrame;
use crate::request::{decode_request, AcmeMethod, Request, RequestContext};
use crate::response::{Outcome, WireResult};
use crate::status::AcmeStatusCode;

/// Gate for request processing. Starts out not ready; the server flips it
/// once every listener is bound.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Readiness {
        Readiness::default()
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline {
    allowed: Arc<AllowList>,
    readiness: Readiness,
    log: Logger,
}

impl Pipeline {
    pub fn new(allowed: AllowList, readiness: Readiness, log: Option<&Logger>) -> Pipeline {
        let log = log
            .cloned()
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
        Pipeline {
            allowed: Arc::new(allowed),
            readiness,
            log,
        }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn allowed(&self) -> &AllowList {
        &self.allowed
    }

    /// Handle one request unit and send the response on `tx`. Returns the
    /// response status.
    ///
    /// A closed channel means the connection is going away; the response is
    /// dropped without complaint.
    pub async fn process(
        &self,
        context: RequestContext,
        envelope: Bytes,
        arrived_as_http: bool,
        tx: mpsc::Sender<OutboundFrame>,
    ) -> AcmeStatusCode {
        let started = Instant::now();
        let (result, request) = self.execute(&context, &envelope, arrived_as_http).await;

        if tx.send(result.to_frame()).await.is_err() {
            debug!(self.log, "connection closed before the response was sent";
                "client" => %context.remote_addr,
                "status" => result.status.code());
        }

        self.log_outcome(context.remote_addr, &result, request.as_ref(), started.elapsed());
        result.status
    }

    /// Decode and dispatch one envelope. Always produces a result; the
    /// decoded request, if decoding got that far, comes back alongside it.
    pub async fn execute(
        &self,
        context: &RequestContext,
        envelope: &[u8],
        arrived_as_http: bool,
    ) -> (WireResult, Option<Request>) {
        if !self.readiness.is_ready() {
            let fault = AcmeFault::new(
                AcmeStatusCode::ServerNotAvailable,
                "server is not ready to accept requests",
            );
            return (recover(fault, None).with_http(arrived_as_http), None);
        }

        let request = match decode_request(context, envelope, &self.allowed) {
            Ok(request) => request,
            Err(fault) => return (recover(fault, None).with_http(arrived_as_http), None),
        };

        let result = match dispatch(&request).await {
            Ok(result) => result,
            Err(fault) => recover(fault, Some(&request)),
        };

        (result.with_http(arrived_as_http), Some(request))
    }

    fn log_outcome(
        &self,
        client: IpAddr,
        result: &WireResult,
        request: Option<&Request>,
        elapsed: Duration,
    ) {
        if let Outcome::Error { message, fault } = &result.outcome {
            if result.status.is_authorization_failure() {
                let credential = result.authorization.as_ref().map(|a| a.credential());
                warn!(self.log, "{}", message;
                    "client" => %client,
                    "oem" => credential.map_or("", |c| c.oem_id()),
                    "device" => credential.map_or("", |c| c.device_id()),
                    "unique" => credential.map_or("", |c| c.unique_id()));
            } else {
                let detail = fault.as_ref().map(AcmeFault::messages);
                match request {
                    Some(request) => error!(self.log, "{}", message;
                        "client" => %client,
                        "fault" => detail,
                        "request" => &request.raw_request),
                    None => error!(self.log, "{}", message;
                        "client" => %client,
                        "fault" => detail),
                }
            }
        }

        if result.raw_method.is_some() {
            debug!(self.log, "executed method";
                "method" => result.raw_method.as_deref().unwrap_or(""),
                "elapsed_ms" => elapsed.as_millis() as u64,
                "status" => result.status.code(),
                "statusmsg" => result.status.description(),
                "key" => result.logging.key.as_deref().unwrap_or(""),
                "categories" => ?result.logging.categories,
                "bcri" => ?result.logging.bcri);
        }
    }
}

async fn dispatch(request: &Request) -> Result<WireResult, AcmeFault> {
    let authorization = &request.authorization;
    let outcome: MethodOutcome = match request.method {
        Some(AcmeMethod::Auth) => methods::auth(authorization).await,
        Some(AcmeMethod::BuildVersion) => methods::build_version(authorization).await,
        Some(AcmeMethod::UriInfo) => {
            let uri = request.uri.as_deref().ok_or_else(|| {
                AcmeFault::new(AcmeStatusCode::MalformedXml, "<uri> is missing")
                    .with_seqnum(request.seqnum)
                    .with_authorization(Some(authorization.clone()))
                    .with_raw_method(Some(request.raw_method.clone()))
            })?;
            methods::uri_info(authorization, uri, request.keys.as_deref(), request.limit).await
        }
        None => {
            return Err(AcmeFault::new(
                AcmeStatusCode::InvalidMethod,
                format!("unknown [{}] method", request.raw_method),
            )
            .with_seqnum(request.seqnum)
            .with_authorization(Some(authorization.clone()))
            .with_raw_method(Some(request.raw_method.clone())));
        }
    };

    match outcome.payload {
        Ok(payload) => Ok(WireResult::success(request, &payload, outcome.logging)?),
        Err(e) => Ok(WireResult::error(
            request.seqnum,
            Some(authorization.clone()),
            Some(request.raw_method.clone()),
            e.status,
            e.message,
            None,
        )?
        .with_logging(outcome.logging)),
    }
}

/// Turn a fault into an error result. Fields the fault leaves unset come
/// from the decoded request, and a missing status falls back to the
/// request's failed authorization, then to `InternalServerError`.
fn recover(fault: AcmeFault, request: Option<&Request>) -> WireResult {
    let seqnum = fault.seqnum.or_else(|| request.and_then(|r| r.seqnum));
    let authorization = fault
        .authorization
        .clone()
        .or_else(|| request.map(|r| r.authorization.clone()));
    let raw_method = fault
        .raw_method
        .clone()
        .or_else(|| request.map(|r| r.raw_method.clone()));
    let status = fault
        .status
        .or_else(|| {
            request
                .map(|r| r.authorization.status())
                .filter(|status| !status.is_ok())
        })
        .unwrap_or(AcmeStatusCode::InternalServerError);
    let message = fault.messages();

    match WireResult::error(seqnum, authorization, raw_method, status, message, Some(fault)) {
        Ok(result) => result,
        Err(invariant) => WireResult::internal_error(seqnum, invariant.messages(), Some(invariant)),
    }
}
