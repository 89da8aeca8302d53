// Copyright 2026 Acme Engineering

//! Connection handling and the listener loop.
//!
//! Each accepted connection gets one task built by [`make_task`]. That task
//! owns the read half and the frame scanner, so only one read is ever
//! outstanding, and the idle timeout restarts with every read. Request units are spawned onto the runtime as they arrive
//! and their responses funnel through a channel to a single writer task,
//! which owns the write half. Responses to pipelined requests may therefore
//! be written in completion order, never interleaved.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::SinkExt;
use slog::{debug, error, info, o, warn, Drain, Logger};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::codec::{Decoder, FramedWrite};

use crate::config::{ConfigError, Settings};
use crate::error::FrameError;
use crate::pipeline::{Pipeline, Readiness};
use crate::protocol::{AcmeRpc, FramedUnit, OutboundFrame, MAX_REQUEST_SIZE};
use crate::proxy::ProxyHeader;
use crate::request::RequestContext;

const HTTP_PORT: u16 = 80;
const RESPONSE_QUEUE_DEPTH: usize = 32;
const READ_BUFFER_SIZE: usize = 4096;

/// Logical listener tag for a port.
pub fn service_type(port: u16) -> String {
    if port == HTTP_PORT {
        "http-stream".to_string()
    } else {
        format!("tcp-stream-{}", port)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub idle_timeout: Duration,
    pub max_request_size: usize,
    pub connection_logging: bool,
}

impl Default for ConnectionSettings {
    fn default() -> ConnectionSettings {
        ConnectionSettings {
            idle_timeout: Duration::from_secs(60),
            max_request_size: MAX_REQUEST_SIZE,
            connection_logging: false,
        }
    }
}

impl From<&Settings> for ConnectionSettings {
    fn from(settings: &Settings) -> ConnectionSettings {
        ConnectionSettings {
            idle_timeout: settings.idle_timeout(),
            max_request_size: settings.tcp.max_request_size,
            connection_logging: settings.options.enable_connection_logging,
        }
    }
}

enum ConnectionEnd {
    Closed,
    Shutdown,
    IdleTimeout,
    Fault(FrameError),
}

/// Build the task that serves one connection until the peer closes it, it
/// sits idle past the timeout, it sends something unframeable, or
/// `shutdown` flips.
pub fn make_task(
    socket: TcpStream,
    pipeline: Arc<Pipeline>,
    settings: ConnectionSettings,
    shutdown: watch::Receiver<bool>,
    log: Option<&Logger>,
) -> impl Future<Output = ()> + Send + 'static {
    let log = log
        .cloned()
        .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
    serve_connection(socket, pipeline, settings, shutdown, log)
}

/// The context a PROXY header describes: the client behind the proxy and
/// the port it connected to.
fn proxied_context(header: &ProxyHeader) -> RequestContext {
    RequestContext {
        service_type: service_type(header.proxy_port),
        remote_addr: header.client_addr,
    }
}

async fn serve_connection(
    socket: TcpStream,
    pipeline: Arc<Pipeline>,
    settings: ConnectionSettings,
    mut shutdown: watch::Receiver<bool>,
    log: Logger,
) {
    let (peer, local) = match (socket.peer_addr(), socket.local_addr()) {
        (Ok(peer), Ok(local)) => (peer, local),
        (Err(e), _) | (_, Err(e)) => {
            warn!(log, "failed to read connection addresses"; "err" => %e);
            return;
        }
    };
    let log = log.new(o!("remote" => peer.to_string()));
    let mut context = RequestContext {
        service_type: service_type(local.port()),
        remote_addr: peer.ip(),
    };
    info!(log, "connection accepted"; "service_type" => &context.service_type);

    let (mut read_half, write_half) = socket.into_split();
    let mut codec = AcmeRpc::with_max_request_size(settings.max_request_size);
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let (tx, rx) = mpsc::channel(RESPONSE_QUEUE_DEPTH);
    let writer = tokio::spawn(write_responses(
        write_half,
        rx,
        settings.connection_logging,
        log.clone(),
    ));
    let mut in_flight = JoinSet::new();

    let end = 'conn: loop {
        if *shutdown.borrow() {
            break ConnectionEnd::Shutdown;
        }

        // Everything already buffered is framed before the next read.
        loop {
            match codec.decode(&mut buf) {
                Ok(None) => break,
                Err(e) => break 'conn ConnectionEnd::Fault(e),
                Ok(Some(FramedUnit::ProxyHeader(text))) => match text.parse::<ProxyHeader>() {
                    Ok(header) => {
                        context = proxied_context(&header);
                        debug!(log, "proxied connection";
                            "client" => %header.client_addr,
                            "service_type" => &context.service_type);
                    }
                    Err(e) => break 'conn ConnectionEnd::Fault(e),
                },
                Ok(Some(FramedUnit::Request {
                    envelope,
                    arrived_as_http,
                })) => {
                    if settings.connection_logging {
                        debug!(log, "read request unit";
                            "bytes" => envelope.len(),
                            "http" => arrived_as_http);
                    }
                    let pipeline = Arc::clone(&pipeline);
                    let context = context.clone();
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        pipeline.process(context, envelope, arrived_as_http, tx).await
                    });
                }
            }
        }

        while in_flight.try_join_next().is_some() {}

        // The idle timeout bounds each read, not each unit.
        buf.reserve(READ_BUFFER_SIZE);
        let read = tokio::select! {
            _ = shutdown.changed() => break 'conn ConnectionEnd::Shutdown,
            read = time::timeout(settings.idle_timeout, read_half.read_buf(&mut buf)) => read,
        };

        match read {
            Err(_) => break ConnectionEnd::IdleTimeout,
            Ok(Ok(0)) => break ConnectionEnd::Closed,
            Ok(Ok(_)) => {}
            Ok(Err(e)) if is_closing(&e) => break ConnectionEnd::Closed,
            Ok(Err(e)) => break ConnectionEnd::Fault(FrameError::Io(e)),
        }
    };

    let units = codec.scanner().units();
    match end {
        ConnectionEnd::Closed | ConnectionEnd::Shutdown => {
            while in_flight.join_next().await.is_some() {}
            drop(tx);
            if let Err(e) = writer.await {
                error!(log, "response writer failed"; "err" => %e);
            }
        }
        ConnectionEnd::IdleTimeout => {
            warn!(log, "connection idle, dropping it";
                "timeout_secs" => settings.idle_timeout.as_secs());
            in_flight.abort_all();
            writer.abort();
        }
        ConnectionEnd::Fault(e) => {
            warn!(log, "framing fault, dropping connection"; "err" => %e);
            in_flight.abort_all();
            writer.abort();
        }
    }

    info!(log, "connection closed"; "units" => units);
}

/// Errors that mean the peer is already gone.
fn is_closing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

async fn write_responses(
    write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<OutboundFrame>,
    connection_logging: bool,
    log: Logger,
) {
    let mut sink = FramedWrite::new(write_half, AcmeRpc::new());
    while let Some(frame) = rx.recv().await {
        let bytes = frame.len();
        if let Err(e) = sink.send(frame).await {
            if is_closing(&e) {
                debug!(log, "transport closing, response dropped"; "err" => %e);
            } else {
                warn!(log, "failed to write response"; "err" => %e);
            }
            return;
        }
        if connection_logging {
            debug!(log, "wrote response"; "bytes" => bytes);
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {name} on {address}: {source}")]
    Bind {
        name: String,
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

struct Listener {
    name: String,
    inner: TcpListener,
}

/// All configured listeners plus the pipeline they feed.
pub struct Server {
    listeners: Vec<Listener>,
    pipeline: Arc<Pipeline>,
    connection: ConnectionSettings,
    shutdown_grace: Duration,
    log: Logger,
}

impl Server {
    /// Bind every endpoint in `settings`, then mark the pipeline ready.
    pub async fn bind(settings: &Settings, log: Option<&Logger>) -> Result<Server, ServerError> {
        let log = log
            .cloned()
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
        settings.validate()?;

        let readiness = Readiness::new();
        let pipeline = Arc::new(Pipeline::new(settings.allow_list(), readiness, Some(&log)));

        let mut listeners = Vec::new();
        for (name, address) in settings.endpoint_addrs()? {
            let inner = TcpListener::bind(address)
                .await
                .map_err(|source| ServerError::Bind {
                    name: name.clone(),
                    address,
                    source,
                })?;
            info!(log, "listening for acme requests";
                "endpoint" => &name,
                "address" => %inner.local_addr().unwrap_or(address));
            listeners.push(Listener { name, inner });
        }

        pipeline.readiness().mark_ready();

        Ok(Server {
            listeners,
            pipeline,
            connection: ConnectionSettings::from(settings),
            shutdown_grace: settings.shutdown_grace(),
            log,
        })
    }

    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(|l| l.inner.local_addr()).collect()
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Accept connections until `shutdown` flips (or its sender goes away),
    /// then give open connections the grace period to drain and abort the
    /// rest.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let loops = self.listeners.into_iter().map(|listener| {
            accept_loop(
                listener,
                Arc::clone(&self.pipeline),
                self.connection.clone(),
                shutdown.clone(),
                self.shutdown_grace,
                self.log.clone(),
            )
        });
        futures::future::join_all(loops).await;
        info!(self.log, "server stopped");
    }
}

async fn accept_loop(
    listener: Listener,
    pipeline: Arc<Pipeline>,
    connection: ConnectionSettings,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
    log: Logger,
) {
    let log = log.new(o!("endpoint" => listener.name.clone()));
    let mut stop = shutdown.clone();
    let mut connections = JoinSet::new();

    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.inner.accept() => match accepted {
                Ok((socket, _)) => {
                    connections.spawn(make_task(
                        socket,
                        Arc::clone(&pipeline),
                        connection.clone(),
                        shutdown.clone(),
                        Some(&log),
                    ));
                }
                Err(e) => error!(log, "failed to accept socket"; "err" => %e),
            },
        }
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    info!(log, "no longer accepting connections"; "open" => connections.len());

    let drained = time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(log, "aborting connections that did not drain";
            "open" => connections.len());
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}
