// Copyright 2026 Acme Engineering

//! ACME: an XML RPC protocol carried over raw TCP
//!
//! An ACME gateway accepts plain TCP connections. A connection may open
//! with a PROXY protocol (v1) header from an upstream load balancer, and
//! each request may be shaped as a minimal HTTP request. Inside, every
//! request is an XML envelope:
//!
//! ```text
//! <?Acme version=acme/1.1?><acme>
//!   <seqnum>42</seqnum>
//!   <request>
//!     <method>auth</method>
//!     <oemid>oem</oemid><productid>device</productid><uid>001</uid>
//!     [<uri>...</uri>] [<key>...</key>]* [<limit>N</limit>]
//!   </request>
//! </acme>
//! ```
//!
//! Framing
//!
//! * PROXY header  `PROXY TCP4|TCP6 <client> <proxy> <cport> <pport>\r\n`,
//!                 only as the first unit on a connection.
//!
//! * HTTP wrapper  a request starting with `GET ` or `POST ` and later
//!                 containing `HTTP/1.1\r\n`. Headers are skipped; the
//!                 response gets an HTTP status block.
//!
//! * Envelope      `<?Acme ` or `<acme>` through `</acme>`.
//!
//! Responses carry the request's `seqnum`, a numeric `status` and its
//! `statusmsg`, and the method's payload when the status is 200. See
//! [`status::AcmeStatusCode`] for the full status table.
//!
//! Methods: `auth`, `buildversion` and `uriinfo`.

#![allow(missing_docs)]

pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod methods;
pub mod pipeline;
pub mod protocol;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod status;
