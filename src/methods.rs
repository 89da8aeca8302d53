// Copyright 2026 Acme Engineering

//! The RPC method bodies.
//!
//! These are placeholders for the real backends: each one waits a few
//! milliseconds to stand in for a backend call and returns a fixed result.
//! None of them run when the caller's authorization failed; the failed
//! status is handed back as the method result instead.

use std::env::consts;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::time;

use crate::auth::Authorization;
use crate::response::{
    AssemblyVersion, AuthPayload, BuildVersionPayload, CategoryConfidence, LoggingInfo, Payload,
    UriInfoPayload,
};
use crate::status::AcmeStatusCode;

/// A method that ran but did not succeed. The status is never OK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodError {
    pub status: AcmeStatusCode,
    pub message: String,
}

impl MethodError {
    pub fn new(status: AcmeStatusCode) -> MethodError {
        MethodError {
            status,
            message: status.description().to_string(),
        }
    }
}

pub type MethodResult<T> = Result<T, MethodError>;

#[derive(Debug)]
pub struct MethodOutcome {
    pub payload: MethodResult<Payload>,
    pub logging: LoggingInfo,
}

const CATEGORIES: [(i32, i32); 3] = [(3, 70), (45, 23), (78, 90)];
const BCRI: i32 = 40;

async fn backend_latency() {
    let millis = rand::thread_rng().gen_range(3..5);
    time::sleep(Duration::from_millis(millis)).await;
}

fn check(authorization: &Authorization) -> MethodResult<()> {
    if authorization.is_authorized() {
        Ok(())
    } else {
        Err(MethodError::new(authorization.status()))
    }
}

/// `auth`: the credential's license expires at the end of tomorrow (UTC).
pub async fn auth(authorization: &Authorization) -> MethodOutcome {
    backend_latency().await;

    let logging = LoggingInfo {
        key: Some(authorization.credential().to_string()),
        ..LoggingInfo::default()
    };

    let payload = check(authorization).map(|_| {
        let tomorrow = Utc::now().date_naive() + ChronoDuration::days(1);
        Payload::Auth(AuthPayload {
            expire_date: tomorrow.format("%m-%d-%Y 23:59:59").to_string(),
        })
    });

    MethodOutcome { payload, logging }
}

/// `buildversion`: platform and crate version.
pub async fn build_version(authorization: &Authorization) -> MethodOutcome {
    backend_latency().await;

    let payload = check(authorization).map(|_| {
        Payload::BuildVersion(BuildVersionPayload {
            os_version: format!("{} {}", consts::OS, consts::ARCH),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            runtime_revision: None,
            assemblies: vec![AssemblyVersion {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }],
        })
    });

    MethodOutcome {
        payload,
        logging: LoggingInfo::default(),
    }
}

/// `uriinfo`: a static classification of `uri`.
pub async fn uri_info(
    authorization: &Authorization,
    uri: &str,
    keys: Option<&[String]>,
    limit: Option<i32>,
) -> MethodOutcome {
    backend_latency().await;

    let mut logging = LoggingInfo {
        key: Some(uri.to_string()),
        ..LoggingInfo::default()
    };

    if let Err(e) = check(authorization) {
        return MethodOutcome {
            payload: Err(e),
            logging,
        };
    }

    let normalized = normalize_uri(uri);
    let keys_matched = keys
        .unwrap_or(&[])
        .iter()
        .filter(|key| !key.is_empty() && normalized.contains(&key.to_lowercase()))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",");

    let take = match limit {
        Some(limit) if limit >= 0 => limit as usize,
        _ => CATEGORIES.len(),
    };
    let categories: Vec<CategoryConfidence> = CATEGORIES
        .iter()
        .take(take)
        .map(|&(category_id, confidence)| CategoryConfidence {
            category_id,
            confidence: Some(confidence),
        })
        .collect();

    logging.categories = Some(categories.iter().map(|c| c.category_id).collect());
    logging.bcri = Some(BCRI);

    MethodOutcome {
        payload: Ok(Payload::UriInfo(UriInfoPayload {
            uri: uri.to_string(),
            normalized_uri: normalized.clone(),
            lcp: normalized.clone(),
            matched: normalized,
            keys_matched,
            categories: Some(categories),
            bcri: BCRI,
            all_one_category: false,
            rtap: false,
        })),
        logging,
    }
}

/// Trim the URI and lowercase its scheme and host. Path and query are left
/// as they are.
pub fn normalize_uri(uri: &str) -> String {
    let uri = uri.trim();
    let (scheme, rest) = match uri.find("://") {
        Some(idx) => (Some(&uri[..idx]), &uri[idx + 3..]),
        None => (None, uri),
    };
    let host_end = rest.find(|c: char| c == '/' || c == '?' || c == '#').unwrap_or(rest.len());
    let (host, tail) = rest.split_at(host_end);

    let mut out = String::with_capacity(uri.len());
    if let Some(scheme) = scheme {
        out.push_str(&scheme.to_ascii_lowercase());
        out.push_str("://");
    }
    out.push_str(&host.to_ascii_lowercase());
    out.push_str(tail);
    out
}
