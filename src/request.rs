// Copyright 2026 Acme Engineering

//! Request envelopes.
//!
//! Schema (`acme` root):
//!
//! * `encrypt-type`: optional
//! * `seqnum`: optional, integer text; echoed back in the response
//! * `request`: required
//!     * `method`, `oemid`, `productid`, `uid`: required
//!     * `uri`: optional
//!     * `key`: zero or more
//!     * `limit`: optional, integer text

use std::fmt;
use std::net::IpAddr;
use std::str::{self, FromStr};

use bytes::Bytes;
use serde_derive::Deserialize;

use crate::auth::{AllowList, Authorization, Credential};
use crate::envelope::{self, XmlWriter};
use crate::error::{AcmeFault, EnvelopeError};
use crate::status::AcmeStatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmeMethod {
    Auth,
    BuildVersion,
    UriInfo,
}

impl AcmeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AcmeMethod::Auth => "auth",
            AcmeMethod::BuildVersion => "buildversion",
            AcmeMethod::UriInfo => "uriinfo",
        }
    }
}

impl FromStr for AcmeMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<AcmeMethod, ()> {
        [AcmeMethod::Auth, AcmeMethod::BuildVersion, AcmeMethod::UriInfo]
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

impl fmt::Display for AcmeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// `encrypt-type` and any out-of-band text are accepted and ignored.
#[derive(Debug, Default, Deserialize)]
struct XmlRequestAcme {
    seqnum: Option<String>,
    request: Option<XmlRequest>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlRequest {
    method: Option<String>,
    oemid: Option<String>,
    productid: Option<String>,
    uid: Option<String>,
    uri: Option<String>,
    #[serde(default, rename = "key")]
    keys: Vec<String>,
    limit: Option<String>,
}

impl XmlRequest {
    fn is_empty(&self) -> bool {
        self.method.is_none()
            && self.oemid.is_none()
            && self.productid.is_none()
            && self.uid.is_none()
            && self.uri.is_none()
            && self.keys.is_empty()
            && self.limit.is_none()
    }
}

/// Where a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Logical listener tag, e.g. `tcp-stream-443`.
    pub service_type: String,
    pub remote_addr: IpAddr,
}

/// One decoded request envelope.
#[derive(Debug, Clone)]
pub struct Request {
    pub service_type: String,
    pub remote_addr: IpAddr,
    pub seqnum: Option<i32>,
    pub authorization: Authorization,
    pub raw_method: String,
    /// `None` when `raw_method` names no known method.
    pub method: Option<AcmeMethod>,
    pub uri: Option<String>,
    pub keys: Option<Vec<String>>,
    pub limit: Option<i32>,
    pub raw_request: String,
}

fn parse_int(text: Option<&str>) -> Option<i32> {
    text.and_then(|t| t.trim().parse().ok())
}

fn malformed(message: String) -> AcmeFault {
    AcmeFault::new(AcmeStatusCode::MalformedXml, message)
}

/// Decode one envelope captured by the frame scanner.
///
/// Leading and trailing whitespace in element text is dropped, so
/// `<uid> 001 </uid>` names the same credential as `<uid>001</uid>`.
///
/// The credential is checked as soon as the `request` element has been
/// read; an unauthorized caller still decodes successfully and carries the
/// failed [`Authorization`] on the returned request.
pub fn decode_request(
    context: &RequestContext,
    envelope: &[u8],
    allowed: &AllowList,
) -> Result<Request, AcmeFault> {
    let raw = str::from_utf8(envelope).map_err(|e| {
        malformed("request is not valid UTF-8".to_string()).with_source(e)
    })?;

    let document: XmlRequestAcme = quick_xml::de::from_str(raw).map_err(|e| {
        malformed(format!(
            "failure deserializing a request:\n-------------------\n{}\n-------------------",
            raw
        ))
        .with_source(e)
    })?;

    let seqnum = parse_int(document.seqnum.as_deref());

    let body = match document.request {
        Some(body) if !body.is_empty() => body,
        _ => {
            return Err(malformed(format!(
                "<request> is missing or empty:\n-------------------\n{}\n-------------------",
                raw
            ))
            .with_seqnum(seqnum));
        }
    };

    let authorization = Authorization::new(
        Credential::new(
            body.oemid.clone().unwrap_or_default(),
            body.productid.clone().unwrap_or_default(),
            body.uid.clone().unwrap_or_default(),
        ),
        allowed,
    );

    let missing = [
        ("method", body.method.is_none()),
        ("oemid", body.oemid.is_none()),
        ("productid", body.productid.is_none()),
        ("uid", body.uid.is_none()),
    ]
    .iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| format!("<{}>", name))
    .collect::<Vec<_>>();

    if !missing.is_empty() {
        return Err(malformed(format!(
            "<request> is missing {}:\n-------------------\n{}\n-------------------",
            missing.join(", "),
            raw
        ))
        .with_seqnum(seqnum)
        .with_authorization(Some(authorization))
        .with_raw_method(body.method));
    }

    let raw_method = body.method.unwrap_or_default();
    let method = raw_method.parse().ok();
    let keys = if body.keys.is_empty() {
        None
    } else {
        Some(body.keys)
    };

    Ok(Request {
        service_type: context.service_type.clone(),
        remote_addr: context.remote_addr,
        seqnum,
        authorization,
        raw_method,
        method,
        uri: body.uri,
        keys,
        limit: parse_int(body.limit.as_deref()),
        raw_request: raw.to_string(),
    })
}

/// A request envelope to send, the client side of [`decode_request`].
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope {
    pub seqnum: Option<i32>,
    pub method: String,
    pub credential: Credential,
    pub uri: Option<String>,
    pub keys: Vec<String>,
    pub limit: Option<i32>,
}

impl RequestEnvelope {
    pub fn new<M: Into<String>>(method: M, credential: Credential) -> RequestEnvelope {
        RequestEnvelope {
            method: method.into(),
            credential,
            ..RequestEnvelope::default()
        }
    }

    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        let mut writer = envelope::begin_envelope(self.seqnum)?;
        self.render_request(&mut writer)?;
        envelope::finish_envelope(writer)
    }

    fn render_request(&self, writer: &mut XmlWriter) -> Result<(), EnvelopeError> {
        envelope::start_element(writer, "request")?;
        envelope::write_element(writer, "method", &self.method)?;
        envelope::write_element(writer, "oemid", self.credential.oem_id())?;
        envelope::write_element(writer, "productid", self.credential.device_id())?;
        envelope::write_element(writer, "uid", self.credential.unique_id())?;
        if let Some(uri) = &self.uri {
            envelope::write_element(writer, "uri", uri)?;
        }
        for key in &self.keys {
            envelope::write_element(writer, "key", key)?;
        }
        if let Some(limit) = self.limit {
            envelope::write_element(writer, "limit", &limit.to_string())?;
        }
        envelope::end_element(writer, "request")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::net::Ipv4Addr;

    fn context() -> RequestContext {
        RequestContext {
            service_type: "tcp-stream-2030".to_string(),
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    fn decode(xml: &str) -> Result<Request, AcmeFault> {
        decode_request(&context(), xml.as_bytes(), &AllowList::default())
    }

    #[test]
    fn decodes_scenario_a() {
        let request = decode(
            "<?Acme version=acme/1.1?><acme><seqnum>42</seqnum><request><method>auth</method>\
<oemid>oem</oemid><productid>device</productid><uid>001</uid></request></acme>",
        )
        .unwrap();
        assert_eq!(request.seqnum, Some(42));
        assert_eq!(request.method, Some(AcmeMethod::Auth));
        assert_eq!(request.raw_method, "auth");
        assert_eq!(request.authorization.status(), AcmeStatusCode::Ok);
        assert_eq!(request.service_type, "tcp-stream-2030");
        assert!(request.uri.is_none());
        assert!(request.keys.is_none());
    }

    #[test]
    fn decodes_optional_fields() {
        let request = decode(
            "<acme><encrypt-type>none</encrypt-type><request><method>UriInfo</method>\
<oemid>oem</oemid><productid>device</productid><uid>002</uid><uri>http://a.com/</uri>\
<key>a</key><key>b</key><limit>2</limit></request></acme>",
        )
        .unwrap();
        assert_eq!(request.seqnum, None);
        assert_eq!(request.method, Some(AcmeMethod::UriInfo));
        assert_eq!(request.uri.as_deref(), Some("http://a.com/"));
        assert_eq!(request.keys, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(request.limit, Some(2));
    }

    #[test]
    fn keys_may_be_split_by_other_elements() {
        let request = decode(
            "<acme><request><method>uriinfo</method><key>a</key><oemid>oem</oemid>\
<productid>device</productid><uid>002</uid><uri>http://a/</uri><key>b</key></request></acme>",
        )
        .unwrap();
        assert_eq!(request.keys, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(request.uri.as_deref(), Some("http://a/"));
    }

    #[test]
    fn element_text_is_trimmed() {
        let request = decode(
            "<acme><request><method> auth </method><oemid>oem</oemid>\
<productid>device</productid><uid>\n  001  </uid></request></acme>",
        )
        .unwrap();
        assert_eq!(request.raw_method, "auth");
        assert_eq!(request.authorization.credential().unique_id(), "001");
        assert_eq!(request.authorization.status(), AcmeStatusCode::Ok);
    }

    #[test]
    fn unauthorized_caller_still_decodes() {
        let request = decode(
            "<acme><request><method>auth</method><oemid>oem</oemid>\
<productid>device</productid><uid>999</uid></request></acme>",
        )
        .unwrap();
        assert_eq!(request.authorization.status(), AcmeStatusCode::Unauthorized);
    }

    #[test]
    fn unknown_method_leaves_method_unset() {
        let request = decode(
            "<acme><seqnum>x</seqnum><request><method>reboot</method><oemid>oem</oemid>\
<productid>device</productid><uid>001</uid></request></acme>",
        )
        .unwrap();
        assert_eq!(request.method, None);
        assert_eq!(request.raw_method, "reboot");
        assert_eq!(request.seqnum, None);
    }

    #[test]
    fn missing_method_is_malformed() {
        let fault = decode(
            "<acme><seqnum>5</seqnum><request><oemid>oem</oemid>\
<productid>device</productid><uid>001</uid></request></acme>",
        )
        .unwrap_err();
        assert_eq!(fault.status, Some(AcmeStatusCode::MalformedXml));
        assert_eq!(fault.seqnum, Some(5));
        assert_eq!(
            fault.authorization.map(|a| a.status()),
            Some(AcmeStatusCode::Ok)
        );
        assert!(fault.message.contains("<method>"));
    }

    #[test]
    fn empty_request_is_malformed() {
        for xml in ["<acme><seqnum>9</seqnum><request></request></acme>",
                    "<acme><seqnum>9</seqnum><request/></acme>",
                    "<acme><seqnum>9</seqnum></acme>"].iter() {
            let fault = decode(xml).unwrap_err();
            assert_eq!(fault.status, Some(AcmeStatusCode::MalformedXml));
            assert_eq!(fault.seqnum, Some(9));
        }
    }

    #[test]
    fn broken_xml_is_malformed() {
        let fault = decode("<acme><request><method>auth</request></acme>").unwrap_err();
        assert_eq!(fault.status, Some(AcmeStatusCode::MalformedXml));
        assert!(fault.source.is_some());
        assert!(fault.message.contains("<method>auth"));
    }

    #[test]
    fn method_names_ignore_case() {
        assert_eq!("AUTH".parse(), Ok(AcmeMethod::Auth));
        assert_eq!("BuildVersion".parse(), Ok(AcmeMethod::BuildVersion));
        assert_eq!("uriinfo".parse(), Ok(AcmeMethod::UriInfo));
        assert_eq!("uri".parse::<AcmeMethod>(), Err(()));
    }

    #[test]
    fn encoded_request_decodes() {
        let mut envelope = RequestEnvelope::new("uriinfo", Credential::new("oem", "device", "001"));
        envelope.seqnum = Some(3);
        envelope.uri = Some("http://x/?a=1&b=2".to_string());
        envelope.keys = vec!["k".to_string()];
        envelope.limit = Some(1);
        let bytes = envelope.encode().unwrap();

        let request = decode_request(&context(), &bytes, &AllowList::default()).unwrap();
        assert_eq!(request.seqnum, Some(3));
        assert_eq!(request.method, Some(AcmeMethod::UriInfo));
        assert_eq!(request.uri.as_deref(), Some("http://x/?a=1&b=2"));
        assert_eq!(request.keys, Some(vec!["k".to_string()]));
        assert_eq!(request.limit, Some(1));
    }
}
