// Copyright 2026 Acme Engineering

//! Response envelopes and the encoded wire result.
//!
//! ```text
//! <?Acme version=acme/1.1?><acme>[<seqnum>N</seqnum>]
//!   <response><status>S</status><statusmsg>TEXT</statusmsg>[payload]</response>
//! </acme>
//! ```
//!
//! The payload elements are only written when the status is OK. Error
//! responses never carry more than the status and its fixed description.

use bytes::Bytes;
use serde_derive::{Deserialize, Serialize};

use crate::auth::Authorization;
use crate::envelope::{self, XmlWriter, CONTENT_TYPE_XML};
use crate::error::{AcmeFault, EnvelopeError};
use crate::protocol::OutboundFrame;
use crate::request::Request;
use crate::status::AcmeStatusCode;

/// Something that renders itself into an open XML writer.
pub trait RenderXml {
    fn render_xml(&self, writer: &mut XmlWriter) -> Result<(), EnvelopeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyVersion {
    pub name: String,
    pub version: String,
}

impl RenderXml for AssemblyVersion {
    fn render_xml(&self, writer: &mut XmlWriter) -> Result<(), EnvelopeError> {
        envelope::start_element(writer, "assembly")?;
        envelope::write_element(writer, "name", &self.name)?;
        envelope::write_element(writer, "version", &self.version)?;
        envelope::end_element(writer, "assembly")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfidence {
    #[serde(rename = "catid")]
    pub category_id: i32,
    #[serde(rename = "conf")]
    pub confidence: Option<i32>,
}

impl RenderXml for CategoryConfidence {
    fn render_xml(&self, writer: &mut XmlWriter) -> Result<(), EnvelopeError> {
        envelope::start_element(writer, "cat")?;
        envelope::write_element(writer, "catid", &self.category_id.to_string())?;
        if let Some(confidence) = self.confidence {
            envelope::write_element(writer, "conf", &confidence.to_string())?;
        }
        envelope::end_element(writer, "cat")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    pub expire_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVersionPayload {
    pub os_version: String,
    pub runtime_version: String,
    pub runtime_revision: Option<String>,
    pub assemblies: Vec<AssemblyVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriInfoPayload {
    pub uri: String,
    pub normalized_uri: String,
    pub lcp: String,
    pub matched: String,
    pub keys_matched: String,
    pub categories: Option<Vec<CategoryConfidence>>,
    pub bcri: i32,
    pub all_one_category: bool,
    pub rtap: bool,
}

/// The method-specific part of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Auth(AuthPayload),
    BuildVersion(BuildVersionPayload),
    UriInfo(UriInfoPayload),
}

impl RenderXml for Payload {
    fn render_xml(&self, writer: &mut XmlWriter) -> Result<(), EnvelopeError> {
        match self {
            Payload::Auth(auth) => {
                envelope::write_element(writer, "expiredate", &auth.expire_date)
            }
            Payload::BuildVersion(build) => {
                envelope::write_element(writer, "osversion", &build.os_version)?;
                envelope::write_element(writer, "clrversion", &build.runtime_version)?;
                envelope::write_element(
                    writer,
                    "clrrevision",
                    build.runtime_revision.as_deref().unwrap_or(""),
                )?;
                envelope::start_element(writer, "assemblies")?;
                for assembly in &build.assemblies {
                    assembly.render_xml(writer)?;
                }
                envelope::end_element(writer, "assemblies")
            }
            Payload::UriInfo(info) => {
                envelope::write_element(writer, "uri", &info.uri)?;
                envelope::write_element(writer, "normalizedUri", &info.normalized_uri)?;
                envelope::write_element(writer, "lcp", &info.lcp)?;
                envelope::write_element(writer, "match", &info.matched)?;
                envelope::write_element(writer, "keysMatched", &info.keys_matched)?;
                if let Some(categories) = &info.categories {
                    envelope::start_element(writer, "categories")?;
                    for category in categories {
                        category.render_xml(writer)?;
                    }
                    envelope::end_element(writer, "categories")?;
                }
                envelope::write_element(writer, "bcri", &info.bcri.to_string())?;
                envelope::write_element(writer, "a1cat", envelope::one_zero(info.all_one_category))?;
                envelope::write_element(writer, "rtap", envelope::one_zero(info.rtap))
            }
        }
    }
}

/// Encode a complete response envelope. `payload` is only rendered when
/// `status` is OK.
pub fn encode_response(
    seqnum: Option<i32>,
    status: AcmeStatusCode,
    payload: Option<&Payload>,
) -> Result<Bytes, EnvelopeError> {
    let mut writer = envelope::begin_envelope(seqnum)?;
    envelope::start_element(&mut writer, "response")?;
    envelope::write_element(&mut writer, "status", &status.code().to_string())?;
    envelope::write_element(&mut writer, "statusmsg", status.description())?;
    if status.is_ok() {
        if let Some(payload) = payload {
            payload.render_xml(&mut writer)?;
        }
    }
    envelope::end_element(&mut writer, "response")?;
    envelope::finish_envelope(writer)
}

/// Used when even encoding an error response fails.
const INTERNAL_SERVER_ERROR_ENVELOPE: &[u8] = b"<?Acme version=acme/1.1?><acme><response>\
<status>500</status><statusmsg>Internal Server Error</statusmsg></response></acme>";

/// Per-method details for the outcome log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingInfo {
    pub key: Option<String>,
    pub categories: Option<Vec<i32>>,
    pub bcri: Option<i32>,
}

#[derive(Debug)]
pub enum Outcome {
    Success,
    Error {
        message: String,
        fault: Option<AcmeFault>,
    },
}

/// A fully encoded response plus the request fields needed to log it.
#[derive(Debug)]
pub struct WireResult {
    pub http_status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
    pub http_wrapped: bool,
    pub seqnum: Option<i32>,
    pub authorization: Option<Authorization>,
    pub raw_method: Option<String>,
    pub status: AcmeStatusCode,
    pub outcome: Outcome,
    pub logging: LoggingInfo,
}

fn http_status_for(status: AcmeStatusCode) -> u16 {
    if status == AcmeStatusCode::InternalServerError {
        500
    } else {
        200
    }
}

impl WireResult {
    pub fn success(
        request: &Request,
        payload: &Payload,
        logging: LoggingInfo,
    ) -> Result<WireResult, EnvelopeError> {
        let status = AcmeStatusCode::Ok;
        let body = encode_response(request.seqnum, status, Some(payload))?;
        Ok(WireResult {
            http_status: http_status_for(status),
            content_type: CONTENT_TYPE_XML,
            body,
            http_wrapped: false,
            seqnum: request.seqnum,
            authorization: Some(request.authorization.clone()),
            raw_method: Some(request.raw_method.clone()),
            status,
            outcome: Outcome::Success,
            logging,
        })
    }

    /// An error response.
    ///
    /// An error result must describe a failure: if neither the status nor
    /// the authorization (when there is one) is a failure, this returns an
    /// internal-server-error fault instead.
    pub fn error(
        seqnum: Option<i32>,
        authorization: Option<Authorization>,
        raw_method: Option<String>,
        status: AcmeStatusCode,
        message: String,
        fault: Option<AcmeFault>,
    ) -> Result<WireResult, AcmeFault> {
        let authorized = authorization.as_ref().map_or(true, Authorization::is_authorized);
        if authorized && status.is_ok() {
            return Err(AcmeFault::new(
                AcmeStatusCode::InternalServerError,
                format!("error result must represent a non-{} status", status),
            )
            .with_seqnum(seqnum));
        }

        let body = encode_response(seqnum, status, None)?;
        Ok(WireResult {
            http_status: http_status_for(status),
            content_type: CONTENT_TYPE_XML,
            body,
            http_wrapped: false,
            seqnum,
            authorization,
            raw_method,
            status,
            outcome: Outcome::Error { message, fault },
            logging: LoggingInfo::default(),
        })
    }

    /// Last-resort error result; cannot fail.
    pub fn internal_error(seqnum: Option<i32>, message: String, fault: Option<AcmeFault>) -> WireResult {
        let status = AcmeStatusCode::InternalServerError;
        let body = encode_response(seqnum, status, None)
            .unwrap_or_else(|_| Bytes::from_static(INTERNAL_SERVER_ERROR_ENVELOPE));
        WireResult {
            http_status: http_status_for(status),
            content_type: CONTENT_TYPE_XML,
            body,
            http_wrapped: false,
            seqnum,
            authorization: None,
            raw_method: None,
            status,
            outcome: Outcome::Error { message, fault },
            logging: LoggingInfo::default(),
        }
    }

    pub fn with_http(mut self, http_wrapped: bool) -> WireResult {
        self.http_wrapped = http_wrapped;
        self
    }

    pub fn with_logging(mut self, logging: LoggingInfo) -> WireResult {
        self.logging = logging;
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error { .. })
    }

    /// The bytes to write, including the HTTP head when the request arrived
    /// as HTTP.
    pub fn to_frame(&self) -> OutboundFrame {
        let head = if self.http_wrapped {
            Some(envelope::http_response_head(
                self.http_status,
                self.content_type,
                self.body.len(),
            ))
        } else {
            None
        };
        OutboundFrame {
            head,
            body: self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assemblies {
    #[serde(default, rename = "assembly")]
    pub items: Vec<AssemblyVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    #[serde(default, rename = "cat")]
    pub items: Vec<CategoryConfidence>,
}

/// The `response` element of a decoded response envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub status: u16,
    pub statusmsg: String,
    pub expiredate: Option<String>,
    pub osversion: Option<String>,
    pub clrversion: Option<String>,
    pub clrrevision: Option<String>,
    pub assemblies: Option<Assemblies>,
    pub uri: Option<String>,
    #[serde(rename = "normalizedUri")]
    pub normalized_uri: Option<String>,
    pub lcp: Option<String>,
    #[serde(rename = "match")]
    pub matched: Option<String>,
    #[serde(rename = "keysMatched")]
    pub keys_matched: Option<String>,
    pub categories: Option<Categories>,
    pub bcri: Option<i32>,
    pub a1cat: Option<u8>,
    pub rtap: Option<u8>,
}

/// A decoded response envelope, as seen by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub seqnum: Option<i32>,
    pub response: ResponseBody,
}

impl ResponseEnvelope {
    pub fn status(&self) -> Option<AcmeStatusCode> {
        AcmeStatusCode::from_code(self.response.status)
    }
}

pub fn parse_response(envelope: &[u8]) -> Result<ResponseEnvelope, quick_xml::de::DeError> {
    let text = String::from_utf8_lossy(envelope);
    quick_xml::de::from_str(&text)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use crate::auth::AllowList;
    use crate::request::{decode_request, RequestContext};

    fn request(uid: &str) -> Request {
        let xml = format!(
            "<acme><seqnum>42</seqnum><request><method>auth</method><oemid>oem</oemid>\
<productid>device</productid><uid>{}</uid></request></acme>",
            uid
        );
        let context = RequestContext {
            service_type: "tcp-stream-2030".to_string(),
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        decode_request(&context, xml.as_bytes(), &AllowList::default()).unwrap()
    }

    fn auth_payload() -> Payload {
        Payload::Auth(AuthPayload {
            expire_date: "01-02-2021 23:59:59".to_string(),
        })
    }

    #[test]
    fn success_envelope_is_byte_exact() {
        let result = WireResult::success(&request("001"), &auth_payload(), LoggingInfo::default())
            .unwrap();
        assert_eq!(
            &result.body[..],
            &b"<?Acme version=acme/1.1?><acme><seqnum>42</seqnum><response><status>200</status>\
<statusmsg>OK</statusmsg><expiredate>01-02-2021 23:59:59</expiredate></response></acme>"[..]
        );
        assert_eq!(result.http_status, 200);
        assert!(!result.is_error());
    }

    #[test]
    fn payload_skipped_unless_ok() {
        let body = encode_response(None, AcmeStatusCode::Unauthorized, Some(&auth_payload())).unwrap();
        assert_eq!(
            &body[..],
            &b"<?Acme version=acme/1.1?><acme><response><status>401</status>\
<statusmsg>Unauthorized</statusmsg></response></acme>"[..]
        );
    }

    #[test]
    fn uri_info_payload() {
        let payload = Payload::UriInfo(UriInfoPayload {
            uri: "http://a/".to_string(),
            normalized_uri: "http://a/".to_string(),
            lcp: "http://a/".to_string(),
            matched: "http://a/".to_string(),
            keys_matched: String::new(),
            categories: Some(vec![
                CategoryConfidence { category_id: 3, confidence: Some(70) },
                CategoryConfidence { category_id: 4, confidence: None },
            ]),
            bcri: 40,
            all_one_category: true,
            rtap: false,
        });
        let body = encode_response(Some(1), AcmeStatusCode::Ok, Some(&payload)).unwrap();
        let parsed = parse_response(&body).unwrap();
        assert_eq!(parsed.response.bcri, Some(40));
        assert_eq!(parsed.response.a1cat, Some(1));
        assert_eq!(parsed.response.rtap, Some(0));
        assert_eq!(parsed.response.normalized_uri.as_deref(), Some("http://a/"));
        let categories = parsed.response.categories.unwrap().items;
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].confidence, Some(70));
        assert_eq!(categories[1].confidence, None);
    }

    #[test]
    fn error_result_requires_a_failure() {
        let authorized = request("001").authorization;
        let fault = WireResult::error(
            Some(1),
            Some(authorized.clone()),
            None,
            AcmeStatusCode::Ok,
            "nothing wrong".to_string(),
            None,
        )
        .unwrap_err();
        assert_eq!(fault.status, Some(AcmeStatusCode::InternalServerError));

        assert!(WireResult::error(None, None, None, AcmeStatusCode::Ok, String::new(), None).is_err());

        let result = WireResult::error(
            Some(1),
            Some(authorized),
            None,
            AcmeStatusCode::InternalServerError,
            "boom".to_string(),
            None,
        )
        .unwrap();
        assert_eq!(result.http_status, 500);
        assert!(result.is_error());
    }

    #[test]
    fn failed_authorization_allows_ok_status() {
        let denied = request("999").authorization;
        assert!(WireResult::error(None, Some(denied), None, AcmeStatusCode::Ok, String::new(), None).is_ok());
    }

    #[test]
    fn http_head_is_prepended_when_wrapped() {
        let result = WireResult::success(&request("001"), &auth_payload(), LoggingInfo::default())
            .unwrap()
            .with_http(true);
        let frame = result.to_frame();
        let head = frame.head.unwrap();
        let expected = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/xml\r\nContent-Length: {}\r\n\
Server: acme.com\r\nConnection: Keep-Alive\r\n\r\n",
            result.body.len()
        );
        assert_eq!(&head[..], expected.as_bytes());
        assert_eq!(frame.body, result.body);
    }

    #[test]
    fn error_envelope_round_trips_status() {
        let result = WireResult::error(
            Some(8),
            None,
            None,
            AcmeStatusCode::MalformedXml,
            "bad".to_string(),
            None,
        )
        .unwrap();
        let parsed = parse_response(&result.body).unwrap();
        assert_eq!(parsed.status(), Some(AcmeStatusCode::MalformedXml));
        assert_eq!(parsed.seqnum, Some(8));
        assert_eq!(parsed.response.statusmsg, "Malformed XML");
        assert_eq!(parsed.response.expiredate, None);
    }

    #[test]
    fn success_envelope_recovers_seqnum_through_request_decoder() {
        let result = WireResult::success(&request("001"), &auth_payload(), LoggingInfo::default())
            .unwrap();
        let context = RequestContext {
            service_type: "tcp-stream-2030".to_string(),
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        let fault = decode_request(&context, &result.body, &AllowList::default()).unwrap_err();
        assert_eq!(fault.seqnum, Some(42));
        assert_eq!(parse_response(&result.body).unwrap().seqnum, Some(42));
    }

    #[test]
    fn build_version_renders_assemblies() {
        let payload = Payload::BuildVersion(BuildVersionPayload {
            os_version: "linux x86_64".to_string(),
            runtime_version: "0.1.0".to_string(),
            runtime_revision: None,
            assemblies: vec![AssemblyVersion {
                name: "acme-gateway".to_string(),
                version: "0.1.0".to_string(),
            }],
        });
        let body = encode_response(None, AcmeStatusCode::Ok, Some(&payload)).unwrap();
        let parsed = parse_response(&body).unwrap();
        assert_eq!(parsed.response.osversion.as_deref(), Some("linux x86_64"));
        assert_eq!(
            parsed.response.assemblies.unwrap().items,
            vec![AssemblyVersion {
                name: "acme-gateway".to_string(),
                version: "0.1.0".to_string(),
            }]
        );
    }
}
