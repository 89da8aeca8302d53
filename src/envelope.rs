// Copyright 2026 Acme Engineering

//! Shared pieces of the ACME XML envelope.
//!
//! Every envelope, request or response, has the same shell:
//!
//! ```text
//! <?Acme version=acme/1.1?><acme>[<seqnum>N</seqnum>] ... </acme>
//! ```

use bytes::Bytes;
use quick_xml::events::{BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::EnvelopeError;

pub const PROCESSING_INSTRUCTION_NAME: &str = "Acme";
pub const PROCESSING_INSTRUCTION_TEXT: &str = "version=acme/1.1";
pub const ROOT_ELEMENT: &str = "acme";
pub const CONTENT_TYPE_XML: &str = "application/xml";

pub(crate) type XmlWriter = Writer<Vec<u8>>;

pub(crate) fn begin_envelope(seqnum: Option<i32>) -> Result<XmlWriter, EnvelopeError> {
    let mut writer = Writer::new(Vec::new());
    let instruction = format!(
        "{} {}",
        PROCESSING_INSTRUCTION_NAME, PROCESSING_INSTRUCTION_TEXT
    );
    writer.write_event(Event::PI(BytesPI::new(instruction.as_str())))?;
    start_element(&mut writer, ROOT_ELEMENT)?;
    if let Some(seqnum) = seqnum {
        write_element(&mut writer, "seqnum", &seqnum.to_string())?;
    }
    Ok(writer)
}

pub(crate) fn finish_envelope(mut writer: XmlWriter) -> Result<Bytes, EnvelopeError> {
    end_element(&mut writer, ROOT_ELEMENT)?;
    Ok(Bytes::from(writer.into_inner()))
}

pub(crate) fn start_element(writer: &mut XmlWriter, name: &str) -> Result<(), EnvelopeError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

pub(crate) fn end_element(writer: &mut XmlWriter, name: &str) -> Result<(), EnvelopeError> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// `<name>text</name>`, with `text` escaped.
pub(crate) fn write_element(
    writer: &mut XmlWriter,
    name: &str,
    text: &str,
) -> Result<(), EnvelopeError> {
    start_element(writer, name)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end_element(writer, name)
}

pub(crate) fn one_zero(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn reason_phrase(http_status: u16) -> &'static str {
    match http_status {
        200 => "OK",
        400 => "Bad Request",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// The status line and headers that precede an XML body when the request
/// arrived as HTTP.
pub fn http_response_head(http_status: u16, content_type: &str, content_length: usize) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nServer: acme.com\r\nConnection: Keep-Alive\r\n\r\n",
        http_status,
        reason_phrase(http_status),
        content_type,
        content_length
    ))
}

/// Request line and headers for sending an envelope as an HTTP POST.
pub fn http_request_head(path: &str, host: &str, content_length: usize) -> Bytes {
    Bytes::from(format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        path, host, CONTENT_TYPE_XML, content_length
    ))
}
