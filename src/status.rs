// Copyright 2026 Acme Engineering

//! ACME status codes.
//!
//! The numeric values are part of the wire contract: they are written into
//! the `<status>` element of every response and must never be renumbered.

use std::fmt;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, ToPrimitive,
)]
pub enum AcmeStatusCode {
    Undefined = 0,
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    UnsupportedProtocol = 402,
    MalformedUrl = 403,
    MalformedXml = 405,
    RequestTimeout = 408,
    InvalidMethod = 409,
    LicenseInUse = 497,
    LicenseExceeded = 499,
    InternalServerError = 500,
    NotImplemented = 501,
    ServerNotAvailable = 503,
    InvalidStateCondition = 551,
    ServerBusy = 590,
    UnsupportedAcmeVersion = 591,
    InvalidOem = 601,
    InvalidProduct = 602,
    LicenseExpired = 603,
    LicenseNotSupported = 604,
    InvalidOemId = 605,
    InvalidDeviceId = 606,
    InactiveAccount = 607,
    InvalidUniqueIdFormat = 608,
    NoUpdateAvailable = 701,
    InvalidMajorVersion = 702,
    InvalidMinorVersion = 703,
    InvalidMajorOrMinorVersion = 704,
    InvalidRtuVersion = 705,
    NoRtuAvailable = 706,
    NoNewGeoAvailable = 707,
}

impl AcmeStatusCode {
    /// The fixed human-readable text sent as `<statusmsg>`.
    pub fn description(self) -> &'static str {
        match self {
            AcmeStatusCode::Undefined => "Undefined",
            AcmeStatusCode::Ok => "OK",
            AcmeStatusCode::BadRequest => "Bad Request",
            AcmeStatusCode::Unauthorized => "Unauthorized",
            AcmeStatusCode::UnsupportedProtocol => "Unsupported Protocol",
            AcmeStatusCode::MalformedUrl => "Malformed URL",
            AcmeStatusCode::MalformedXml => "Malformed XML",
            AcmeStatusCode::RequestTimeout => "Request Timeout",
            AcmeStatusCode::InvalidMethod => "Invalid Method",
            AcmeStatusCode::LicenseInUse => "License In Use",
            AcmeStatusCode::LicenseExceeded => "License Exceeded",
            AcmeStatusCode::InternalServerError => "Internal Server Error",
            AcmeStatusCode::NotImplemented => "Not Implemented",
            AcmeStatusCode::ServerNotAvailable => "Server Not Available",
            AcmeStatusCode::InvalidStateCondition => "Invalid State Condition",
            AcmeStatusCode::ServerBusy => "Server Busy",
            AcmeStatusCode::UnsupportedAcmeVersion => "Unsupported ACME Version",
            AcmeStatusCode::InvalidOem => "Invalid OEM",
            AcmeStatusCode::InvalidProduct => "Invalid Product",
            AcmeStatusCode::LicenseExpired => "License Expired",
            AcmeStatusCode::LicenseNotSupported => "License Not Supported",
            AcmeStatusCode::InvalidOemId => "Invalid OEM Id",
            AcmeStatusCode::InvalidDeviceId => "Invalid Device Id",
            AcmeStatusCode::InactiveAccount => "Inactive Account",
            AcmeStatusCode::InvalidUniqueIdFormat => "Invalid UID Format",
            AcmeStatusCode::NoUpdateAvailable => "No update available",
            AcmeStatusCode::InvalidMajorVersion => "Invalid major version",
            AcmeStatusCode::InvalidMinorVersion => "Invalid minor version",
            AcmeStatusCode::InvalidMajorOrMinorVersion => {
                "Invalid major or minor version"
            }
            AcmeStatusCode::InvalidRtuVersion => "Invalid RTU Version",
            AcmeStatusCode::NoRtuAvailable => "No RTU available",
            AcmeStatusCode::NoNewGeoAvailable => "No new GEO available",
        }
    }

    pub fn code(self) -> u16 {
        // Every discriminant fits in a u16.
        ToPrimitive::to_u16(&self).unwrap_or(0)
    }

    pub fn from_code(code: u16) -> Option<AcmeStatusCode> {
        FromPrimitive::from_u16(code)
    }

    pub fn is_ok(self) -> bool {
        self == AcmeStatusCode::Ok
    }

    /// Statuses that describe a rejected caller rather than a server or
    /// protocol problem. They are logged as warnings, not errors.
    pub fn is_authorization_failure(self) -> bool {
        matches!(
            self,
            AcmeStatusCode::InvalidDeviceId
                | AcmeStatusCode::InvalidOem
                | AcmeStatusCode::InvalidOemId
                | AcmeStatusCode::InvalidProduct
                | AcmeStatusCode::InvalidUniqueIdFormat
                | AcmeStatusCode::LicenseExceeded
                | AcmeStatusCode::LicenseExpired
                | AcmeStatusCode::LicenseInUse
                | AcmeStatusCode::LicenseNotSupported
                | AcmeStatusCode::Unauthorized
        )
    }
}

impl Default for AcmeStatusCode {
    fn default() -> Self {
        AcmeStatusCode::Undefined
    }
}

impl fmt::Display for AcmeStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.description())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(AcmeStatusCode::Ok.code(), 200);
        assert_eq!(AcmeStatusCode::MalformedXml.code(), 405);
        assert_eq!(AcmeStatusCode::InvalidMethod.code(), 409);
        assert_eq!(AcmeStatusCode::InvalidUniqueIdFormat.code(), 608);
        assert_eq!(AcmeStatusCode::NoNewGeoAvailable.code(), 707);
    }

    #[test]
    fn from_code_rejects_unknown_values() {
        assert_eq!(
            AcmeStatusCode::from_code(401),
            Some(AcmeStatusCode::Unauthorized)
        );
        assert_eq!(AcmeStatusCode::from_code(404), None);
        assert_eq!(AcmeStatusCode::from_code(0), Some(AcmeStatusCode::Undefined));
    }

    #[test]
    fn display_includes_code_and_text() {
        assert_eq!(
            AcmeStatusCode::InternalServerError.to_string(),
            "500 Internal Server Error"
        );
    }

    #[test]
    fn authorization_failures() {
        assert!(AcmeStatusCode::Unauthorized.is_authorization_failure());
        assert!(AcmeStatusCode::InvalidOemId.is_authorization_failure());
        assert!(!AcmeStatusCode::MalformedXml.is_authorization_failure());
        assert!(!AcmeStatusCode::Ok.is_authorization_failure());
    }
}
