// Copyright 2026 Acme Engineering

//! Caller credentials and their authorization against the allow-list.
//!
//! A credential is the `(oemid, productid, uid)` triple carried inside every
//! request envelope. Credentials compare case-insensitively, field by field,
//! and the allow-list is an ordered set built on that comparison. The list
//! is loaded once at startup and shared read-only between connections.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde_derive::Deserialize;

use crate::status::AcmeStatusCode;

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// An `(oem, device, unique)` identity. The empty string means "absent".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credential {
    oem_id: String,
    device_id: String,
    unique_id: String,
}

impl Credential {
    pub fn new<O, D, U>(oem_id: O, device_id: D, unique_id: U) -> Credential
    where
        O: Into<String>,
        D: Into<String>,
        U: Into<String>,
    {
        Credential {
            oem_id: oem_id.into(),
            device_id: device_id.into(),
            unique_id: unique_id.into(),
        }
    }

    pub fn oem_id(&self) -> &str {
        &self.oem_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

impl Ord for Credential {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ignore_case(&self.oem_id, &other.oem_id)
            .then_with(|| compare_ignore_case(&self.device_id, &other.device_id))
            .then_with(|| compare_ignore_case(&self.unique_id, &other.unique_id))
    }
}

impl PartialOrd for Credential {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Credential {}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.oem_id, self.device_id, self.unique_id)
    }
}

/// The set of credentials allowed to use the gateway.
#[derive(Debug, Clone)]
pub struct AllowList {
    credentials: BTreeSet<Credential>,
}

impl AllowList {
    pub fn new<I>(credentials: I) -> AllowList
    where
        I: IntoIterator<Item = Credential>,
    {
        AllowList {
            credentials: credentials.into_iter().collect(),
        }
    }

    pub fn contains(&self, credential: &Credential) -> bool {
        self.credentials.contains(credential)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        AllowList::new(vec![
            Credential::new("oem", "device", "001"),
            Credential::new("oem", "device", "002"),
        ])
    }
}

/// A credential together with the outcome of checking it.
///
/// The status is decided once, at construction:
///
/// * empty oem id: `InvalidOemId`
/// * empty device id: `InvalidDeviceId`
/// * empty unique id: `Unauthorized`
/// * otherwise `Ok` if the allow-list holds the credential, else
///   `Unauthorized`.
#[derive(Debug, Clone)]
pub struct Authorization {
    credential: Credential,
    status: AcmeStatusCode,
}

impl Authorization {
    pub fn new(credential: Credential, allowed: &AllowList) -> Authorization {
        let status = if credential.oem_id.is_empty() {
            AcmeStatusCode::InvalidOemId
        } else if credential.device_id.is_empty() {
            AcmeStatusCode::InvalidDeviceId
        } else if credential.unique_id.is_empty() {
            AcmeStatusCode::Unauthorized
        } else if allowed.contains(&credential) {
            AcmeStatusCode::Ok
        } else {
            AcmeStatusCode::Unauthorized
        };

        Authorization { credential, status }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn status(&self) -> AcmeStatusCode {
        self.status
    }

    pub fn is_authorized(&self) -> bool {
        self.status.is_ok()
    }
}

impl Ord for Authorization {
    fn cmp(&self, other: &Self) -> Ordering {
        self.credential.cmp(&other.credential)
    }
}

impl PartialOrd for Authorization {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Authorization {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Authorization {}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck::quickcheck;

    fn authorize(oem: &str, device: &str, unique: &str) -> AcmeStatusCode {
        Authorization::new(Credential::new(oem, device, unique), &AllowList::default())
            .status()
    }

    #[test]
    fn status_follows_construction_order() {
        assert_eq!(authorize("", "", ""), AcmeStatusCode::InvalidOemId);
        assert_eq!(authorize("", "device", "001"), AcmeStatusCode::InvalidOemId);
        assert_eq!(authorize("oem", "", "001"), AcmeStatusCode::InvalidDeviceId);
        assert_eq!(authorize("oem", "device", ""), AcmeStatusCode::Unauthorized);
        assert_eq!(authorize("oem", "device", "999"), AcmeStatusCode::Unauthorized);
        assert_eq!(authorize("oem", "device", "001"), AcmeStatusCode::Ok);
        assert_eq!(authorize("oem", "device", "002"), AcmeStatusCode::Ok);
    }

    #[test]
    fn membership_ignores_case() {
        assert_eq!(authorize("OEM", "Device", "001"), AcmeStatusCode::Ok);
        assert_eq!(authorize("oEm", "DEVICE", "002"), AcmeStatusCode::Ok);
    }

    #[test]
    fn ordering_is_field_by_field() {
        let a = Credential::new("a", "z", "z");
        let b = Credential::new("b", "a", "a");
        assert!(a < b);

        let c = Credential::new("same", "a", "z");
        let d = Credential::new("SAME", "b", "a");
        assert!(c < d);

        assert_eq!(Credential::new("x", "y", "z"), Credential::new("X", "Y", "Z"));
    }

    #[test]
    fn authorization_compares_by_credential() {
        let allowed = AllowList::default();
        let ok = Authorization::new(Credential::new("oem", "device", "001"), &allowed);
        let denied = Authorization::new(Credential::new("OEM", "DEVICE", "001"), &AllowList::new(vec![]));
        assert_eq!(ok, denied);
        assert_ne!(ok.status(), denied.status());
    }

    quickcheck! {
        fn prop_compare_is_antisymmetric(a: (String, String, String), b: (String, String, String)) -> bool {
            let x = Credential::new(a.0, a.1, a.2);
            let y = Credential::new(b.0, b.1, b.2);
            x.cmp(&y) == y.cmp(&x).reverse()
        }

        fn prop_membership_ignores_case(flips: Vec<bool>) -> bool {
            let fields = ["oem", "device", "001"];
            let mut flipped = fields.iter().map(|s| s.to_string()).collect::<Vec<_>>();
            for (i, flip) in flips.iter().enumerate().take(3) {
                if *flip {
                    flipped[i] = flipped[i].to_uppercase();
                }
            }
            authorize(&flipped[0], &flipped[1], &flipped[2]) == AcmeStatusCode::Ok
        }
    }
}
