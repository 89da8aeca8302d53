// Copyright 2026 Acme Engineering

//! PROXY protocol v1 header parsing.
//!
//! Grammar (as framed by the scanner, CRLF already removed):
//!
//! ```text
//! PROXY <TCP4|TCP6> <client ip> <proxy ip> <client port> <proxy port>
//! ```
//!
//! The protocol tag is case-insensitive and must match the family of both
//! addresses. Ports are one to five digits.
//! Anything else is treated as a garbled header and rejected.

use std::net::IpAddr;
use std::str::FromStr;

use crate::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Tcp4,
    Tcp6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHeader {
    pub protocol: ProxyProtocol,
    pub client_addr: IpAddr,
    pub proxy_addr: IpAddr,
    pub client_port: u16,
    pub proxy_port: u16,
}

impl ProxyProtocol {
    fn matches(self, addr: &IpAddr) -> bool {
        match self {
            ProxyProtocol::Tcp4 => addr.is_ipv4(),
            ProxyProtocol::Tcp6 => addr.is_ipv6(),
        }
    }
}

fn malformed(header: &str) -> FrameError {
    FrameError::MalformedProxyHeader(header.to_string())
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for ProxyHeader {
    type Err = FrameError;

    fn from_str(header: &str) -> Result<ProxyHeader, FrameError> {
        let fields: Vec<&str> = header.split(' ').collect();
        if fields.len() != 6 || fields[0] != "PROXY" {
            return Err(malformed(header));
        }

        let protocol = if fields[1].eq_ignore_ascii_case("TCP4") {
            ProxyProtocol::Tcp4
        } else if fields[1].eq_ignore_ascii_case("TCP6") {
            ProxyProtocol::Tcp6
        } else {
            return Err(malformed(header));
        };

        let client_addr = fields[2].parse::<IpAddr>().map_err(|_| malformed(header))?;
        let proxy_addr = fields[3].parse::<IpAddr>().map_err(|_| malformed(header))?;
        if !protocol.matches(&client_addr) || !protocol.matches(&proxy_addr) {
            return Err(malformed(header));
        }
        let client_port = parse_port(fields[4]).ok_or_else(|| malformed(header))?;
        let proxy_port = parse_port(fields[5]).ok_or_else(|| malformed(header))?;

        Ok(ProxyHeader {
            protocol,
            client_addr,
            proxy_addr,
            client_port,
            proxy_port,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn parses_tcp4() {
        let header: ProxyHeader = "PROXY TCP4 203.0.113.7 10.0.0.1 5555 443".parse().unwrap();
        assert_eq!(header.protocol, ProxyProtocol::Tcp4);
        assert_eq!(header.client_addr, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)));
        assert_eq!(header.proxy_addr, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(header.client_port, 5555);
        assert_eq!(header.proxy_port, 443);
    }

    #[test]
    fn parses_tcp6_with_lowercase_tag() {
        let header: ProxyHeader = "PROXY tcp6 2001:db8::1 ::1 65535 80".parse().unwrap();
        assert_eq!(header.protocol, ProxyProtocol::Tcp6);
        assert_eq!(
            header.client_addr,
            IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))
        );
        assert_eq!(header.proxy_addr, IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(header.proxy_port, 80);
    }

    #[test]
    fn rejects_garbage() {
        let bad = [
            "",
            "PROXY",
            "PROXY UNKNOWN",
            "PROXY UDP4 1.2.3.4 5.6.7.8 1 2",
            "PROXY TCP4 1.2.3 5.6.7.8 1 2",
            "PROXY TCP4 1.2.3.4 5.6.7.8 1",
            "PROXY TCP4 1.2.3.4 5.6.7.8 1 2 3",
            "PROXY TCP4 1.2.3.4 5.6.7.8 123456 2",
            "PROXY TCP4 1.2.3.4 5.6.7.8 99999 2",
            "PROXY TCP4 1.2.3.4 5.6.7.8 +1 2",
            "PROXY  TCP4 1.2.3.4 5.6.7.8 1 2",
            "proxy TCP4 1.2.3.4 5.6.7.8 1 2",
            "PROXY TCP4 ::1 ::1 1 2",
            "PROXY TCP4 1.2.3.4 ::1 1 2",
            "PROXY TCP6 1.2.3.4 ::1 1 2",
        ];
        for header in bad.iter() {
            assert!(
                header.parse::<ProxyHeader>().is_err(),
                "accepted {:?}",
                header
            );
        }
    }
}
