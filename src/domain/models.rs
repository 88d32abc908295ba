use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::format::{beautify_duration, beautify_size};
use super::{ProxyError, Result};

/// First byte of every SOCKS5 client greeting.
pub const SOCKS5_VERSION: u8 = 0x05;

/// Port assumed when a tunnel target carries none.
pub const DEFAULT_TUNNEL_PORT: u16 = 443;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Socks5,
    Http,
}

impl Protocol {
    pub fn from_first_byte(byte: u8) -> Self {
        if byte == SOCKS5_VERSION {
            Protocol::Socks5
        } else {
            Protocol::Http
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Socks5 => "socks5",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `host:port` pair a tunnel is dialed to.
///
/// IPv6 hosts are stored without brackets and rendered with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a CONNECT target such as `example.com:8443`, `example.com` or
    /// `[::1]:22`. A missing port defaults to 443.
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ProxyError::InvalidDestination("empty target".to_string()));
        }

        if let Some(rest) = target.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| ProxyError::InvalidDestination(format!("unterminated IPv6 literal in {}", target)))?;
            if host.is_empty() {
                return Err(ProxyError::InvalidDestination(format!("missing host in {}", target)));
            }
            let port = match tail {
                "" => DEFAULT_TUNNEL_PORT,
                tail => match tail.strip_prefix(':') {
                    Some(port) => parse_port(port, target)?,
                    None => {
                        return Err(ProxyError::InvalidDestination(format!(
                            "unexpected characters after IPv6 literal in {}",
                            target
                        )))
                    }
                },
            };
            return Ok(Self::new(host, port));
        }

        match target.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => Err(ProxyError::InvalidDestination(format!(
                "too many colons in {}",
                target
            ))),
            Some(("", _)) => Err(ProxyError::InvalidDestination(format!("missing host in {}", target))),
            Some((host, port)) => Ok(Self::new(host, parse_port(port, target)?)),
            None => Ok(Self::new(target, DEFAULT_TUNNEL_PORT)),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn parse_port(port: &str, target: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|e| ProxyError::InvalidDestination(format!("invalid port in {}: {}", target, e)))
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Destination {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// How a tunnel decides it is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    /// Wait for both directions, half-closing each writer as its reader drains.
    #[default]
    Symmetric,
    /// Tear the whole session down as soon as either direction finishes.
    Asymmetric,
}

impl FromStr for JoinPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "symmetric" => Ok(JoinPolicy::Symmetric),
            "asymmetric" => Ok(JoinPolicy::Asymmetric),
            other => Err(format!("unknown join policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: uuid::Uuid,
    pub method: String,
    pub target: String,
    pub protocol: Protocol,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
}

impl ConnectionInfo {
    pub fn new(method: String, target: String, protocol: Protocol) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            method,
            target,
            protocol,
            opened_at: Instant::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self) {
        self.closed_at = Some(Instant::now());
    }
}

/// Accounting for one finished tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub destination: Destination,
    pub duration: Duration,
    pub client_to_destination: u64,
    pub destination_to_client: u64,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CLOSE {} after {} ->{} <-{}",
            self.destination,
            beautify_duration(self.duration),
            beautify_size(self.client_to_destination),
            beautify_size(self.destination_to_client)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_defaults_to_tls_port() {
        let dest = Destination::parse("example.com").unwrap();
        assert_eq!(dest.host(), "example.com");
        assert_eq!(dest.port(), 443);
        assert_eq!(dest.to_string(), "example.com:443");
    }

    #[test]
    fn test_destination_with_port() {
        let dest: Destination = "example.com:8080".parse().unwrap();
        assert_eq!(dest, Destination::new("example.com", 8080));
    }

    #[test]
    fn test_destination_ipv6() {
        let dest = Destination::parse("[::1]:2222").unwrap();
        assert_eq!(dest.host(), "::1");
        assert_eq!(dest.port(), 2222);
        assert_eq!(dest.to_string(), "[::1]:2222");

        let dest = Destination::parse("[2001:db8::1]").unwrap();
        assert_eq!(dest.port(), 443);
    }

    #[test]
    fn test_destination_rejects_garbage() {
        assert!(Destination::parse("").is_err());
        assert!(Destination::parse(":80").is_err());
        assert!(Destination::parse("example.com:http").is_err());
        assert!(Destination::parse("example.com:70000").is_err());
        assert!(Destination::parse("::1").is_err());
        assert!(Destination::parse("[::1").is_err());
        assert!(Destination::parse("[::1]x").is_err());
    }

    #[test]
    fn test_protocol_classification() {
        assert_eq!(Protocol::from_first_byte(0x05), Protocol::Socks5);
        assert_eq!(Protocol::from_first_byte(b'C'), Protocol::Http);
        assert_eq!(Protocol::from_first_byte(b'G'), Protocol::Http);
        assert_eq!(Protocol::from_first_byte(0x04), Protocol::Http);
    }

    #[test]
    fn test_join_policy_from_str() {
        assert_eq!("symmetric".parse::<JoinPolicy>().unwrap(), JoinPolicy::Symmetric);
        assert_eq!("Asymmetric".parse::<JoinPolicy>().unwrap(), JoinPolicy::Asymmetric);
        assert!("both".parse::<JoinPolicy>().is_err());
        assert_eq!(JoinPolicy::default(), JoinPolicy::Symmetric);
    }

    #[test]
    fn test_session_report_display() {
        let report = SessionReport {
            destination: Destination::new("example.com", 443),
            duration: Duration::from_millis(1500),
            client_to_destination: 512,
            destination_to_client: 2048,
        };
        assert_eq!(report.to_string(), "CLOSE example.com:443 after 1.50s ->512B <-2.00KB");
    }
}
