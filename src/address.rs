//! Server address parsing and host heuristics.
//!
//! Addresses follow the SQL Server client convention: an optional `tcp:`
//! prefix, a host, an optional `\instance` and an optional `,port`.

use crate::constants::{DEFAULT_PORT, TCP_PREFIX};
use crate::error::ProbeError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Dotted-quad shape only; octets are not range checked.
static IPV4_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$")
        .unwrap_or_else(|e| panic!("Internal error: invalid IPv4 literal pattern: {}", e))
});

/// Whether the host part of `server` looks like an IPv4 literal.
///
/// Instance and port suffixes are ignored. Used only to decide whether to
/// print the certificate naming hint.
pub fn looks_like_ip(server: &str) -> bool {
    let without_instance = server.split('\\').next().unwrap_or_default();
    let host = without_instance.split(',').next().unwrap_or_default().trim();
    IPV4_LITERAL.is_match(host)
}

/// A parsed server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub instance: Option<String>,
    pub port: Option<u16>,
}

impl ServerAddress {
    /// Parse `[tcp:]host[\instance][,port]`.
    pub fn parse(server: &str) -> Result<Self, ProbeError> {
        let trimmed = server.trim();
        let without_prefix = match trimmed.get(..TCP_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(TCP_PREFIX) => &trimmed[TCP_PREFIX.len()..],
            _ => trimmed,
        };

        let (name, port) = match without_prefix.split_once(',') {
            Some((name, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| {
                    ProbeError::config(format!("Invalid port '{}' in server address", port.trim()))
                })?;
                (name, Some(port))
            }
            None => (without_prefix, None),
        };

        let (host, instance) = match name.split_once('\\') {
            Some((host, instance)) if !instance.trim().is_empty() => {
                (host.trim(), Some(instance.trim().to_string()))
            }
            Some((host, _)) => (host.trim(), None),
            None => (name.trim(), None),
        };

        if host.is_empty() {
            return Err(ProbeError::config(format!(
                "Server address '{}' has no host",
                server
            )));
        }

        // "." and "(local)" name the local machine
        let host = match host {
            "." | "(local)" => "localhost",
            other => other,
        };

        Ok(Self {
            host: host.to_string(),
            instance,
            port,
        })
    }

    /// Whether the port has to be looked up through SQL Browser.
    pub fn needs_browser(&self) -> bool {
        self.instance.is_some() && self.port.is_none()
    }

    /// The TCP port to dial when no SQL Browser lookup is needed.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_ip() {
        assert!(looks_like_ip("10.0.0.5"));
        assert!(looks_like_ip("10.0.0.5,1433"));
        assert!(looks_like_ip("10.0.0.5\\SQLEXPRESS"));
        assert!(looks_like_ip(" 10.0.0.5 ,1433"));
        assert!(looks_like_ip("999.1.2.3"));
        assert!(looks_like_ip("999.999.999.999"));
        assert!(!looks_like_ip("sqlhost\\INSTANCE"));
        assert!(!looks_like_ip("sqlhost"));
        assert!(!looks_like_ip("10.0.0"));
        assert!(!looks_like_ip("1234.0.0.1"));
        assert!(!looks_like_ip(""));
    }

    #[test]
    fn test_parse_plain_host() {
        let addr = ServerAddress::parse("sqlhost").unwrap();
        assert_eq!(addr.host, "sqlhost");
        assert_eq!(addr.instance, None);
        assert_eq!(addr.port, None);
        assert_eq!(addr.port_or_default(), 1433);
        assert!(!addr.needs_browser());
    }

    #[test]
    fn test_parse_host_and_port() {
        let addr = ServerAddress::parse("tcp:sqlhost, 14330").unwrap();
        assert_eq!(addr.host, "sqlhost");
        assert_eq!(addr.port, Some(14330));
    }

    #[test]
    fn test_parse_named_instance() {
        let addr = ServerAddress::parse("sqlhost\\SQLEXPRESS").unwrap();
        assert_eq!(addr.instance.as_deref(), Some("SQLEXPRESS"));
        assert!(addr.needs_browser());

        let addr = ServerAddress::parse("sqlhost\\SQLEXPRESS,1500").unwrap();
        assert_eq!(addr.port, Some(1500));
        assert!(!addr.needs_browser());
    }

    #[test]
    fn test_parse_local_aliases() {
        assert_eq!(ServerAddress::parse(".").unwrap().host, "localhost");
        assert_eq!(ServerAddress::parse("(local)").unwrap().host, "localhost");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ServerAddress::parse("sqlhost,notaport").is_err());
        assert!(ServerAddress::parse(",1433").is_err());
        assert!(ServerAddress::parse("").is_err());
    }
}
