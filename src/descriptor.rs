//! Connection descriptor building and serialization.
//!
//! The descriptor is derived from `Settings` once per probe. Building never
//! fails: options that cannot be applied are dropped and reported as
//! warnings, and everything else is passed through verbatim for the driver
//! to judge.

use crate::config::{EncryptMode, Settings, TriState};
use crate::credentials::Credentials;
use crate::error::ProbeError;
use crate::redact::redact_connection_string;
use std::fmt;
use std::time::Duration;

/// How the probe authenticates.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Host/OS trust, no credentials carried.
    Integrated,
    /// SQL login.
    Credentialed(Credentials),
}

impl AuthMode {
    pub fn is_integrated(&self) -> bool {
        matches!(self, AuthMode::Integrated)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            AuthMode::Integrated => None,
            AuthMode::Credentialed(credentials) => Some(credentials),
        }
    }
}

/// TLS sub-options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    pub trust_server_certificate: TriState,
    pub encrypt: Option<EncryptMode>,
    pub host_name_in_certificate: Option<String>,
    pub transparent_network_ip_resolution: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            trust_server_certificate: TriState::Unset,
            encrypt: None,
            host_name_in_certificate: None,
            transparent_network_ip_resolution: true,
        }
    }
}

/// Identity reported to the server for session tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub workstation_id: String,
    pub application_name: String,
}

impl ClientIdentity {
    /// Identity of the running process.
    pub fn current() -> Self {
        Self {
            workstation_id: local_hostname(),
            application_name: format!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

fn local_hostname() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Everything needed to open one probe connection.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub data_source: String,
    pub auth: AuthMode,
    pub initial_catalog: Option<String>,
    pub connect_timeout: Duration,
    pub failover_partner: Option<String>,
    pub multi_subnet_failover: bool,
    pub identity: ClientIdentity,
    pub tls: TlsOptions,
}

/// Option dropped while building a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorWarning {
    InvalidEncrypt(String),
}

impl fmt::Display for DescriptorWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorWarning::InvalidEncrypt(value) => write!(
                f,
                "Invalid --encrypt value '{}'. Use true|false|strict. Ignoring.",
                value
            ),
        }
    }
}

/// A descriptor together with the options that were dropped.
#[derive(Debug, Clone)]
pub struct Built {
    pub descriptor: ConnectionDescriptor,
    pub warnings: Vec<DescriptorWarning>,
}

/// Build a descriptor from settings and resolved credentials.
pub fn build(settings: &Settings, credentials: &Credentials, identity: ClientIdentity) -> Built {
    let mut warnings = Vec::new();

    let auth = if credentials.has_username() {
        AuthMode::Credentialed(credentials.clone())
    } else {
        AuthMode::Integrated
    };

    let encrypt = match settings.tls.encrypt.as_deref() {
        Some(raw) if !raw.trim().is_empty() => match EncryptMode::parse(raw) {
            Some(mode) => Some(mode),
            None => {
                warnings.push(DescriptorWarning::InvalidEncrypt(raw.to_string()));
                None
            }
        },
        _ => None,
    };

    let host_name_in_certificate = settings
        .tls
        .host_name_in_certificate
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from);

    let descriptor = ConnectionDescriptor {
        data_source: settings.server.clone(),
        auth,
        initial_catalog: settings.target_database().map(String::from),
        connect_timeout: settings.connect_timeout(),
        failover_partner: settings.failover_partner.clone(),
        multi_subnet_failover: settings.multi_subnet_failover,
        identity,
        tls: TlsOptions {
            trust_server_certificate: settings.tls.trust_server_certificate,
            encrypt,
            host_name_in_certificate,
            transparent_network_ip_resolution: !settings.tls.disable_tnir,
        },
    };

    Built {
        descriptor,
        warnings,
    }
}

impl ConnectionDescriptor {
    /// Key/value pairs in connection string order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(&str, String)> = vec![("Data Source", self.data_source.clone())];

        if let Some(partner) = &self.failover_partner {
            pairs.push(("Failover Partner", partner.clone()));
        }
        if let Some(catalog) = &self.initial_catalog {
            pairs.push(("Initial Catalog", catalog.clone()));
        }

        pairs.push(("Integrated Security", bool_value(self.auth.is_integrated())));
        if let Some(credentials) = self.auth.credentials() {
            pairs.push(("User ID", credentials.username.clone()));
            pairs.push(("Password", credentials.password.as_str().to_string()));
        }

        pairs.push(("Connect Timeout", self.connect_timeout.as_secs().to_string()));

        if let Some(encrypt) = self.tls.encrypt {
            pairs.push(("Encrypt", encrypt.to_string()));
        }
        if let Some(trust) = self.tls.trust_server_certificate.as_option() {
            pairs.push(("Trust Server Certificate", bool_value(trust)));
        }
        if let Some(name) = &self.tls.host_name_in_certificate {
            pairs.push(("Host Name In Certificate", name.clone()));
        }
        if !self.tls.transparent_network_ip_resolution {
            pairs.push(("Transparent Network IP Resolution", bool_value(false)));
        }

        pairs.push(("Multi Subnet Failover", bool_value(self.multi_subnet_failover)));
        pairs.push(("Application Name", self.identity.application_name.clone()));
        pairs.push(("Workstation ID", self.identity.workstation_id.clone()));

        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    /// Serialize to an ADO.NET style connection string. Contains the password.
    pub fn to_connection_string(&self) -> String {
        format_connection_string(&self.pairs())
    }

    /// Display-safe rendering with the password masked.
    pub fn redacted(&self) -> String {
        redact_connection_string(&self.to_connection_string())
    }
}

fn bool_value(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

/// Join pairs into `Key=Value;Key=Value`, quoting values where needed.
pub fn format_connection_string(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, quote_value(value)))
        .collect::<Vec<_>>()
        .join(";")
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.contains(';')
        || value.contains('"')
        || value.contains('\'')
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);

    if !needs_quotes {
        value.to_string()
    } else if value.contains('"') && !value.contains('\'') {
        format!("'{}'", value)
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}

/// Parse a connection string into key/value pairs, preserving order.
///
/// Values may be wrapped in single or double quotes, with the quote doubled
/// inside. Empty segments are skipped.
pub fn parse_connection_string(input: &str) -> Result<Vec<(String, String)>, ProbeError> {
    let mut pairs = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(after) = rest.strip_prefix(';') {
            rest = after;
            continue;
        }

        let eq = rest
            .find('=')
            .ok_or_else(|| ProbeError::config("Connection string segment has no '='"))?;
        let key = rest[..eq].trim();
        if key.is_empty() || key.contains(';') {
            return Err(ProbeError::config("Connection string segment has no key"));
        }
        rest = rest[eq + 1..].trim_start();

        let value = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let (value, after) = read_quoted(&rest[1..], quote)?;
                rest = after.trim_start();
                match rest.chars().next() {
                    None => {}
                    Some(';') => rest = &rest[1..],
                    Some(_) => {
                        return Err(ProbeError::config(
                            "Unexpected text after quoted connection string value",
                        ))
                    }
                }
                value
            }
            _ => {
                let end = rest.find(';').unwrap_or(rest.len());
                let value = rest[..end].trim_end().to_string();
                rest = rest.get(end + 1..).unwrap_or_default();
                value
            }
        };

        pairs.push((key.to_string(), value));
    }

    Ok(pairs)
}

fn read_quoted(input: &str, quote: char) -> Result<(String, &str), ProbeError> {
    let mut value = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c == quote {
            if matches!(chars.peek(), Some(&(_, next)) if next == quote) {
                value.push(quote);
                chars.next();
                continue;
            }
            return Ok((value, &input[idx + c.len_utf8()..]));
        }
        value.push(c);
    }

    Err(ProbeError::config("Unterminated quoted connection string value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ClientIdentity {
        ClientIdentity {
            workstation_id: "WS01".to_string(),
            application_name: "sqlping test".to_string(),
        }
    }

    fn build_with(settings: &Settings, username: &str, password: &str) -> Built {
        build(settings, &Credentials::new(username, password), identity())
    }

    #[test]
    fn test_empty_username_selects_integrated_auth() {
        let settings = Settings::new("sqlhost");
        let built = build_with(&settings, "", "ignored");

        assert!(built.descriptor.auth.is_integrated());
        assert!(built.descriptor.auth.credentials().is_none());
        let conn = built.descriptor.to_connection_string();
        assert!(conn.contains("Integrated Security=True"));
        assert!(!conn.contains("Password"));
        assert!(!conn.contains("ignored"));
    }

    #[test]
    fn test_username_selects_credentialed_auth() {
        let settings = Settings::new("sqlhost");
        let built = build_with(&settings, "sa", "p@ss");

        let credentials = built.descriptor.auth.credentials().unwrap();
        assert_eq!(credentials.username, "sa");
        assert_eq!(credentials.password.as_str(), "p@ss");
        assert!(built
            .descriptor
            .to_connection_string()
            .contains("Integrated Security=False;User ID=sa;Password=p@ss"));
    }

    #[test]
    fn test_plain_fields_map_through() {
        let mut settings = Settings::new("sqlhost,1500");
        settings.database = "sales".to_string();
        settings.timeout_secs = 7;
        settings.failover_partner = Some("mirror".to_string());
        settings.multi_subnet_failover = true;

        let d = build_with(&settings, "", "").descriptor;
        assert_eq!(d.data_source, "sqlhost,1500");
        assert_eq!(d.initial_catalog.as_deref(), Some("sales"));
        assert_eq!(d.connect_timeout, Duration::from_secs(7));
        assert_eq!(d.failover_partner.as_deref(), Some("mirror"));
        assert!(d.multi_subnet_failover);
        assert_eq!(d.identity, identity());
    }

    #[test]
    fn test_encrypt_accepted_case_insensitively() {
        for (raw, expected) in [
            ("true", EncryptMode::True),
            ("FALSE", EncryptMode::False),
            ("Strict", EncryptMode::Strict),
        ] {
            let mut settings = Settings::new("sqlhost");
            settings.tls.encrypt = Some(raw.to_string());
            let built = build_with(&settings, "", "");
            assert_eq!(built.descriptor.tls.encrypt, Some(expected));
            assert!(built.warnings.is_empty());
        }
    }

    #[test]
    fn test_invalid_encrypt_dropped_with_warning() {
        let mut settings = Settings::new("sqlhost");
        settings.tls.encrypt = Some("maybe".to_string());
        let built = build_with(&settings, "", "");

        assert_eq!(built.descriptor.tls.encrypt, None);
        assert_eq!(
            built.warnings,
            vec![DescriptorWarning::InvalidEncrypt("maybe".to_string())]
        );
        assert!(!built.descriptor.to_connection_string().contains("Encrypt="));
    }

    #[test]
    fn test_tls_options_carried() {
        let mut settings = Settings::new("10.0.0.5");
        settings.tls.trust_server_certificate = TriState::False;
        settings.tls.host_name_in_certificate = Some("sql.corp.example".to_string());
        settings.tls.disable_tnir = true;

        let d = build_with(&settings, "", "").descriptor;
        assert_eq!(d.tls.trust_server_certificate, TriState::False);
        assert_eq!(
            d.tls.host_name_in_certificate.as_deref(),
            Some("sql.corp.example")
        );
        assert!(!d.tls.transparent_network_ip_resolution);

        let conn = d.to_connection_string();
        assert!(conn.contains("Trust Server Certificate=False"));
        assert!(conn.contains("Host Name In Certificate=sql.corp.example"));
        assert!(conn.contains("Transparent Network IP Resolution=False"));
    }

    #[test]
    fn test_unset_tls_options_omitted() {
        let conn = build_with(&Settings::new("sqlhost"), "", "")
            .descriptor
            .to_connection_string();
        assert!(!conn.contains("Trust Server Certificate"));
        assert!(!conn.contains("Transparent Network IP Resolution"));
    }

    #[test]
    fn test_serialized_form_parses_back() {
        let mut settings = Settings::new("sqlhost\\INST");
        settings.database = "db;with'quotes".to_string();
        let d = build_with(&settings, "sa", " pa\"ss; ").descriptor;

        let parsed = parse_connection_string(&d.to_connection_string()).unwrap();
        assert_eq!(parsed, d.pairs());
    }

    #[test]
    fn test_parse_quoted_values() {
        let parsed =
            parse_connection_string("Server = a ; Password=\"x\"\"y;z\";;Name='it''s'").unwrap();
        assert_eq!(
            parsed,
            vec![
                ("Server".to_string(), "a".to_string()),
                ("Password".to_string(), "x\"y;z".to_string()),
                ("Name".to_string(), "it's".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_connection_string("Server=a;garbage").is_err());
        assert!(parse_connection_string("Password=\"open").is_err());
        assert!(parse_connection_string("Password=\"x\" tail").is_err());
        assert!(parse_connection_string("=value").is_err());
    }
}
