//! Probe settings.
//!
//! `Settings` is the immutable record produced once from the command line.
//! Everything downstream (credential resolution, descriptor building, the
//! poll loop) reads from it and never writes back.

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DATABASE, DEFAULT_QUERY, DEFAULT_WAIT_SECS,
    MIN_WAIT_SECS,
};
use crate::error::ProbeError;
use std::fmt;
use std::time::Duration;

/// An option that may be left unset, explicitly enabled or explicitly disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriState {
    /// Not specified; the driver default applies.
    #[default]
    Unset,
    /// Explicitly enabled.
    True,
    /// Explicitly disabled.
    False,
}

impl TriState {
    /// The explicit value, if any.
    pub fn as_option(self) -> Option<bool> {
        match self {
            TriState::Unset => None,
            TriState::True => Some(true),
            TriState::False => Some(false),
        }
    }

    pub fn is_true(self) -> bool {
        self == TriState::True
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => TriState::Unset,
            Some(true) => TriState::True,
            Some(false) => TriState::False,
        }
    }
}

/// Encrypt mode accepted by `--encrypt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptMode {
    /// Encrypt the whole session.
    True,
    /// Encrypt the login packet only.
    False,
    /// Encrypt the session and always validate the server certificate.
    Strict,
}

impl EncryptMode {
    /// Parse a mode case-insensitively, ignoring surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "true" => Some(EncryptMode::True),
            "false" => Some(EncryptMode::False),
            "strict" => Some(EncryptMode::Strict),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EncryptMode::True => "True",
            EncryptMode::False => "False",
            EncryptMode::Strict => "Strict",
        }
    }
}

impl fmt::Display for EncryptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS-related options as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// `--trust-server-certificate`
    pub trust_server_certificate: TriState,

    /// `--hostname-in-certificate`
    pub host_name_in_certificate: Option<String>,

    /// `--encrypt`, unvalidated
    pub encrypt: Option<String>,

    /// `--no-tnir`
    pub disable_tnir: bool,
}

/// Probe settings parsed from the command line.
#[derive(Clone)]
pub struct Settings {
    /// Server address (`host`, `host,port`, `host\instance`)
    pub server: String,

    /// Target database name; empty means the login's default database
    pub database: String,

    /// SQL login; empty selects integrated authentication
    pub username: String,

    /// Password as given with `--password`
    pub password: String,

    /// Connect timeout in seconds (0 waits indefinitely)
    pub timeout_secs: u64,

    /// Custom query, `None` runs the default diagnostic query
    pub command: Option<String>,

    /// MultiSubnetFailover
    pub multi_subnet_failover: bool,

    /// Database mirroring failover partner
    pub failover_partner: Option<String>,

    /// Keep probing until interrupted
    pub nonstop: bool,

    /// Seconds between non-stop probes
    pub wait_secs: u64,

    /// TLS options
    pub tls: TlsSettings,
}

impl Settings {
    /// Settings for `server` with every other option at its default.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: DEFAULT_DATABASE.to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            command: None,
            multi_subnet_failover: false,
            failover_partner: None,
            nonstop: false,
            wait_secs: DEFAULT_WAIT_SECS,
            tls: TlsSettings::default(),
        }
    }

    /// Reject settings the poll loop cannot honour.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.server.trim().is_empty() {
            return Err(ProbeError::config("A server address is required"));
        }
        if self.wait_secs < MIN_WAIT_SECS {
            return Err(ProbeError::config(format!(
                "You need to wait at least {} seconds between pings",
                MIN_WAIT_SECS
            )));
        }
        Ok(())
    }

    /// The target database, if one was requested.
    pub fn target_database(&self) -> Option<&str> {
        let name = self.database.trim();
        (!name.is_empty()).then_some(name)
    }

    /// The query every probe runs.
    pub fn query(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_QUERY)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .field("timeout_secs", &self.timeout_secs)
            .field("command", &self.command)
            .field("multi_subnet_failover", &self.multi_subnet_failover)
            .field("failover_partner", &self.failover_partner)
            .field("nonstop", &self.nonstop)
            .field("wait_secs", &self.wait_secs)
            .field("tls", &self.tls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new("sqlhost");
        assert_eq!(settings.database, "master");
        assert_eq!(settings.timeout_secs, 3);
        assert_eq!(settings.wait_secs, 10);
        assert!(!settings.nonstop);
        assert_eq!(settings.query(), DEFAULT_QUERY);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_wait_must_be_positive() {
        let mut settings = Settings::new("sqlhost");
        settings.wait_secs = 0;
        let err = settings.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("You need to wait at least 1 seconds between pings"));
    }

    #[test]
    fn test_blank_database_is_not_a_target() {
        let mut settings = Settings::new("sqlhost");
        settings.database = "  ".to_string();
        assert_eq!(settings.target_database(), None);
    }

    #[test]
    fn test_encrypt_mode_parse() {
        assert_eq!(EncryptMode::parse("true"), Some(EncryptMode::True));
        assert_eq!(EncryptMode::parse("FALSE"), Some(EncryptMode::False));
        assert_eq!(EncryptMode::parse(" Strict "), Some(EncryptMode::Strict));
        assert_eq!(EncryptMode::parse("maybe"), None);
    }

    #[test]
    fn test_tri_state_from_option() {
        assert_eq!(TriState::from(None), TriState::Unset);
        assert_eq!(TriState::from(Some(true)), TriState::True);
        assert_eq!(TriState::from(Some(false)), TriState::False);
        assert_eq!(TriState::False.as_option(), Some(false));
    }

    #[test]
    fn test_debug_hides_password() {
        let mut settings = Settings::new("sqlhost");
        settings.password = "hunter2".to_string();
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }
}
