//! Error types for sqlping.
//!
//! Driver failures are mapped onto a small semantic taxonomy so that the
//! probe report can tell a login failure from a refused socket or an
//! untrusted certificate.

use crate::constants::TLS_TRUST_FAILURE_MARKERS;
use thiserror::Error;

/// Errors raised while opening, using or configuring a probe connection.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Database not found or not accessible
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Query execution error
    #[error("Query execution error: {message}")]
    QueryExecution {
        message: String,
        sql_error_code: Option<u32>,
    },

    /// Connect timeout
    #[error("Timeout: connection not established within {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// TLS negotiation error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Interactive prompt failed
    #[error("Prompt failed: {0}")]
    Prompt(String),
}

impl ProbeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a permission denied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a query execution error.
    pub fn query_error(msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error carrying the SQL Server error number.
    pub fn query_error_with_code(msg: impl Into<String>, code: u32) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create a timeout error.
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout {
            timeout_seconds: seconds,
        }
    }

    /// Create a TLS error.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Whether the message, or any error in its source chain, says the
    /// client did not trust the server certificate's issuer.
    pub fn is_tls_trust_failure(&self) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(error) = current {
            if is_tls_trust_failure_message(&error.to_string()) {
                return true;
            }
            current = error.source();
        }
        false
    }

    /// Whether opening a connection may succeed against another address
    /// (failover partner, routed host).
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Tls(_)
        )
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check the command line options"),
            Self::Connection { .. } => {
                Some("Check server hostname, port, and network connectivity")
            }
            Self::Authentication(_) => Some("Verify your username and password are correct"),
            Self::DatabaseNotFound(_) => Some("Check the database name and ensure it exists"),
            Self::PermissionDenied(_) => {
                Some("Request appropriate permissions from your database administrator")
            }
            Self::Timeout { .. } => Some("Increase --timeout or check that the server is reachable"),
            Self::Tls(_) => Some("Check the --encrypt and certificate options"),
            _ => None,
        }
    }
}

/// Check an error message for a known TLS trust-chain failure.
pub fn is_tls_trust_failure_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TLS_TRUST_FAILURE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Map SQL Server error numbers to semantic ProbeError types.
pub fn from_sql_error(code: u32, message: &str) -> ProbeError {
    match code {
        // Authentication errors
        18456 => ProbeError::auth(format!("Login failed: {}", message)),
        18452 => ProbeError::auth(format!("Untrusted domain login: {}", message)),
        18486 | 18487 | 18488 => ProbeError::auth(message),

        // Database errors
        4060 | 911 => ProbeError::DatabaseNotFound(message.to_string()),

        // Permission errors (297/300 are raised by sys.dm_exec_connections)
        229 | 230 | 297 | 300 => ProbeError::permission_denied(message),

        // Syntax errors
        102 => ProbeError::query_error_with_code(format!("Syntax error: {}", message), code),

        // Invalid column/object
        207 => ProbeError::query_error_with_code(format!("Invalid column: {}", message), code),
        208 => ProbeError::query_error_with_code(format!("Invalid object: {}", message), code),

        // Default: generic query error
        _ => ProbeError::query_error_with_code(message, code),
    }
}

impl From<tiberius::error::Error> for ProbeError {
    fn from(e: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match e {
            Error::Server(token) => from_sql_error(token.code(), token.message()),
            Error::Io { .. } => {
                let message = e.to_string();
                ProbeError::connection_with_source(message, e)
            }
            Error::Tls(message) => ProbeError::tls(message),
            Error::Protocol(_) => ProbeError::connection(format!("Protocol error: {}", e)),
            Error::Routing { host, port } => {
                ProbeError::connection(format!("Unfollowed routing request to {}:{}", host, port))
            }
            Error::Conversion(_) | Error::Utf8 | Error::Utf16 | Error::ParseInt(_) => {
                ProbeError::query_error(format!("Type conversion error: {}", e))
            }
            Error::BulkInput(_) => ProbeError::query_error(e.to_string()),
            #[allow(unreachable_patterns)]
            _ => ProbeError::connection(e.to_string()),
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let message = match e.kind() {
            ErrorKind::ConnectionRefused => "Connection refused",
            ErrorKind::ConnectionReset => "Connection reset",
            ErrorKind::ConnectionAborted => "Connection aborted",
            ErrorKind::NotConnected => "Not connected",
            ErrorKind::TimedOut => "Connection timed out",
            _ => "IO error",
        };
        ProbeError::connection_with_source(format!("{}: {}", message, e), e)
    }
}
