//! Centralized constants for sqlping.
//!
//! Defaults, environment variable names and fixed strings used throughout the
//! codebase, kept in one place so they are easy to find and modify.

use std::time::Duration;

// =============================================================================
// CLI Defaults
// =============================================================================

/// Default database the probe targets.
pub const DEFAULT_DATABASE: &str = "master";

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Default pause between non-stop probes, in seconds.
pub const DEFAULT_WAIT_SECS: u64 = 10;

/// Smallest pause allowed between non-stop probes, in seconds.
pub const MIN_WAIT_SECS: u64 = 1;

// =============================================================================
// Environment Variables
// =============================================================================

/// Fallback username when `--username` is not given.
pub const ENV_USERNAME: &str = "SQLPING_USERNAME";

/// Fallback password when `--password` is not given.
pub const ENV_PASSWORD: &str = "SQLPING_PASSWORD";

// =============================================================================
// Network Constants
// =============================================================================

/// Default SQL Server TCP port.
pub const DEFAULT_PORT: u16 = 1433;

/// Protocol prefix accepted in front of the server address.
pub const TCP_PREFIX: &str = "tcp:";

/// Smallest slice of the connect timeout given to one address when
/// transparent network IP resolution walks several addresses.
pub const MIN_TNIR_SLICE: Duration = Duration::from_millis(500);

// =============================================================================
// Queries
// =============================================================================

/// Placeholder bound to the target database name when present in a query.
pub const DATABASE_NAME_PLACEHOLDER: &str = "@DatabaseName";

/// SQL type used to declare the bound database name.
pub const DATABASE_NAME_SQL_TYPE: &str = "nvarchar(128)";

/// Query run when no custom query is supplied.
pub const DEFAULT_QUERY: &str = "SELECT @@SERVERNAME AS \"Server\", name as \"Database\", \
     state_desc AS \"State\", replica_id AS \"Replica\" FROM sys.databases WHERE name = @DatabaseName";

/// Query describing the transport of the current session.
pub const CONNECTION_INFO_QUERY: &str =
    "SELECT encrypt_option, net_transport FROM sys.dm_exec_connections WHERE session_id = @@SPID;";

/// Query returning the database context of the current session.
pub const CURRENT_DATABASE_QUERY: &str = "SELECT DB_NAME()";

// =============================================================================
// Redaction
// =============================================================================

/// Replaces the password value in a displayed connection string.
pub const PASSWORD_MASK: &str = "***REDACTED***";

/// Shown instead of a connection string that could not be parsed back.
pub const CONNECTION_STRING_MASK: &str = "***CONNECTION STRING REDACTED***";

// =============================================================================
// TLS Diagnostics
// =============================================================================

/// Error fragments (matched case-insensitively) that indicate the client
/// rejected the server certificate's issuer.
pub const TLS_TRUST_FAILURE_MARKERS: &[&str] = &[
    "certificate chain was issued by an authority that is not trusted",
    "unable to get local issuer certificate",
    "self signed certificate",
    "self-signed certificate",
    "certificate verify failed",
    "unknownissuer",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_binds_database_name() {
        assert!(DEFAULT_QUERY.contains(DATABASE_NAME_PLACEHOLDER));
    }

    #[test]
    fn test_wait_bounds() {
        assert!(DEFAULT_WAIT_SECS >= MIN_WAIT_SECS);
    }

    #[test]
    fn test_trust_markers_are_lowercase() {
        for marker in TLS_TRUST_FAILURE_MARKERS {
            assert_eq!(*marker, marker.to_lowercase());
        }
    }
}
