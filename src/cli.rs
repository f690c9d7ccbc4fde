//! Command line interface.

use crate::config::{Settings, TlsSettings, TriState};
use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DATABASE, DEFAULT_WAIT_SECS};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sqlping")]
#[command(about = "Check connectivity to a SQL Server instance")]
#[command(version)]
#[command(long_about = "
sqlping - SQL Server connectivity probe

Connects to the server, runs a diagnostic query and reports the result,
once or repeatedly until interrupted.

CREDENTIALS:
  Without --username the probe uses integrated authentication.
  SQLPING_USERNAME and SQLPING_PASSWORD supply credentials that were not
  given on the command line. A missing password is prompted for.

EXAMPLES:
  sqlping sqlhost
  sqlping sqlhost\\SQLEXPRESS -u app -n -w 5
  sqlping tcp:10.0.0.5,1433 -H sql.corp.example --encrypt strict
")]
pub struct Cli {
    /// Server address: host, host,port or host\instance
    #[arg(value_name = "SERVER")]
    pub server: String,

    /// Database name
    #[arg(short, long, default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// SQL login; leave empty for integrated authentication
    #[arg(short, long, default_value = "")]
    pub username: String,

    /// Password (visible in process lists, prefer SQLPING_PASSWORD or the prompt)
    #[arg(short, long, default_value = "")]
    pub password: String,

    /// Connect timeout in seconds, 0 waits indefinitely
    #[arg(short, long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Custom query to run instead of the diagnostic query
    #[arg(short, long)]
    pub command: Option<String>,

    /// Enable MultiSubnetFailover
    #[arg(short = 'f', long = "failover")]
    pub multi_subnet_failover: bool,

    /// Failover partner for database mirroring
    #[arg(short = 'a', long = "failoverpartner")]
    pub failover_partner: Option<String>,

    /// Keep probing until interrupted
    #[arg(short, long)]
    pub nonstop: bool,

    /// Seconds to wait between probes
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_WAIT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub wait: u64,

    /// Encrypt mode: true, false or strict
    #[arg(long)]
    pub encrypt: Option<String>,

    /// Trust the server certificate without validation (true|false)
    #[arg(short = 'T', long = "trust-server-certificate")]
    pub trust_server_certificate: Option<bool>,

    /// Name expected in the server certificate
    #[arg(short = 'H', long = "hostname-in-certificate")]
    pub hostname_in_certificate: Option<String>,

    /// Disable transparent network IP resolution
    #[arg(long = "no-tnir")]
    pub no_tnir: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Log filter directive used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "warn,sqlping=debug",
            (false, _) => "warn,sqlping=trace",
        }
    }

    pub fn into_settings(self) -> Settings {
        Settings {
            server: self.server,
            database: self.database,
            username: self.username,
            password: self.password,
            timeout_secs: self.timeout,
            command: self.command.filter(|c| !c.trim().is_empty()),
            multi_subnet_failover: self.multi_subnet_failover,
            failover_partner: self.failover_partner.filter(|p| !p.trim().is_empty()),
            nonstop: self.nonstop,
            wait_secs: self.wait,
            tls: TlsSettings {
                trust_server_certificate: TriState::from(self.trust_server_certificate),
                host_name_in_certificate: self.hostname_in_certificate,
                encrypt: self.encrypt,
                disable_tnir: self.no_tnir,
            },
        }
    }
}
