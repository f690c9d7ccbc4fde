//! One connectivity probe: connect, query, report.

use crate::address::looks_like_ip;
use crate::constants::CONNECTION_INFO_QUERY;
use crate::database::{params_for, Connection, DatabaseClient, ResultRow};
use crate::descriptor::ConnectionDescriptor;
use crate::error::ProbeError;
use crate::reporter::{Reporter, Tone};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const IP_HINT: &str = "Hint: You're connecting by IP. TLS certificate name validation usually \
     fails with IPs unless the cert has the IP in SAN. Use a DNS name, set \
     --hostname-in-certificate, or --trust-server-certificate true for dev.";

const TLS_TROUBLESHOOTING: &[&str] = &[
    "Troubleshooting tips:",
    "- Ensure SQL Server uses a certificate trusted by this machine's Trusted Root store.",
    "- Connect using a DNS name that matches the certificate's CN/SAN.",
    "- Or set --hostname-in-certificate to the certificate subject.",
    "- For dev only, use --trust-server-certificate true to bypass validation.",
    "- If name keeps flipping to an IP, try --no-tnir.",
];

const VIEW_SERVER_STATE_REQUIRED: &str =
    "connection details unavailable: requires VIEW SERVER STATE";

/// Transport details of the probe session, read best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionInfo {
    Details {
        encrypt_option: String,
        net_transport: String,
    },
    /// The metadata query returned no row.
    NoRow,
    /// The metadata query failed.
    Unavailable(String),
}

impl ConnectionInfo {
    fn render(&self, database: &str) -> String {
        match self {
            ConnectionInfo::Details {
                encrypt_option,
                net_transport,
            } => format!(
                " (db={}, encrypt_option={}, net_transport={})",
                database, encrypt_option, net_transport
            ),
            ConnectionInfo::NoRow => format!(" (db={})", database),
            ConnectionInfo::Unavailable(note) => format!(" (db={}, {})", database, note),
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success {
        /// `name: value  ` for every non-null field, rows in order.
        summary: String,
        /// Rendered database and transport suffix.
        info: String,
    },
    Failure {
        message: String,
        tls_trust_failure: bool,
        suggestion: Option<&'static str>,
    },
}

/// Result of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    /// Degraded steps that did not fail the attempt.
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success { .. })
    }

    pub fn summary(&self) -> Option<&str> {
        match &self.outcome {
            ProbeOutcome::Success { summary, .. } => Some(summary),
            ProbeOutcome::Failure { .. } => None,
        }
    }

    /// The single result line printed after `Connecting to ...`.
    pub fn report_line(&self) -> String {
        match &self.outcome {
            ProbeOutcome::Success { summary, info } => format!(
                "  SUCCESS {}{} in {} ms",
                summary,
                info,
                self.elapsed.as_millis()
            ),
            ProbeOutcome::Failure { message, .. } => format!("  ERROR: {}", message),
        }
    }
}

/// Concatenate every non-null field as `name: value  `.
pub fn summarize(rows: &[ResultRow]) -> String {
    rows.iter()
        .flat_map(|row| row.iter())
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| format!("{}: {}  ", name, value))
        .collect()
}

/// Print the run header: redacted descriptor, query and the IP naming hint.
pub fn print_header(reporter: &dyn Reporter, descriptor: &ConnectionDescriptor, query: &str) {
    reporter.info(&format!("ConnectionString: {}", descriptor.redacted()));
    reporter.info(&format!("SQL Query       : {}", query));

    if needs_ip_hint(descriptor) {
        reporter.warn(IP_HINT);
    }
}

fn needs_ip_hint(descriptor: &ConnectionDescriptor) -> bool {
    looks_like_ip(&descriptor.data_source)
        && !descriptor.tls.trust_server_certificate.is_true()
        && descriptor.tls.host_name_in_certificate.is_none()
}

/// Runs probes against a database client and reports them.
pub struct Prober<'a> {
    client: &'a dyn DatabaseClient,
    reporter: &'a dyn Reporter,
}

impl<'a> Prober<'a> {
    pub fn new(client: &'a dyn DatabaseClient, reporter: &'a dyn Reporter) -> Self {
        Self { client, reporter }
    }

    /// Run one attempt and print its report.
    pub async fn run(&self, descriptor: &ConnectionDescriptor, query: &str) -> ProbeResult {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.reporter.partial(&format!(
            "[{}] Connecting to {}... ",
            timestamp, descriptor.data_source
        ));

        let result = self.probe(descriptor, query).await;
        self.report(&result);
        result
    }

    /// Print the report for a finished attempt.
    pub fn report(&self, result: &ProbeResult) {
        let tone = if result.is_success() {
            Tone::Success
        } else {
            Tone::Error
        };
        self.reporter.line(tone, &result.report_line());

        for warning in &result.warnings {
            self.reporter.warn(warning);
        }

        if let ProbeOutcome::Failure {
            tls_trust_failure,
            suggestion,
            ..
        } = &result.outcome
        {
            if *tls_trust_failure {
                for hint in TLS_TROUBLESHOOTING {
                    self.reporter.warn(hint);
                }
            } else if let Some(suggestion) = suggestion {
                self.reporter.plain(&format!("  Suggestion: {}", suggestion));
            }
        }
    }

    /// Perform one attempt without printing.
    ///
    /// The connection is closed before returning, whatever the outcome. A
    /// panic inside the driver drops the connection and is reported as a
    /// failed attempt.
    pub async fn probe(&self, descriptor: &ConnectionDescriptor, query: &str) -> ProbeResult {
        let started = Instant::now();
        let mut warnings = Vec::new();

        let attempt = AssertUnwindSafe(self.attempt(descriptor, query, &mut warnings))
            .catch_unwind()
            .await;
        let outcome = attempt.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!("Probe attempt panicked: {}", message);
            ProbeOutcome::Failure {
                message: format!("Driver failure: {}", message),
                tls_trust_failure: false,
                suggestion: None,
            }
        });

        ProbeResult {
            outcome,
            warnings,
            elapsed: started.elapsed(),
        }
    }

    async fn attempt(
        &self,
        descriptor: &ConnectionDescriptor,
        query: &str,
        warnings: &mut Vec<String>,
    ) -> ProbeOutcome {
        match self.client.open(descriptor).await {
            Err(e) => failure(&e),
            Ok(mut conn) => {
                let exchanged = exchange(conn.as_mut(), descriptor, query, warnings).await;
                if let Err(e) = conn.close().await {
                    debug!("Connection close failed: {}", e);
                }
                match exchanged {
                    Ok(outcome) => outcome,
                    Err(e) => failure(&e),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn failure(error: &ProbeError) -> ProbeOutcome {
    debug!("Probe failed: {:?}", error);
    ProbeOutcome::Failure {
        message: error.to_string(),
        tls_trust_failure: error.is_tls_trust_failure(),
        suggestion: error.suggestion(),
    }
}

async fn exchange(
    conn: &mut dyn Connection,
    descriptor: &ConnectionDescriptor,
    query: &str,
    warnings: &mut Vec<String>,
) -> Result<ProbeOutcome, ProbeError> {
    let requested = descriptor.initial_catalog.as_deref();

    let current = conn.current_database().await.unwrap_or_else(|e| {
        debug!("Could not read the current database: {}", e);
        None
    });

    if let Some(name) = requested {
        let already_there = current
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(name));
        if !already_there {
            if let Err(e) = conn.change_database(name).await {
                warnings.push(format!(
                    "Warning: Failed to change database to '{}': {}",
                    name, e
                ));
            }
        }
    }

    let params = params_for(query, requested);
    let rows = conn.query(query, &params).await?;
    let summary = summarize(&rows);

    let info = connection_info(conn).await;
    let database = requested.map(String::from).or(current).unwrap_or_default();

    Ok(ProbeOutcome::Success {
        summary,
        info: info.render(&database),
    })
}

async fn connection_info(conn: &mut dyn Connection) -> ConnectionInfo {
    match conn.query(CONNECTION_INFO_QUERY, &[]).await {
        Ok(rows) => match rows.first() {
            Some(row) => ConnectionInfo::Details {
                encrypt_option: field_text(row, "encrypt_option"),
                net_transport: field_text(row, "net_transport"),
            },
            None => ConnectionInfo::NoRow,
        },
        Err(ProbeError::PermissionDenied(message)) => {
            debug!("Connection details denied: {}", message);
            ConnectionInfo::Unavailable(VIEW_SERVER_STATE_REQUIRED.to_string())
        }
        Err(e) => {
            debug!("Connection details query failed: {}", e);
            ConnectionInfo::Unavailable("connection details unavailable".to_string())
        }
    }
}

fn field_text(row: &ResultRow, name: &str) -> String {
    row.get(name).map(ToString::to_string).unwrap_or_default()
}
