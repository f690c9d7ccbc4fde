//! # sqlping
//!
//! A connectivity probe for Microsoft SQL Server.
//!
//! A probe builds a connection descriptor from the command line, opens a
//! connection, runs a diagnostic (or custom) query and prints a one-line
//! report. With `--nonstop` it repeats on an interval until interrupted.
//!
//! ## Architecture
//!
//! - `credentials` and `descriptor` turn settings into a `ConnectionDescriptor`
//! - `redact` renders it safely for display
//! - `probe` runs one attempt against a `database::DatabaseClient`
//! - `poll` repeats attempts until `shutdown` fires
//!
//! All console output goes through a `reporter::Reporter`.

pub mod address;
pub mod cli;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod database;
pub mod descriptor;
pub mod error;
pub mod poll;
pub mod probe;
pub mod redact;
pub mod reporter;
pub mod shutdown;

pub use config::Settings;
pub use database::{DatabaseClient, TdsClient};
pub use descriptor::ConnectionDescriptor;
pub use error::ProbeError;
pub use probe::{ProbeResult, Prober};
