//! The database collaborator seen by the probe.

use crate::database::query::{QueryParam, ResultRow};
use crate::descriptor::ConnectionDescriptor;
use crate::error::ProbeError;
use async_trait::async_trait;

/// Opens connections described by a `ConnectionDescriptor`.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, ProbeError>;
}

/// One open connection.
///
/// Dropping a connection closes its socket. `close` ends the session
/// cleanly and should be preferred.
#[async_trait]
pub trait Connection: Send {
    /// Name of the current database context.
    async fn current_database(&mut self) -> Result<Option<String>, ProbeError>;

    /// Switch the database context.
    async fn change_database(&mut self, name: &str) -> Result<(), ProbeError>;

    /// Run `sql` with named parameters bound by the driver, returning every row.
    async fn query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<ResultRow>, ProbeError>;

    /// Close the connection.
    async fn close(self: Box<Self>) -> Result<(), ProbeError>;
}
