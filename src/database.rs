//! Database connectivity and query execution.

mod auth;
mod client;
mod connection;
mod query;
pub mod types;

pub use auth::{auth_method, create_config, RawConnection};
pub use client::{Connection, DatabaseClient};
pub use connection::{TdsClient, TdsConnection};
pub use query::{
    collect_rows, declare_named_params, params_for, quote_database_name, QueryParam, ResultRow,
};
pub use types::SqlValue;
