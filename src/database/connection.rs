//! Opening probe connections with tiberius.
//!
//! Dialing follows the SQL Server client conventions: named instances are
//! resolved through SQL Browser, MultiSubnetFailover races every resolved
//! address, and transparent network IP resolution gives each address a slice
//! of the connect timeout. A failover partner is tried once when the primary
//! cannot be reached.

use super::auth::{create_config, RawConnection};
use super::client::{Connection, DatabaseClient};
use super::query::{collect_rows, declare_named_params, quote_database_name, QueryParam, ResultRow};
use crate::address::ServerAddress;
use crate::constants::{CURRENT_DATABASE_QUERY, MIN_TNIR_SLICE};
use crate::descriptor::ConnectionDescriptor;
use crate::error::ProbeError;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tiberius::{Client, SqlBrowser, ToSql};
use tokio::net::{lookup_host, TcpStream};
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info, warn};

/// `DatabaseClient` backed by tiberius.
#[derive(Debug, Clone, Copy, Default)]
pub struct TdsClient;

impl TdsClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseClient for TdsClient {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, ProbeError> {
        let primary = match open_target(descriptor, &descriptor.data_source).await {
            Ok(client) => return Ok(Box::new(TdsConnection::new(client))),
            Err(e) => e,
        };

        let partner = match &descriptor.failover_partner {
            Some(partner) if primary.is_connectivity() => partner,
            _ => return Err(primary),
        };

        info!(
            "Primary {} unreachable ({}), trying failover partner {}",
            descriptor.data_source, primary, partner
        );
        match open_target(descriptor, partner).await {
            Ok(client) => Ok(Box::new(TdsConnection::new(client))),
            Err(e) => {
                debug!("Failover partner {} failed: {}", partner, e);
                Err(primary)
            }
        }
    }
}

/// Open `data_source` within the descriptor's connect timeout.
async fn open_target(
    descriptor: &ConnectionDescriptor,
    data_source: &str,
) -> Result<RawConnection, ProbeError> {
    let attempt = connect(descriptor, data_source);
    if descriptor.connect_timeout.is_zero() {
        return attempt.await;
    }

    tokio::time::timeout(descriptor.connect_timeout, attempt)
        .await
        .map_err(|_| ProbeError::timeout(descriptor.connect_timeout.as_secs()))?
}

async fn connect(
    descriptor: &ConnectionDescriptor,
    data_source: &str,
) -> Result<RawConnection, ProbeError> {
    let address = ServerAddress::parse(data_source)?;
    let mut config = create_config(descriptor, &address)?;

    debug!("Creating connection to {}", data_source);
    let tcp = dial(&config, &address, descriptor).await?;

    if let Some(name) = &descriptor.tls.host_name_in_certificate {
        config.host(name);
    }

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => {
            debug!("Connection established successfully");
            Ok(client)
        }
        Err(tiberius::error::Error::Routing { host, port }) => {
            info!("Server redirected the connection to {}:{}", host, port);
            if descriptor.tls.host_name_in_certificate.is_none() {
                config.host(&host);
            }
            config.port(port);

            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| {
                    ProbeError::connection_with_source(
                        format!("Failed to connect to {}:{}: {}", host, port, e),
                        e,
                    )
                })?;
            set_nodelay(&tcp)?;

            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Establish the TCP socket for an address.
async fn dial(
    config: &tiberius::Config,
    address: &ServerAddress,
    descriptor: &ConnectionDescriptor,
) -> Result<TcpStream, ProbeError> {
    let tcp = if address.needs_browser() {
        debug!(
            "Resolving instance {:?} on {} through SQL Browser",
            address.instance, address.host
        );
        TcpStream::connect_named(config).await?
    } else {
        let port = address.port_or_default();
        let addrs: Vec<SocketAddr> = lookup_host((address.host.as_str(), port))
            .await
            .map_err(|e| {
                ProbeError::connection_with_source(
                    format!("Failed to resolve {}: {}", address.host, e),
                    e,
                )
            })?
            .collect();

        debug!("{} resolved to {:?}", address.host, addrs);

        let dialled = if descriptor.multi_subnet_failover {
            connect_parallel(&addrs).await
        } else if descriptor.tls.transparent_network_ip_resolution {
            connect_sliced(&addrs, descriptor.connect_timeout).await
        } else {
            connect_sequential(&addrs).await
        };

        dialled.map_err(|e| {
            ProbeError::connection_with_source(
                format!("Failed to connect to {}:{}: {}", address.host, port, e),
                e,
            )
        })?
    };

    set_nodelay(&tcp)?;
    Ok(tcp)
}

fn set_nodelay(tcp: &TcpStream) -> Result<(), ProbeError> {
    tcp.set_nodelay(true)
        .map_err(|e| ProbeError::connection(format!("Failed to set TCP_NODELAY: {}", e)))
}

fn no_addresses() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
}

/// Dial every address at once; the first established socket wins.
async fn connect_parallel(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    if addrs.is_empty() {
        return Err(no_addresses());
    }

    let attempts = addrs.iter().map(|addr| Box::pin(TcpStream::connect(*addr)));
    let (tcp, _pending) = futures_util::future::select_ok(attempts).await?;
    Ok(tcp)
}

/// Dial addresses in order, each bounded by an equal share of `timeout`.
async fn connect_sliced(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    if addrs.len() < 2 || timeout.is_zero() {
        return connect_sequential(addrs).await;
    }

    let count = u32::try_from(addrs.len()).unwrap_or(u32::MAX);
    let slice = (timeout / count).max(MIN_TNIR_SLICE);
    let mut last_error = None;

    for addr in addrs {
        match tokio::time::timeout(slice, TcpStream::connect(addr)).await {
            Ok(Ok(tcp)) => return Ok(tcp),
            Ok(Err(e)) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
            Err(_) => {
                debug!("Connect to {} timed out after {:?}", addr, slice);
                last_error = Some(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", addr),
                ));
            }
        }
    }

    Err(last_error.unwrap_or_else(no_addresses))
}

/// Dial addresses in order until one accepts.
async fn connect_sequential(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    if addrs.is_empty() {
        return Err(no_addresses());
    }
    TcpStream::connect(addrs).await
}

/// An open tiberius session.
pub struct TdsConnection {
    client: RawConnection,
}

impl TdsConnection {
    fn new(client: RawConnection) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connection for TdsConnection {
    async fn current_database(&mut self) -> Result<Option<String>, ProbeError> {
        let row = self
            .client
            .simple_query(CURRENT_DATABASE_QUERY)
            .await?
            .into_row()
            .await?;

        Ok(row.and_then(|row| row.try_get::<&str, _>(0).ok().flatten().map(String::from)))
    }

    async fn change_database(&mut self, name: &str) -> Result<(), ProbeError> {
        // Sent as a batch; a USE inside sp_executesql reverts when the call returns.
        let statement = format!("USE {}", quote_database_name(name)?);
        self.client
            .simple_query(statement)
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<ResultRow>, ProbeError> {
        let statement = declare_named_params(sql, params);
        let values: Vec<Option<&str>> = params.iter().map(|p| p.value.as_deref()).collect();
        let bindings: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();

        let stream = self.client.query(statement, &bindings).await?;
        collect_rows(stream).await
    }

    async fn close(self: Box<Self>) -> Result<(), ProbeError> {
        self.client.close().await.map_err(|e| {
            warn!("Failed to close connection cleanly: {}", e);
            ProbeError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listening() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn closed_port() -> SocketAddr {
        let (listener, addr) = listening().await;
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_parallel_connect_picks_reachable_address() {
        let dead = closed_port().await;
        let (_listener, live) = listening().await;

        let tcp = connect_parallel(&[dead, live]).await.unwrap();
        assert_eq!(tcp.peer_addr().unwrap(), live);
    }

    #[tokio::test]
    async fn test_sliced_connect_moves_past_failed_address() {
        let dead = closed_port().await;
        let (_listener, live) = listening().await;

        let tcp = connect_sliced(&[dead, live], Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(tcp.peer_addr().unwrap(), live);
    }

    #[tokio::test]
    async fn test_sequential_connect_reports_last_failure() {
        let dead = closed_port().await;
        assert!(connect_sequential(&[dead]).await.is_err());
        assert!(connect_parallel(&[dead]).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_address_list() {
        let err = connect_sliced(&[], Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(connect_parallel(&[]).await.is_err());
    }

    fn descriptor_for(server: &str) -> ConnectionDescriptor {
        use crate::config::Settings;
        use crate::credentials::Credentials;
        use crate::descriptor::{build, ClientIdentity};

        let identity = ClientIdentity {
            workstation_id: "WS01".to_string(),
            application_name: "sqlping test".to_string(),
        };
        build(&Settings::new(server), &Credentials::new("sa", "secret"), identity).descriptor
    }

    #[tokio::test]
    async fn test_open_unreachable_server_is_connectivity_error() {
        let dead = closed_port().await;
        let d = descriptor_for(&format!("127.0.0.1,{}", dead.port()));

        let err = TdsClient::new().open(&d).await.err().unwrap();
        assert!(err.is_connectivity(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_refused_connection_reports_os_cause() {
        use crate::probe::Prober;
        use crate::reporter::MemoryReporter;

        let dead = closed_port().await;
        let d = descriptor_for(&format!("127.0.0.1,{}", dead.port()));
        let client = TdsClient::new();
        let reporter = MemoryReporter::new();

        let result = Prober::new(&client, &reporter)
            .probe(&d, "SELECT 1 AS one")
            .await;

        let line = result.report_line().to_lowercase();
        assert!(line.contains("refused"), "{}", line);
    }

    #[tokio::test]
    async fn test_unresolvable_host_reports_resolver_cause() {
        const PREFIX: &str = "Connection error: Failed to resolve no-such-host.invalid: ";
        let d = descriptor_for("no-such-host.invalid");
        let address = ServerAddress::parse("no-such-host.invalid").unwrap();

        let err = dial(&tiberius::Config::new(), &address, &d)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with(PREFIX), "{}", message);
        assert!(message.len() > PREFIX.len(), "{}", message);
    }
}
