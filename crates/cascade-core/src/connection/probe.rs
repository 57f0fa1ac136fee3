//! Connectivity probes used to pick a working connection string

use super::parse::ConnectionStringParts;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// SQL Server's default port, used when a connection string names none
pub const DEFAULT_DATABASE_PORT: u16 = 1433;

/// Checks whether a connection string points at a reachable database
#[cfg_attr(test, mockall::automock)]
pub trait ConnectivityProbe: Send + Sync {
    fn try_open(&self, connection_string: &str) -> bool;
}

/// Opens a TCP connection to the endpoint named in the connection string
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
    default_port: u16,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            default_port: DEFAULT_DATABASE_PORT,
        }
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }
}

impl ConnectivityProbe for TcpProbe {
    fn try_open(&self, connection_string: &str) -> bool {
        let endpoint = match ConnectionStringParts::parse(connection_string) {
            Ok(parts) => parts.endpoint(),
            Err(e) => {
                tracing::debug!("connection string not parseable: {}", e);
                return false;
            }
        };
        let Some(endpoint) = endpoint else {
            tracing::debug!("connection string names no network endpoint");
            return false;
        };

        let port = endpoint.port.unwrap_or(self.default_port);
        let addrs = match (endpoint.host.as_str(), port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::debug!(host = %endpoint.host, "could not resolve: {}", e);
                return false;
            }
        };

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => {
                    tracing::debug!(%addr, "database endpoint reachable");
                    return true;
                }
                Err(e) => tracing::debug!(%addr, "connect failed: {}", e),
            }
        }
        false
    }
}

/// Adapts a closure into a probe
pub struct FnProbe<F>(pub F);

impl<F> ConnectivityProbe for FnProbe<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn try_open(&self, connection_string: &str) -> bool {
        (self.0)(connection_string)
    }
}

impl<F> std::fmt::Debug for FnProbe<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnProbe")
    }
}
