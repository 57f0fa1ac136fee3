//! Connection strings: placeholder substitution, parsing, decryption and
//! reachability probing

pub mod parse;
pub mod placeholders;
pub mod probe;
pub mod resolver;

pub use parse::{ConnectionStringParts, Endpoint};
pub use placeholders::{Placeholder, PlaceholderMap};
#[cfg(test)]
pub use probe::MockConnectivityProbe;
pub use probe::{ConnectivityProbe, DEFAULT_DATABASE_PORT, FnProbe, TcpProbe};
pub use resolver::ConnectionStringResolver;
