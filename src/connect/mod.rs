//! Connection resolution and cluster lifecycle management.

mod connection;
mod params;
mod resolver;

pub use connection::ClusterConnection;
pub use params::ConnectionParams;
pub use resolver::{ConnectionResolver, CredentialStore, EndpointDiscovery};
