//! Connection and credential resolution.
//!
//! Combines the configured endpoints and credentials (optionally indirected
//! through external discovery/credential-store collaborators) into one
//! composed [`ConnectionParams`]. Composition itself is a pure function of
//! its inputs and performs no network I/O.

use crate::config::{ConnectionConfig, CredentialConfig};
use crate::connect::ConnectionParams;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// URI scheme produced by composition.
const SCHEME: &str = "couchbase";

/// Configuration keys consumed by composition and therefore excluded from
/// the rendered query string.
const RESERVED_KEYS: [&str; 6] = ["uri", "host", "port", "database", "username", "password"];

/// Resolves endpoint descriptors registered under a discovery key.
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// Returns the endpoints registered under `key`, in order.
    async fn resolve_all(&self, trace_id: &str, key: &str) -> Result<Vec<ConnectionConfig>>;
}

/// Looks up credentials stored under a store key.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the credentials stored under `key`, if any.
    async fn lookup(&self, trace_id: &str, key: &str) -> Result<Option<CredentialConfig>>;
}

/// Resolves and validates connection/credential configuration and composes
/// the connection URI.
///
/// Endpoint and credential resolution run concurrently; both must complete
/// before composition.
#[derive(Clone, Default)]
pub struct ConnectionResolver {
    connections: Vec<ConnectionConfig>,
    credential: Option<CredentialConfig>,
    discovery: Option<Arc<dyn EndpointDiscovery>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
}

impl std::fmt::Debug for ConnectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("connections", &self.connections)
            .field("credential", &self.credential.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl ConnectionResolver {
    /// Resolver over statically configured endpoints and credentials.
    #[must_use]
    pub fn new(connections: Vec<ConnectionConfig>, credential: Option<CredentialConfig>) -> Self {
        Self {
            connections,
            credential,
            discovery: None,
            credential_store: None,
        }
    }

    /// Attaches an external endpoint discovery collaborator.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn EndpointDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Attaches an external credential store collaborator.
    #[must_use]
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Resolves, validates, and composes the connection parameters.
    pub async fn resolve(&self, trace_id: &str) -> Result<ConnectionParams> {
        let (connections, credential) = tokio::join!(
            self.resolve_endpoints(trace_id),
            self.resolve_credential(trace_id),
        );
        let connections = connections?;
        let credential = credential?;
        Ok(Self::compose(&connections, credential.as_ref()))
    }

    /// Pulls the endpoint list (through discovery where requested) and
    /// validates it.
    async fn resolve_endpoints(&self, trace_id: &str) -> Result<Vec<ConnectionConfig>> {
        let mut resolved = Vec::with_capacity(self.connections.len());
        for endpoint in &self.connections {
            match (&endpoint.discovery_key, &self.discovery) {
                (Some(key), Some(discovery)) => {
                    resolved.extend(discovery.resolve_all(trace_id, key).await?);
                }
                _ => resolved.push(endpoint.clone()),
            }
        }
        Self::validate_endpoints(&resolved)?;
        Ok(resolved)
    }

    /// Looks up credentials, preferring the external store when a store key
    /// is configured. Credentials are not validated.
    async fn resolve_credential(&self, trace_id: &str) -> Result<Option<CredentialConfig>> {
        if let Some(credential) = &self.credential
            && let Some(key) = &credential.store_key
            && let Some(store) = &self.credential_store
        {
            return store.lookup(trace_id, key).await;
        }
        Ok(self.credential.clone())
    }

    fn validate_endpoints(connections: &[ConnectionConfig]) -> Result<()> {
        if connections.is_empty() {
            return Err(Error::config(
                "NO_CONNECTION",
                "database connection is not set",
            ));
        }
        for connection in connections {
            if connection.uri.as_deref().is_some_and(|uri| !uri.is_empty()) {
                continue;
            }
            if connection.host.as_deref().is_none_or(str::is_empty) {
                return Err(Error::config("NO_HOST", "connection host is not set"));
            }
            if connection.port.is_none_or(|port| port == 0) {
                return Err(Error::config("NO_PORT", "connection port is not set"));
            }
        }
        Ok(())
    }

    /// Composes one connection descriptor from validated endpoints and
    /// optional credentials. Pure function, exhaustively unit-testable.
    fn compose(
        connections: &[ConnectionConfig],
        credential: Option<&CredentialConfig>,
    ) -> ConnectionParams {
        let mut result = ConnectionParams::default();

        if let Some(credential) = credential {
            result.username = credential.username.clone().unwrap_or_default();
            if !result.username.is_empty() {
                result.password = credential.password.clone().unwrap_or_default();
            }
        }

        // Any endpoint carrying a full URI short-circuits composition.
        for connection in connections {
            if let Some(uri) = connection.uri.as_deref().filter(|uri| !uri.is_empty()) {
                result.uri = uri.to_string();
                return result;
            }
        }

        let hosts = connections
            .iter()
            .map(|connection| {
                let host = connection.host.as_deref().unwrap_or_default();
                match connection.port {
                    Some(port) if port > 0 => format!("{host}:{port}"),
                    _ => host.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(",");

        let database = connections
            .iter()
            .find_map(|connection| {
                connection
                    .database
                    .as_deref()
                    .filter(|database| !database.is_empty())
            })
            .map(|database| format!("/{database}"))
            .unwrap_or_default();

        // Leftover endpoint options become query-string parameters. Later
        // endpoints override earlier ones; keys render in sorted order.
        let mut options: BTreeMap<String, String> = BTreeMap::new();
        for connection in connections {
            for (key, value) in &connection.params {
                if RESERVED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                options.insert(key.clone(), value.clone());
            }
        }
        let params = options
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    key.clone()
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        let params = if params.is_empty() {
            String::new()
        } else {
            format!("?{params}")
        };

        result.uri = format!("{SCHEME}://{hosts}{database}{params}");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, port: u16, database: &str) -> ConnectionConfig {
        ConnectionConfig::from_host(host, port, database)
    }

    #[tokio::test]
    async fn test_single_connection() {
        let resolver = ConnectionResolver::new(vec![endpoint("localhost", 8092, "test")], None);
        let connection = resolver.resolve("").await.unwrap();
        assert_eq!(connection.uri, "couchbase://localhost:8092/test");
        assert_eq!(connection.username, "");
        assert_eq!(connection.password, "");
    }

    #[tokio::test]
    async fn test_multiple_connections() {
        let resolver = ConnectionResolver::new(
            vec![endpoint("host1", 8092, "test"), endpoint("host2", 8092, "test")],
            None,
        );
        let connection = resolver.resolve("").await.unwrap();
        assert_eq!(connection.uri, "couchbase://host1:8092,host2:8092/test");
        assert_eq!(connection.username, "");
        assert_eq!(connection.password, "");
    }

    #[tokio::test]
    async fn test_connection_with_credentials() {
        let resolver = ConnectionResolver::new(
            vec![endpoint("localhost", 8092, "test")],
            Some(CredentialConfig::new("admin", "password123")),
        );
        let connection = resolver.resolve("").await.unwrap();
        assert_eq!(connection.uri, "couchbase://localhost:8092/test");
        assert_eq!(connection.username, "admin");
        assert_eq!(connection.password, "password123");
    }

    #[tokio::test]
    async fn test_uri_endpoint_short_circuits_composition() {
        let uri = "couchbases://remote.example.com?network=external";
        let resolver = ConnectionResolver::new(
            vec![ConnectionConfig::from_uri(uri), endpoint("ignored", 8092, "test")],
            Some(CredentialConfig::new("admin", "password123")),
        );
        let connection = resolver.resolve("").await.unwrap();
        assert_eq!(connection.uri, uri);
        assert_eq!(connection.username, "admin");
        assert_eq!(connection.password, "password123");
    }

    #[tokio::test]
    async fn test_extra_params_render_as_query_string() {
        let mut first = endpoint("localhost", 8092, "test");
        first
            .params
            .insert("detailed_errcodes".to_string(), "1".to_string());
        first.params.insert("ssl".to_string(), String::new());
        let resolver = ConnectionResolver::new(vec![first], None);
        let connection = resolver.resolve("").await.unwrap();
        assert_eq!(
            connection.uri,
            "couchbase://localhost:8092/test?detailed_errcodes=1&ssl"
        );
    }

    #[tokio::test]
    async fn test_no_endpoints_fails() {
        let resolver = ConnectionResolver::new(Vec::new(), None);
        let err = resolver.resolve("").await.unwrap_err();
        assert!(matches!(err, Error::Config { code: "NO_CONNECTION", .. }));
    }

    #[tokio::test]
    async fn test_endpoint_without_host_fails() {
        let config = ConnectionConfig {
            port: Some(8092),
            ..ConnectionConfig::default()
        };
        let resolver = ConnectionResolver::new(vec![config], None);
        let err = resolver.resolve("").await.unwrap_err();
        assert!(matches!(err, Error::Config { code: "NO_HOST", .. }));
    }

    #[tokio::test]
    async fn test_endpoint_without_port_fails() {
        let config = ConnectionConfig {
            host: Some("localhost".to_string()),
            ..ConnectionConfig::default()
        };
        let resolver = ConnectionResolver::new(vec![config], None);
        let err = resolver.resolve("").await.unwrap_err();
        assert!(matches!(err, Error::Config { code: "NO_PORT", .. }));
    }

    #[tokio::test]
    async fn test_host_without_database() {
        let config = ConnectionConfig {
            host: Some("localhost".to_string()),
            port: Some(8092),
            ..ConnectionConfig::default()
        };
        let resolver = ConnectionResolver::new(vec![config], None);
        let connection = resolver.resolve("").await.unwrap();
        assert_eq!(connection.uri, "couchbase://localhost:8092");
    }

    struct FixedDiscovery(Vec<ConnectionConfig>);

    #[async_trait]
    impl EndpointDiscovery for FixedDiscovery {
        async fn resolve_all(&self, _trace_id: &str, _key: &str) -> Result<Vec<ConnectionConfig>> {
            Ok(self.0.clone())
        }
    }

    struct FixedStore(CredentialConfig);

    #[async_trait]
    impl CredentialStore for FixedStore {
        async fn lookup(&self, _trace_id: &str, _key: &str) -> Result<Option<CredentialConfig>> {
            Ok(Some(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn test_discovery_and_store_collaborators() {
        let discovered = endpoint("discovered", 8092, "test");
        let seed = ConnectionConfig {
            discovery_key: Some("cluster".to_string()),
            ..ConnectionConfig::default()
        };
        let credential = CredentialConfig {
            store_key: Some("vault".to_string()),
            ..CredentialConfig::default()
        };
        let resolver = ConnectionResolver::new(vec![seed], Some(credential))
            .with_discovery(Arc::new(FixedDiscovery(vec![discovered])))
            .with_credential_store(Arc::new(FixedStore(CredentialConfig::new(
                "vault-user",
                "vault-pass",
            ))));
        let connection = resolver.resolve("").await.unwrap();
        assert_eq!(connection.uri, "couchbase://discovered:8092/test");
        assert_eq!(connection.username, "vault-user");
        assert_eq!(connection.password, "vault-pass");
    }
}
