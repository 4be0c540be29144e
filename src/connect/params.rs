//! Resolved connection parameters.

/// Resolved connection parameters: one URI plus optional credentials.
///
/// Produced by [`ConnectionResolver::resolve`](super::ConnectionResolver::resolve)
/// and consumed once by
/// [`ClusterConnection::open`](super::ClusterConnection::open). Empty
/// username/password mean "no credentials".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Composed (or passed-through) connection URI.
    pub uri: String,
    /// User name; empty when unauthenticated.
    pub username: String,
    /// User password; only meaningful when `username` is non-empty.
    pub password: String,
}

impl ConnectionParams {
    /// Returns `true` when credentials were resolved.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}
