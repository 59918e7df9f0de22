//! Connection context classification.
//!
//! Every transport session builds a [`ConnectionContext`] when it is
//! established and hands it by reference to tool listing and invocation.
//! The coordinator never stores one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a session comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// stdio subprocess or an explicitly trusted transport
    Local,
    /// HTTP or WebSocket client
    Remote,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Coarse trust level reported back to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Local session, full tool access
    Trusted,
    /// Remote session whose client declared its capabilities
    Standard,
    /// Anonymous remote session
    Restricted,
}

/// Per-session classification used by the tool visibility policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionContext {
    pub connection_type: ConnectionType,
    pub security_level: SecurityLevel,
    /// Capabilities the client declared during `initialize`
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub client_capabilities: BTreeSet<String>,
}

impl ConnectionContext {
    pub fn new(connection_type: ConnectionType) -> Self {
        Self {
            connection_type,
            security_level: derive_security_level(connection_type, &BTreeSet::new()),
            client_capabilities: BTreeSet::new(),
        }
    }

    pub fn local() -> Self {
        Self::new(ConnectionType::Local)
    }

    pub fn remote() -> Self {
        Self::new(ConnectionType::Remote)
    }

    /// Record the capabilities a client declared and re-derive the level.
    pub fn with_client_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.client_capabilities = caps.into_iter().map(Into::into).collect();
        self.security_level = derive_security_level(self.connection_type, &self.client_capabilities);
        self
    }

    pub fn is_local(&self) -> bool {
        self.connection_type == ConnectionType::Local
    }
}

fn derive_security_level(connection_type: ConnectionType, caps: &BTreeSet<String>) -> SecurityLevel {
    match connection_type {
        ConnectionType::Local => SecurityLevel::Trusted,
        ConnectionType::Remote if caps.is_empty() => SecurityLevel::Restricted,
        ConnectionType::Remote => SecurityLevel::Standard,
    }
}
