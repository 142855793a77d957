//! Cluster configuration
//!
//! Loaded from a JSON file, optionally overridden from the environment:
//!
//! ```json
//! {
//!   "nodes": [
//!     {"url": "https://node-a.example.com", "did": "did:nil:testnet:node-a"},
//!     {"url": "https://node-b.example.com", "did": "did:nil:testnet:node-b"}
//!   ],
//!   "credentials": {"org_did": "did:nil:testnet:org", "secret_key": "0x..."},
//!   "schema_id": "5b8f...",
//!   "operation": "store",
//!   "key_mode": "cluster",
//!   "token_ttl_secs": 3600
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::domain::{KeyMode, Operation};
use crate::error::{Error, Result};

pub const ENV_ORG_DID: &str = "SHAREVAULT_ORG_DID";
pub const ENV_SECRET_KEY: &str = "SHAREVAULT_SECRET_KEY";
pub const ENV_SCHEMA_ID: &str = "SHAREVAULT_SCHEMA_ID";

pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// A storage node: where to reach it and who it is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub url: String,
    pub did: String,
}

impl Node {
    pub fn new(url: impl Into<String>, did: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            did: did.into(),
        }
    }
}

/// Organization identity and signing key; never sent over the wire
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    pub org_did: String,
    #[serde(default)]
    pub secret_key: Zeroizing<String>,
}

impl Credentials {
    pub fn new(org_did: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            org_did: org_did.into(),
            secret_key: Zeroizing::new(secret_key.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("org_did", &self.org_did)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Everything a [`crate::client::ClusterClient`] needs at construction
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub schema_id: Option<String>,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub key_mode: KeyMode,
    /// Shares needed to recombine; defaults to the node count
    #[serde(default)]
    pub threshold: Option<u8>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl ClusterConfig {
    /// Configuration with defaults for everything but nodes and credentials
    #[must_use]
    pub fn new(nodes: Vec<Node>, credentials: Credentials) -> Self {
        Self {
            nodes,
            credentials,
            schema_id: None,
            operation: Operation::default(),
            key_mode: KeyMode::default(),
            threshold: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Reads a JSON configuration file
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("cannot parse {}: {e}", path.display())))
    }

    /// Overrides credentials and schema from `SHAREVAULT_*` environment variables
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(org_did) = lookup(ENV_ORG_DID) {
            self.credentials.org_did = org_did;
        }
        if let Some(secret_key) = lookup(ENV_SECRET_KEY) {
            self.credentials.secret_key = Zeroizing::new(secret_key);
        }
        if let Some(schema_id) = lookup(ENV_SCHEMA_ID) {
            self.schema_id = Some(schema_id);
        }
        self
    }

    #[must_use]
    pub fn with_schema_id(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks the parts of the configuration that cannot be fixed later
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an empty roster, a node without a
    /// DID or with a non-HTTP URL, a DID or URL listed twice, or a missing
    /// organization DID
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Configuration("node list is empty".into()));
        }
        let mut dids = HashSet::new();
        let mut urls = HashSet::new();
        for node in &self.nodes {
            if node.did.trim().is_empty() {
                return Err(Error::Configuration(format!("node {} has no DID", node.url)));
            }
            if !(node.url.starts_with("https://") || node.url.starts_with("http://")) {
                return Err(Error::Configuration(format!(
                    "node URL '{}' must start with http:// or https://",
                    node.url
                )));
            }
            // tokens and read quorum are keyed per node
            if !dids.insert(node.did.as_str()) {
                return Err(Error::Configuration(format!(
                    "node DID {} is listed twice",
                    node.did
                )));
            }
            if !urls.insert(node.url.trim_end_matches('/')) {
                return Err(Error::Configuration(format!(
                    "node URL {} is listed twice",
                    node.url
                )));
            }
        }
        if self.credentials.org_did.trim().is_empty() {
            return Err(Error::Configuration("organization DID is missing".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClusterConfig {
        serde_json::from_str(
            r#"{
                "nodes": [
                    {"url": "https://a.example.com", "did": "did:nil:a"},
                    {"url": "https://b.example.com", "did": "did:nil:b"}
                ],
                "credentials": {"org_did": "did:nil:org", "secret_key": "01"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = sample();
        assert_eq!(config.operation, Operation::Store);
        assert_eq!(config.key_mode, KeyMode::Cluster);
        assert_eq!(config.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(config.threshold, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_node_list_rejected() {
        let mut config = sample();
        config.nodes.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("node list is empty"));
    }

    #[test]
    fn test_bad_url_rejected() {
        let mut config = sample();
        config.nodes[0].url = "ftp://a.example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_repeated_node_rejected() {
        let mut config = sample();
        config.nodes[1].did = "did:nil:a".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DID did:nil:a is listed twice"));

        let mut config = sample();
        config.nodes[1].url = "https://a.example.com/".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("is listed twice"));
    }

    #[test]
    fn test_overrides() {
        let config = sample().with_overrides(|name| match name {
            ENV_SCHEMA_ID => Some("schema-1".into()),
            ENV_SECRET_KEY => Some("02".into()),
            _ => None,
        });
        assert_eq!(config.schema_id.as_deref(), Some("schema-1"));
        assert_eq!(config.credentials.secret_key.as_str(), "02");
        assert_eq!(config.credentials.org_did, "did:nil:org");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("did:nil:org", "deadbeef");
        let printed = format!("{creds:?}");
        assert!(!printed.contains("deadbeef"));
    }
}
