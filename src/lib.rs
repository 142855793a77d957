//! Client for a document store that keeps sensitive fields secret-shared
//! across a cluster of independent nodes.
//!
//! Fields wrapped as `{"%allot": value}` are split into one share per node
//! before they leave the process; every node stores a share-document that
//! differs only in those fields. Reading fetches the share-documents from all
//! nodes, groups them by `_id` and recombines the plaintext.
//!
//! ```no_run
//! # async fn run() -> sharevault::Result<()> {
//! use sharevault::{ClusterClient, ClusterConfig, Value};
//!
//! let config = ClusterConfig::from_file("cluster.json")?.with_env_overrides();
//! let mut client = ClusterClient::new(config)?;
//! client.initialize()?;
//!
//! let record = Value::from(serde_json::json!({"name": {"%allot": "Alice"}}));
//! let written = client.write(vec![record]).await?;
//! let read = client.read(serde_json::json!({"_id": written.ids[0]})).await?;
//! assert_eq!(read.records.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod keys;
pub mod transform;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod commands;

pub use auth::NodeAuthenticator;
pub use client::{
    ClusterClient, NodeOutcome, ReadOutcome, ReconstructedRecord, SchemaCreation, SchemaSummary,
    UnrecoverableRecord, WriteOutcome,
};
pub use config::{ClusterConfig, Credentials, Node};
pub use domain::{KeyConfig, KeyMode, Operation};
pub use error::{CryptoError, Error, NodeError, Result};
pub use keys::{Share, SplittingKey};
pub use value::Value;
