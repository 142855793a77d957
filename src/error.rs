//! Error taxonomy for the share vault client

use thiserror::Error;

/// Failures of the splitting layer
///
/// These are fatal to the operation that raised them: a record whose shares
/// cannot be produced or recombined will never succeed as constructed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The key could not be derived for the requested topology
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    /// The value has no splitting scheme under the active key
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
    /// The shares are short, tampered with or otherwise inconsistent
    #[error("invalid share set: {0}")]
    InvalidShareSet(String),
    /// A marked field carries a different number of shares than there are nodes
    #[error("share count mismatch: expected {expected} shares, found {found}")]
    ShareCountMismatch { expected: usize, found: usize },
}

/// Failure of a single node request
///
/// Captured per node and reported next to the sibling results; never aborts
/// the rest of a cluster-wide operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The request could not be sent or the connection failed
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    /// The node answered with a non-2xx status
    #[error("{url} answered with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    /// The node answered with a body that is not the expected JSON
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Errors surfaced by the library
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing configuration (empty node list, missing schema, ...)
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The organization private key could not be parsed or used for signing
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    /// A token failed verification (bad signature, wrong audience, expired)
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The caller handed over something that is not a storable record
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// A data operation was attempted before `ClusterClient::initialize`
    #[error("cluster client not initialized, call initialize() first")]
    NotInitialized,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
