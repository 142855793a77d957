//! Per-node authentication tokens
//!
//! Nodes accept a compact JWS (`header.claims.signature`, base64url without
//! padding) signed with ES256K: ECDSA over secp256k1 with a SHA-256 digest.
//! The claims name the organization (`iss`), the node (`aud`) and an expiry
//! (`exp`, seconds since the Unix epoch).
//!
//! Tokens are cheap and stateless, so they are minted for every request and
//! never cached.
//!
//! # Examples
//!
//! ```rust
//! use sharevault::auth::{NodeAuthenticator, derive_signing_key, verify_token};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = derive_signing_key("0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")?;
//! let auth = NodeAuthenticator::new("did:nil:org", key, 60);
//!
//! let token = auth.issue_token_at("did:nil:node-a", 1_000)?;
//! let claims = verify_token(&token, &auth.verifying_key(), "did:nil:node-a", 1_030)?;
//! assert_eq!(claims.iss, "did:nil:org");
//! assert_eq!(claims.exp, 1_060);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::{Credentials, Node};
use crate::error::{Error, Result};

/// JWS algorithm name for ECDSA over secp256k1 with SHA-256
pub const ALGORITHM: &str = "ES256K";

const SCALAR_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a node token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub exp: u64,
}

/// Parses a hex-encoded secp256k1 scalar, with or without a `0x` prefix
///
/// Shorter inputs are left-padded with zeros, as the key is a big-endian integer.
///
/// # Errors
/// Returns [`Error::InvalidKeyMaterial`] if the input is not hex, is longer than
/// 32 bytes, or is not a valid non-zero scalar on the curve
pub fn derive_signing_key(raw_hex_key: &str) -> Result<SigningKey> {
    let trimmed = raw_hex_key.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(digits).map_err(|e| Error::InvalidKeyMaterial(format!("not hex: {e}")))?,
    );
    if bytes.is_empty() || bytes.len() > SCALAR_LEN {
        return Err(Error::InvalidKeyMaterial(format!(
            "expected 1 to {SCALAR_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut scalar = Zeroizing::new([0u8; SCALAR_LEN]);
    scalar[SCALAR_LEN - bytes.len()..].copy_from_slice(&bytes);
    SigningKey::from_slice(scalar.as_slice())
        .map_err(|_| Error::InvalidKeyMaterial("not a valid secp256k1 scalar".into()))
}

/// Mints node tokens for one organization
///
/// Owns its curve and algorithm; nothing is registered globally.
#[derive(Clone)]
pub struct NodeAuthenticator {
    org_did: String,
    signing_key: SigningKey,
    ttl_secs: u64,
}

impl std::fmt::Debug for NodeAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeAuthenticator")
            .field("org_did", &self.org_did)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl NodeAuthenticator {
    #[must_use]
    pub fn new(org_did: impl Into<String>, signing_key: SigningKey, ttl_secs: u64) -> Self {
        Self {
            org_did: org_did.into(),
            signing_key,
            ttl_secs,
        }
    }

    /// Builds an authenticator from organization credentials
    ///
    /// # Errors
    /// Returns [`Error::InvalidKeyMaterial`] if the private key cannot be parsed
    pub fn from_credentials(credentials: &Credentials, ttl_secs: u64) -> Result<Self> {
        let signing_key = derive_signing_key(&credentials.secret_key)?;
        Ok(Self::new(credentials.org_did.clone(), signing_key, ttl_secs))
    }

    #[must_use]
    pub fn org_did(&self) -> &str {
        &self.org_did
    }

    /// Public half of the signing key, as nodes would register it
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// Mints a token for `node_did` that expires `ttl_secs` from now
    ///
    /// # Errors
    /// Returns [`Error::InvalidKeyMaterial`] if signing fails
    pub fn issue_token(&self, node_did: &str) -> Result<String> {
        self.issue_token_at(node_did, unix_now())
    }

    /// Mints a token as if the current time were `now` (seconds since epoch)
    ///
    /// # Errors
    /// Returns [`Error::InvalidKeyMaterial`] if signing fails
    pub fn issue_token_at(&self, node_did: &str, now: u64) -> Result<String> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            iss: self.org_did.clone(),
            aud: node_did.to_string(),
            exp: now.saturating_add(self.ttl_secs),
        };
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature: Signature = self
            .signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|e| Error::InvalidKeyMaterial(format!("signing failed: {e}")))?;
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Mints one token per node, keyed by node DID
    ///
    /// A DID listed twice yields a single entry; [`ClusterConfig::validate`]
    /// rejects such rosters.
    ///
    /// [`ClusterConfig::validate`]: crate::config::ClusterConfig::validate
    ///
    /// # Errors
    /// Fails on the first signing error; a bad key fails for every node alike
    pub fn issue_tokens_for_all(&self, nodes: &[Node]) -> Result<BTreeMap<String, String>> {
        let now = unix_now();
        nodes
            .iter()
            .map(|node| Ok((node.did.clone(), self.issue_token_at(&node.did, now)?)))
            .collect()
    }
}

/// Verifies a node token and returns its claims
///
/// A token is expired once `now` reaches `exp`, so a zero TTL token is never valid.
///
/// # Errors
/// Returns [`Error::InvalidToken`] for a malformed token, an algorithm other
/// than ES256K, a bad signature, a different audience, or an expired token
pub fn verify_token(
    token: &str,
    verifying_key: &VerifyingKey,
    audience: &str,
    now: u64,
) -> Result<Claims> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidToken("expected three segments".into()));
    };

    let header: Header = decode_segment(header_b64)?;
    if header.alg != ALGORITHM {
        return Err(Error::InvalidToken(format!(
            "unsupported algorithm {}",
            header.alg
        )));
    }

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| Error::InvalidToken(format!("signature is not base64url: {e}")))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|_| Error::InvalidToken("malformed signature".into()))?;
    let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::InvalidToken("signature mismatch".into()))?;

    let claims: Claims = decode_segment(claims_b64)?;
    if claims.aud != audience {
        return Err(Error::InvalidToken(format!(
            "audience {} does not match {audience}",
            claims.aud
        )));
    }
    if now >= claims.exp {
        return Err(Error::InvalidToken("token expired".into()));
    }
    Ok(claims)
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| Error::InvalidToken(format!("segment is not base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::InvalidToken(format!("bad segment: {e}")))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
