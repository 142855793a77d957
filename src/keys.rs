//! Splitting keys: generate, split and combine
//!
//! A [`SplittingKey`] is bound to a [`KeyConfig`] (node count, threshold, key
//! mode and operation) and is the only thing that knows how a value turns into
//! shares and back.
//!
//! - `store` values are encoded with [`crate::codec`] and split with Shamir
//!   secret sharing over GF(256). Secret-mode keys seal the encoded value with
//!   XChaCha20-Poly1305 first, so the nodes together still cannot read it.
//! - `sum` values are 32-bit integers shared additively modulo [`SUM_MODULUS`].
//!
//! # Examples
//!
//! ```rust
//! use sharevault::domain::{KeyConfig, KeyMode, Operation};
//! use sharevault::keys::SplittingKey;
//! use sharevault::value::Value;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = SplittingKey::generate(KeyConfig::new(3, KeyMode::Cluster, Operation::Store)?)?;
//! let shares = key.split(&Value::from("Alice"))?;
//! assert_eq!(shares.len(), 3);
//! assert_eq!(key.combine(&shares)?, Value::from("Alice"));
//! # Ok(())
//! # }
//! ```

use blahaj::Sharks;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use zeroize::{Zeroize, Zeroizing};

use crate::codec;
use crate::domain::{KeyConfig, KeyMode, Operation};
use crate::error::CryptoError;
use crate::value::{Scalar, Value};

/// Prime modulus for additive shares (2^32 + 15)
pub const SUM_MODULUS: u64 = (1 << 32) + 15;

const NONCE_LEN: usize = 24;
const SEAL_LABEL: &[u8] = b"sharevault:store";

/// One node's piece of a split value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Share {
    /// Shamir share bytes, base64 encoded
    Text(String),
    /// Additive share modulo [`SUM_MODULUS`]
    Additive(u64),
}

impl From<Share> for Value {
    fn from(share: Share) -> Self {
        match share {
            Share::Text(s) => Value::Scalar(Scalar::Text(s)),
            // < SUM_MODULUS < 2^33
            Share::Additive(n) => Value::Scalar(Scalar::Int(n as i64)),
        }
    }
}

impl TryFrom<&Value> for Share {
    type Error = CryptoError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Scalar(Scalar::Text(s)) => Ok(Self::Text(s.clone())),
            Value::Scalar(Scalar::Int(n)) => u64::try_from(*n)
                .map(Self::Additive)
                .map_err(|_| CryptoError::InvalidShareSet(format!("negative share {n}"))),
            other => Err(CryptoError::InvalidShareSet(format!(
                "{other:?} is not a share"
            ))),
        }
    }
}

struct SecretMaterial([u8; 32]);

impl Drop for SecretMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

enum KeyMaterial {
    Cluster,
    Secret(SecretMaterial),
}

/// Key material for one cluster topology
///
/// Never persisted; lives as long as the client that generated it.
pub struct SplittingKey {
    config: KeyConfig,
    material: KeyMaterial,
}

impl std::fmt::Debug for SplittingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplittingKey")
            .field("config", &self.config)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Derives a key for `nodes` participants
///
/// # Errors
/// Returns [`CryptoError::KeyGeneration`] if `nodes` is 0 or the mode/operation
/// pair is unsupported
pub fn initialize(
    nodes: usize,
    mode: KeyMode,
    operation: Operation,
) -> Result<SplittingKey, CryptoError> {
    SplittingKey::generate(KeyConfig::new(nodes, mode, operation)?)
}

impl SplittingKey {
    /// Generates fresh key material for `config`
    ///
    /// # Errors
    /// Returns [`CryptoError::KeyGeneration`] if the system RNG fails
    pub fn generate(config: KeyConfig) -> Result<Self, CryptoError> {
        let material = match config.mode() {
            KeyMode::Cluster => KeyMaterial::Cluster,
            KeyMode::Secret => {
                let mut bytes = [0u8; 32];
                getrandom::getrandom(&mut bytes)
                    .map_err(|e| CryptoError::KeyGeneration(format!("rng failure: {e}")))?;
                KeyMaterial::Secret(SecretMaterial(bytes))
            }
        };
        Ok(Self { config, material })
    }

    #[must_use]
    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    /// Number of shares every split produces
    #[must_use]
    pub fn share_count(&self) -> usize {
        self.config.topology().nodes()
    }

    /// Splits a scalar into exactly `share_count()` shares
    ///
    /// # Errors
    /// Returns [`CryptoError::UnsupportedValue`] for containers, nested markers,
    /// and scalars the operation has no scheme for
    pub fn split(&self, value: &Value) -> Result<Vec<Share>, CryptoError> {
        let Value::Scalar(scalar) = value else {
            return Err(CryptoError::UnsupportedValue(
                "only scalar values can be split".into(),
            ));
        };
        match self.config.operation() {
            Operation::Store => self.split_store(scalar),
            Operation::Sum => self.split_sum(scalar),
        }
    }

    /// Recombines shares produced by [`SplittingKey::split`], in any order
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidShareSet`] if there are too few or too many
    /// shares, or they were tampered with or come from different values
    pub fn combine(&self, shares: &[Share]) -> Result<Value, CryptoError> {
        if shares.len() > self.share_count() {
            return Err(CryptoError::InvalidShareSet(format!(
                "{} shares for a topology of {}",
                shares.len(),
                self.share_count()
            )));
        }
        match self.config.operation() {
            Operation::Store => self.combine_store(shares),
            Operation::Sum => self.combine_sum(shares),
        }
    }

    fn split_store(&self, scalar: &Scalar) -> Result<Vec<Share>, CryptoError> {
        let encoded = codec::encode_plaintext(scalar)?;
        let secret = match &self.material {
            KeyMaterial::Cluster => encoded,
            KeyMaterial::Secret(key) => seal(key, &encoded)?,
        };

        let sharks = Sharks(*self.config.threshold());
        Ok(sharks
            .dealer(&secret)
            .take(self.share_count())
            .map(|share| {
                let bytes = Zeroizing::new(Vec::from(&share));
                Share::Text(codec::encode_share(&bytes))
            })
            .collect())
    }

    fn combine_store(&self, shares: &[Share]) -> Result<Value, CryptoError> {
        let threshold = *self.config.threshold() as usize;
        if shares.len() < threshold {
            return Err(CryptoError::InvalidShareSet(format!(
                "insufficient shares: need at least {threshold}, got {}",
                shares.len()
            )));
        }

        let parsed = shares
            .iter()
            .map(|share| {
                let Share::Text(text) = share else {
                    return Err(CryptoError::InvalidShareSet(
                        "additive share given to a store key".into(),
                    ));
                };
                let bytes = codec::decode_share(text)?;
                blahaj::Share::try_from(bytes.as_slice()).map_err(|e| {
                    CryptoError::InvalidShareSet(format!("malformed share: {e:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sharks = Sharks(*self.config.threshold());
        let recovered = Zeroizing::new(
            sharks
                .recover(&parsed)
                .map_err(|e| CryptoError::InvalidShareSet(format!("recovery failed: {e:?}")))?,
        );

        let encoded = match &self.material {
            KeyMaterial::Cluster => recovered,
            KeyMaterial::Secret(key) => open(key, &recovered)?,
        };
        codec::decode_plaintext(&encoded).map(Value::Scalar)
    }

    fn split_sum(&self, scalar: &Scalar) -> Result<Vec<Share>, CryptoError> {
        let n = match scalar {
            Scalar::Int(n) => i32::try_from(*n).ok(),
            Scalar::UInt(n) => i32::try_from(*n).ok(),
            _ => {
                return Err(CryptoError::UnsupportedValue(
                    "sum shares are only defined for integers".into(),
                ));
            }
        };
        let n = n.ok_or_else(|| {
            CryptoError::UnsupportedValue(format!(
                "{scalar:?} is outside the 32-bit signed range"
            ))
        })?;

        let target = to_field(i64::from(n));
        let mut shares = Vec::with_capacity(self.share_count());
        let mut acc = 0u64;
        for _ in 1..self.share_count() {
            let r = random_field_element()?;
            acc = (acc + r) % SUM_MODULUS;
            shares.push(Share::Additive(r));
        }
        shares.push(Share::Additive((target + SUM_MODULUS - acc) % SUM_MODULUS));
        Ok(shares)
    }

    fn combine_sum(&self, shares: &[Share]) -> Result<Value, CryptoError> {
        if shares.len() != self.share_count() {
            return Err(CryptoError::InvalidShareSet(format!(
                "sum shares need all {} nodes, got {}",
                self.share_count(),
                shares.len()
            )));
        }
        let mut acc = 0u64;
        for share in shares {
            match share {
                Share::Additive(n) if *n < SUM_MODULUS => acc = (acc + n) % SUM_MODULUS,
                Share::Additive(n) => {
                    return Err(CryptoError::InvalidShareSet(format!(
                        "share {n} is outside the field"
                    )));
                }
                Share::Text(_) => {
                    return Err(CryptoError::InvalidShareSet(
                        "text share given to a sum key".into(),
                    ));
                }
            }
        }
        from_field(acc).map(Value::from)
    }
}

fn to_field(n: i64) -> u64 {
    // SUM_MODULUS < i64::MAX
    let modulus = SUM_MODULUS as i64;
    n.rem_euclid(modulus) as u64
}

fn from_field(n: u64) -> Result<i64, CryptoError> {
    const HALF: u64 = 1 << 31;
    if n < HALF {
        Ok(n as i64)
    } else if n >= SUM_MODULUS - HALF {
        Ok(n as i64 - SUM_MODULUS as i64)
    } else {
        Err(CryptoError::InvalidShareSet(
            "recombined sum is outside the 32-bit range, shares are tampered".into(),
        ))
    }
}

fn random_field_element() -> Result<u64, CryptoError> {
    let limit = u64::MAX - (u64::MAX % SUM_MODULUS);
    loop {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| CryptoError::KeyGeneration(format!("rng failure: {e}")))?;
        let candidate = u64::from_be_bytes(bytes);
        if candidate < limit {
            return Ok(candidate % SUM_MODULUS);
        }
    }
}

fn cipher(key: &SecretMaterial) -> Result<XChaCha20Poly1305, CryptoError> {
    XChaCha20Poly1305::new_from_slice(&key.0)
        .map_err(|_| CryptoError::KeyGeneration("key length must be 32 bytes".into()))
}

fn seal(key: &SecretMaterial, plaintext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = cipher(key)?;
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| CryptoError::KeyGeneration(format!("rng failure: {e}")))?;

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: SEAL_LABEL,
            },
        )
        .map_err(|_| CryptoError::UnsupportedValue("encryption failed".into()))?;

    let mut sealed = Zeroizing::new(Vec::with_capacity(NONCE_LEN + ciphertext.len()));
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open(key: &SecretMaterial, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::InvalidShareSet("sealed value is too short".into()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = cipher(key)?;
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: SEAL_LABEL,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| {
            CryptoError::InvalidShareSet("authentication failed, shares are tampered".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Threshold, Topology};

    fn key(nodes: usize, mode: KeyMode, operation: Operation) -> SplittingKey {
        initialize(nodes, mode, operation).unwrap()
    }

    #[test]
    fn test_empty_topology_fails() {
        let err = initialize(0, KeyMode::Cluster, Operation::Store).unwrap_err();
        assert!(matches!(err, CryptoError::KeyGeneration(_)));
    }

    #[test]
    fn test_store_round_trip_both_modes() {
        for mode in [KeyMode::Cluster, KeyMode::Secret] {
            let key = key(3, mode, Operation::Store);
            for value in [Value::from("Alice"), Value::from(30), Value::from(-7)] {
                let shares = key.split(&value).unwrap();
                assert_eq!(shares.len(), 3);
                assert_eq!(key.combine(&shares).unwrap(), value);
            }
        }
    }

    #[test]
    fn test_single_node_round_trip() {
        let key = key(1, KeyMode::Cluster, Operation::Store);
        let shares = key.split(&Value::from("solo")).unwrap();
        assert_eq!(key.combine(&shares).unwrap(), Value::from("solo"));
    }

    #[test]
    fn test_combine_in_any_order() {
        let key = key(4, KeyMode::Cluster, Operation::Store);
        let mut shares = key.split(&Value::from("order")).unwrap();
        shares.reverse();
        shares.swap(0, 2);
        assert_eq!(key.combine(&shares).unwrap(), Value::from("order"));
    }

    #[test]
    fn test_short_share_set_rejected() {
        let key = key(3, KeyMode::Cluster, Operation::Store);
        let shares = key.split(&Value::from("Alice")).unwrap();
        let err = key.combine(&shares[..2]).unwrap_err();
        assert!(err.to_string().contains("insufficient shares"));
    }

    #[test]
    fn test_tampered_share_rejected() {
        for mode in [KeyMode::Cluster, KeyMode::Secret] {
            let key = key(3, mode, Operation::Store);
            let mut shares = key.split(&Value::from("Alice")).unwrap();
            let Share::Text(text) = &shares[1] else {
                unreachable!()
            };
            let mut bytes = codec::decode_share(text).unwrap();
            bytes[1] ^= 0x5a;
            shares[1] = Share::Text(codec::encode_share(&bytes));
            assert!(matches!(
                key.combine(&shares),
                Err(CryptoError::InvalidShareSet(_))
            ));
        }
    }

    #[test]
    fn test_lowered_threshold_recovers_from_subset() {
        let config = KeyConfig::with_threshold(
            Topology::new(3).unwrap(),
            Threshold::new(2).unwrap(),
            KeyMode::Cluster,
            Operation::Store,
        )
        .unwrap();
        let key = SplittingKey::generate(config).unwrap();
        let shares = key.split(&Value::from("quorum")).unwrap();
        assert_eq!(
            key.combine(&[shares[2].clone(), shares[0].clone()]).unwrap(),
            Value::from("quorum")
        );
    }

    #[test]
    fn test_containers_unsupported() {
        let key = key(2, KeyMode::Cluster, Operation::Store);
        let err = key.split(&Value::Sequence(vec![])).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedValue(_)));
        let err = key.split(&Value::from(serde_json::json!(true))).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedValue(_)));
    }

    #[test]
    fn test_sum_round_trip_and_limits() {
        let key = key(3, KeyMode::Cluster, Operation::Sum);
        for n in [0, 1, -1, i64::from(i32::MAX), i64::from(i32::MIN)] {
            let shares = key.split(&Value::from(n)).unwrap();
            assert!(shares.iter().all(|s| matches!(s, Share::Additive(v) if *v < SUM_MODULUS)));
            assert_eq!(key.combine(&shares).unwrap(), Value::from(n));
        }
        assert!(key.split(&Value::from("text")).is_err());
        assert!(key.split(&Value::from(i64::from(i32::MAX) + 1)).is_err());
    }

    #[test]
    fn test_sum_short_set_rejected() {
        let key = key(3, KeyMode::Cluster, Operation::Sum);
        let shares = key.split(&Value::from(42)).unwrap();
        assert!(key.combine(&shares[..2]).is_err());
    }

    #[test]
    fn test_shares_of_one_key_do_not_open_with_another() {
        let a = key(2, KeyMode::Secret, Operation::Store);
        let b = key(2, KeyMode::Secret, Operation::Store);
        let shares = a.split(&Value::from("private")).unwrap();
        assert!(b.combine(&shares).is_err());
    }

    #[test]
    fn test_debug_redacts_material() {
        let key = key(2, KeyMode::Secret, Operation::Store);
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
