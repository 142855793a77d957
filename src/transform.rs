//! Marked-field transformation between records and share-documents
//!
//! All three operations are the same walk ([`Value::map_marked`]) with a
//! different action at each marked field:
//!
//! 1. [`mark_and_split`] replaces the plaintext with the full share sequence.
//! 2. [`project_for_node`] keeps only the share addressed to one node.
//! 3. [`recombine`] gathers the share at the same location in every fragment
//!    and turns it back into plaintext.

use crate::domain::{ShareIndex, Topology};
use crate::error::CryptoError;
use crate::keys::{Share, SplittingKey};
use crate::value::Value;

/// Splits every marked field of `record` into one share per node
///
/// The marker wrapper is kept, its content becomes the share sequence.
/// Unmarked fields, including sequences of scalars, pass through untouched.
///
/// # Errors
/// Returns the first [`CryptoError`] raised by [`SplittingKey::split`]
pub fn mark_and_split(key: &SplittingKey, record: &Value) -> Result<Value, CryptoError> {
    record.map_marked(|_, plaintext| {
        let shares = key.split(plaintext)?;
        Ok(Value::marked(Value::Sequence(
            shares.into_iter().map(Value::from).collect(),
        )))
    })
}

/// Builds the share-document for the node at `node_index`
///
/// # Errors
/// Returns [`CryptoError::ShareCountMismatch`] if a marked field does not carry
/// exactly `node_count` shares, and [`CryptoError::InvalidShareSet`] if a marked
/// field was never split
pub fn project_for_node(
    record_with_shares: &Value,
    node_index: usize,
    node_count: usize,
) -> Result<Value, CryptoError> {
    let index = ShareIndex::within(node_index, Topology::new(node_count)?)?;
    record_with_shares.map_marked(|path, content| match content {
        Value::Sequence(shares) if shares.len() == node_count => {
            Ok(Value::marked(shares[index.position()].clone()))
        }
        Value::Sequence(shares) => Err(CryptoError::ShareCountMismatch {
            expected: node_count,
            found: shares.len(),
        }),
        _ => Err(CryptoError::InvalidShareSet(format!(
            "marked field at {path} was not split"
        ))),
    })
}

/// Rebuilds the plaintext record from the fragments of one record group
///
/// The first fragment provides the shape and every unmarked field. For each of
/// its marked fields the share at the same location is taken from every
/// fragment, in whatever order the fragments arrive.
///
/// # Errors
/// Returns [`CryptoError::InvalidShareSet`] if there are no fragments, a fragment
/// lacks a share the others have, or [`SplittingKey::combine`] rejects the set
pub fn recombine(key: &SplittingKey, fragments: &[Value]) -> Result<Value, CryptoError> {
    let Some(first) = fragments.first() else {
        return Err(CryptoError::InvalidShareSet("no fragments to recombine".into()));
    };
    first.map_marked(|path, _| {
        let shares = fragments
            .iter()
            .map(|fragment| match fragment.at(path) {
                Some(Value::Marked(share)) => Share::try_from(share.as_ref()),
                _ => Err(CryptoError::InvalidShareSet(format!(
                    "fragment has no share at {path}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        key.combine(&shares)
    })
}
