//! `ShareIndex` newtype for per-node projection

use crate::error::CryptoError;

use super::Topology;

/// Position of a node in the roster, and therefore of its share (0..topology)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShareIndex(u8);

impl ShareIndex {
    /// Creates a share index that is valid for `topology`
    ///
    /// # Errors
    /// Returns [`CryptoError::ShareCountMismatch`] if the index does not address a node
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharevault::domain::{ShareIndex, Topology};
    ///
    /// let topology = Topology::new(3).unwrap();
    /// assert_eq!(*ShareIndex::within(2, topology).unwrap(), 2);
    /// assert!(ShareIndex::within(3, topology).is_err());
    /// ```
    pub fn within(index: usize, topology: Topology) -> Result<Self, CryptoError> {
        let mismatch = || CryptoError::ShareCountMismatch {
            expected: topology.nodes(),
            found: index.saturating_add(1),
        };
        if index >= topology.nodes() {
            return Err(mismatch());
        }
        u8::try_from(index).map(Self).map_err(|_| mismatch())
    }

    /// Index as a `usize`, for slicing share sequences
    #[must_use]
    pub fn position(self) -> usize {
        self.0 as usize
    }
}

impl std::ops::Deref for ShareIndex {
    type Target = u8;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
