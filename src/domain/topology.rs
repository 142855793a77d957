//! `Topology` newtype for the node cluster

use crate::error::CryptoError;

/// Number of nodes a key splits across (1..=254)
///
/// Every split produces exactly this many shares. The maximum is 254 because
/// share coordinates live in GF(256) and the blahaj crate reserves one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Topology(u8);

impl Topology {
    /// Minimum valid topology
    pub const MIN: u8 = 1;

    /// Maximum valid topology (254)
    pub const MAX: u8 = 254;

    /// Creates a topology from a node count
    ///
    /// # Errors
    /// Returns [`CryptoError::KeyGeneration`] if the count is 0 or above 254
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharevault::domain::Topology;
    ///
    /// let topology = Topology::new(3).unwrap();
    /// assert_eq!(*topology, 3);
    ///
    /// // An empty cluster cannot hold shares
    /// assert!(Topology::new(0).is_err());
    /// assert!(Topology::new(255).is_err());
    /// ```
    pub fn new(nodes: usize) -> Result<Self, CryptoError> {
        if nodes == 0 {
            return Err(CryptoError::KeyGeneration(
                "topology must contain at least one node".into(),
            ));
        }
        u8::try_from(nodes)
            .ok()
            .filter(|n| *n <= Self::MAX)
            .map(Self)
            .ok_or_else(|| {
                CryptoError::KeyGeneration(format!(
                    "topology of {nodes} nodes exceeds the maximum of {}",
                    Self::MAX
                ))
            })
    }

    /// Node count as a `usize`
    #[must_use]
    pub fn nodes(self) -> usize {
        self.0 as usize
    }
}

impl std::ops::Deref for Topology {
    type Target = u8;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
