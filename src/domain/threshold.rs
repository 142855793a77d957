//! Threshold newtype for share reconstruction

use crate::error::CryptoError;

/// Minimum number of shares needed to recombine a value (1..=254)
///
/// Defaults to the node count, in which case every node must contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Threshold(u8);

impl Threshold {
    /// Creates a new threshold, returning an error if value is 0
    ///
    /// # Errors
    /// Returns [`CryptoError::KeyGeneration`] if the threshold is 0
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharevault::domain::Threshold;
    ///
    /// let threshold = Threshold::new(2).unwrap();
    /// assert_eq!(*threshold, 2);
    ///
    /// assert!(Threshold::new(0).is_err());
    /// ```
    pub fn new(value: u8) -> Result<Self, CryptoError> {
        if value == 0 {
            return Err(CryptoError::KeyGeneration(
                "threshold must be at least 1".into(),
            ));
        }
        Ok(Self(value))
    }
}

impl std::ops::Deref for Threshold {
    type Target = u8;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
