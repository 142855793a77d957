//! Validated parameters for a splitting key

use crate::error::CryptoError;

use super::{KeyMode, Operation, Threshold, Topology};

/// Topology, threshold, mode and operation of a splitting key
///
/// Enforces at construction that the threshold never exceeds the topology and
/// that additive sharing is only requested where it is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyConfig {
    topology: Topology,
    threshold: Threshold,
    mode: KeyMode,
    operation: Operation,
}

impl KeyConfig {
    /// Creates a key configuration where every node is needed to recombine
    ///
    /// # Errors
    /// Returns an error if `nodes` is empty or the mode/operation pair is unsupported
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharevault::domain::{KeyConfig, KeyMode, Operation};
    ///
    /// let config = KeyConfig::new(3, KeyMode::Cluster, Operation::Store).unwrap();
    /// assert_eq!(*config.topology(), 3);
    /// assert_eq!(*config.threshold(), 3);
    ///
    /// // Sum shares only exist for cluster keys
    /// assert!(KeyConfig::new(3, KeyMode::Secret, Operation::Sum).is_err());
    /// assert!(KeyConfig::new(0, KeyMode::Cluster, Operation::Store).is_err());
    /// ```
    pub fn new(nodes: usize, mode: KeyMode, operation: Operation) -> Result<Self, CryptoError> {
        let topology = Topology::new(nodes)?;
        Self::with_threshold(topology, Threshold::new(*topology)?, mode, operation)
    }

    /// Creates a key configuration with an explicit reconstruction threshold
    ///
    /// # Errors
    /// Returns an error if threshold exceeds topology, or if a lowered threshold or
    /// secret mode is combined with the `sum` operation
    pub fn with_threshold(
        topology: Topology,
        threshold: Threshold,
        mode: KeyMode,
        operation: Operation,
    ) -> Result<Self, CryptoError> {
        if *threshold > *topology {
            return Err(CryptoError::KeyGeneration(format!(
                "threshold {} cannot exceed topology {}",
                *threshold, *topology
            )));
        }
        if operation == Operation::Sum {
            if mode != KeyMode::Cluster {
                return Err(CryptoError::KeyGeneration(
                    "sum operation requires a cluster key".into(),
                ));
            }
            if *threshold != *topology {
                return Err(CryptoError::KeyGeneration(
                    "sum operation needs every node to recombine".into(),
                ));
            }
        }
        Ok(Self {
            topology,
            threshold,
            mode,
            operation,
        })
    }

    #[must_use]
    pub fn topology(&self) -> Topology {
        self.topology
    }

    #[must_use]
    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    #[must_use]
    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }
}
