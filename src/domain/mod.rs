//! Domain types for splitting keys
//!
//! This module contains validated newtypes and configuration for secret splitting:
//! - [`Topology`] - Number of nodes a key splits across (1..=254)
//! - [`Threshold`] - Minimum shares required for reconstruction (1..=topology)
//! - [`ShareIndex`] - Position of a node's share (0..topology)
//! - [`KeyMode`] / [`Operation`] - Cluster or secret key, store or sum shares
//! - [`KeyConfig`] - Validated combination of the above

mod config;
mod mode;
mod share_index;
mod threshold;
mod topology;

pub use config::KeyConfig;
pub use mode::{KeyMode, Operation};
pub use share_index::ShareIndex;
pub use threshold::Threshold;
pub use topology::Topology;
