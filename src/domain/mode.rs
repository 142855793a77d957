//! Key mode and operation selectors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Where the splitting secret lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// No client secret, all nodes together hold the value
    #[default]
    Cluster,
    /// Values are sealed with a key only this client holds before splitting
    Secret,
}

/// What the stored shares must support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Store and retrieve text and numbers
    #[default]
    Store,
    /// Integers shared additively so nodes can sum them
    Sum,
}

impl FromStr for KeyMode {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cluster" => Ok(Self::Cluster),
            "secret" => Ok(Self::Secret),
            other => Err(CryptoError::KeyGeneration(format!(
                "unknown key mode '{other}'"
            ))),
        }
    }
}

impl FromStr for Operation {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store" => Ok(Self::Store),
            "sum" => Ok(Self::Sum),
            other => Err(CryptoError::KeyGeneration(format!(
                "unsupported operation '{other}'"
            ))),
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cluster => "cluster",
            Self::Secret => "secret",
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Store => "store",
            Self::Sum => "sum",
        })
    }
}
