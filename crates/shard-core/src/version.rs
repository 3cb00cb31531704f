//! # Artifact Versions
//!
//! Strict `X.Y.Z` numeric versions. No pre-release tags, no leading `v`,
//! no missing components. Ordering is numeric per component, so `1.0.10`
//! sorts after `1.0.9`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ShardError;

/// A strict three-component numeric version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Version assumed for an artifact with no recorded history.
    pub const BASELINE: Version = Version::new(1, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The same version with the patch component incremented.
    pub fn next_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ShardError::version(None, format!("malformed version {s:?}, expected X.Y.Z"));
        let mut parts = [0u64; 3];
        let mut count = 0;
        for part in s.split('.') {
            if count == 3 || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            parts[count] = part.parse().map_err(|_| malformed())?;
            count += 1;
        }
        if count != 3 {
            return Err(malformed());
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = ShardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}
