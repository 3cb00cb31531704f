//! # Identity Newtypes
//!
//! Validated identifiers for artifacts. An [`ArtifactKey`] is embedded in
//! file paths, cache keys and session tokens, so its alphabet excludes the
//! separators those formats rely on (`/` and `:`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ShardError;

/// Maximum length of an artifact key.
pub const MAX_ARTIFACT_KEY_LEN: usize = 64;

/// Identifier of a distributable artifact, e.g. `text_detector`.
///
/// Must start with an ASCII alphanumeric character and contain only ASCII
/// alphanumerics, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Validate and wrap a key.
    pub fn new(value: impl Into<String>) -> Result<Self, ShardError> {
        let value = value.into();
        validate_key(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_key(value: &str) -> Result<(), ShardError> {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(ShardError::not_found(None, "artifact key is empty"));
    };
    if value.len() > MAX_ARTIFACT_KEY_LEN {
        return Err(ShardError::not_found(
            None,
            format!("artifact key exceeds {MAX_ARTIFACT_KEY_LEN} characters"),
        ));
    }
    if !first.is_ascii_alphanumeric()
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ShardError::not_found(
            None,
            format!("invalid artifact key {value:?}"),
        ));
    }
    Ok(())
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ArtifactKey {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = ShardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.0
    }
}
