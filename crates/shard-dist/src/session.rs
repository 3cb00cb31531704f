//! # Session Key Broker
//!
//! Issues short-lived session tokens for fragmented artifacts and redeems
//! them for the artifact's symmetric key.
//!
//! A token has the shape `encryption_key:<artifact>:<requester>:<nonce>`
//! where the nonce is 16 random bytes in lowercase hex. The cache maps the
//! token to the raw key bytes with a TTL. When the cache has lost the entry
//! the broker falls back to the key file named by the artifact embedded in
//! the token, so a redeem never depends on the cache being up.
//!
//! Tokens are unsigned bearer strings: anyone holding a well-formed token
//! for an existing artifact can redeem it. Callers must gate the redeem
//! endpoint behind authentication.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::Serialize;
use shard_core::{ArtifactKey, ErrorKind, FileLayout, ShardError, Version};
use shard_crypto::{read_key_file, SymmetricKey};
use zeroize::Zeroize;

use crate::cache::BestEffortCache;
use crate::catalog::MetadataCatalog;

pub const TOKEN_PREFIX: &str = "encryption_key";
const NONCE_LEN: usize = 16;

/// Parsed form of a session token.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    artifact: ArtifactKey,
    requester: String,
    nonce: String,
}

impl SessionToken {
    /// Mint a fresh token with a random nonce.
    pub fn mint(artifact: &ArtifactKey, requester: &str) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        Self {
            artifact: artifact.clone(),
            requester: requester.to_string(),
            nonce: nonce.iter().map(|b| format!("{b:02x}")).collect(),
        }
    }

    pub fn artifact(&self) -> &ArtifactKey {
        &self.artifact
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }
}

// The token is a credential.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("artifact", &self.artifact)
            .field("requester", &self.requester)
            .field("nonce", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{TOKEN_PREFIX}:{}:{}:{}",
            self.artifact, self.requester, self.nonce
        )
    }
}

impl FromStr for SessionToken {
    type Err = ShardError;

    /// The artifact runs up to the first `:` after the prefix and the nonce
    /// follows the last `:`. Everything in between is the requester.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ShardError::not_found(None, "malformed session token");

        let rest = s
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(malformed)?;
        let (artifact, rest) = rest.split_once(':').ok_or_else(malformed)?;
        let (requester, nonce) = rest.rsplit_once(':').ok_or_else(malformed)?;

        let artifact: ArtifactKey = artifact.parse().map_err(|_| malformed())?;
        if requester.is_empty()
            || nonce.len() != NONCE_LEN * 2
            || !nonce.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(malformed());
        }
        Ok(Self {
            artifact,
            requester: requester.to_string(),
            nonce: nonce.to_string(),
        })
    }
}

/// What a client needs to fetch and decrypt a fragmented artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionGrant {
    pub artifact: ArtifactKey,
    pub version: Version,
    pub fragment_names: Vec<String>,
    pub encrypted_fragment_index: usize,
    pub session_token: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SessionKeyBroker {
    layout: FileLayout,
    catalog: Arc<MetadataCatalog>,
    cache: BestEffortCache,
    ttl: Duration,
}

impl SessionKeyBroker {
    pub fn new(
        layout: FileLayout,
        catalog: Arc<MetadataCatalog>,
        cache: BestEffortCache,
        ttl: Duration,
    ) -> Self {
        Self {
            layout,
            catalog,
            cache,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a session for `artifact` on behalf of `requester`.
    pub async fn issue(&self, artifact: &str, requester: &str) -> Result<SessionGrant, ShardError> {
        let key: ArtifactKey = artifact.parse()?;
        let record = self.catalog.record(&key)?;
        if !record.is_fragmented {
            return Err(ShardError::not_found(
                Some(key.as_str()),
                "artifact is not fragmented, no session needed",
            ));
        }
        let encrypted_fragment_index = record.encrypted_index().ok_or_else(|| {
            ShardError::metadata(Some(key.as_str()), "no fragment is flagged encrypted")
        })?;

        let symmetric = self.load_key(&key).await?;
        let token = SessionToken::mint(&key, requester).to_string();
        self.cache.set_ex(&token, symmetric.as_bytes(), self.ttl).await;

        metrics::counter!("shard_sessions_issued_total").increment(1);
        tracing::info!(
            artifact = %key,
            version = %record.version,
            requester,
            ttl_secs = self.ttl.as_secs(),
            "session issued"
        );

        Ok(SessionGrant {
            fragment_names: record.fragment_names(),
            artifact: key,
            version: record.version,
            encrypted_fragment_index,
            session_token: token,
            expires_in_secs: self.ttl.as_secs(),
        })
    }

    /// Exchange a session token for the artifact's symmetric key.
    ///
    /// The token is parsed before the cache is consulted, so only entries
    /// under the session key grammar can ever be returned as key bytes.
    pub async fn redeem(&self, token: &str) -> Result<SymmetricKey, ShardError> {
        let parsed: SessionToken = token.parse()?;
        if let Some(mut bytes) = self.cache.get(&parsed.to_string()).await {
            let cached = SymmetricKey::from_slice(&bytes);
            bytes.zeroize();
            match cached {
                Ok(key) => {
                    tracing::debug!(artifact = %parsed.artifact(), "session redeemed from cache");
                    return Ok(key);
                }
                Err(_) => {
                    tracing::warn!(artifact = %parsed.artifact(), "cached session entry has the wrong length, ignoring");
                }
            }
        }

        let key = self.load_key(parsed.artifact()).await?;
        tracing::debug!(artifact = %parsed.artifact(), "session redeemed from key file");
        Ok(key)
    }

    async fn load_key(&self, artifact: &ArtifactKey) -> Result<SymmetricKey, ShardError> {
        let path: PathBuf = self.layout.key_file(artifact);
        let loaded = tokio::task::spawn_blocking(move || read_key_file(&path))
            .await
            .map_err(|e| {
                ShardError::encryption(Some(artifact.as_str()), format!("key read task failed: {e}"))
            })?;
        loaded.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ShardError::not_found(Some(artifact.as_str()), "no key stored for artifact")
            }
            _ => e.with_key(artifact.as_str()),
        })
    }
}
