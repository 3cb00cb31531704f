//! # Error Types: Distribution Error Taxonomy
//!
//! Every failure in the workspace is a [`ShardError`]. Each variant carries a
//! human-readable message and, where one is involved, the offending artifact
//! key. [`ErrorKind`] is the tag used for exhaustive handling at the serving
//! boundary and for exit-code mapping in the CLI.
//!
//! ## Design
//!
//! - Maintenance-pipeline errors (fragmentation, encryption, metadata,
//!   backup, version) abort the whole run.
//! - Serving errors (integrity, not found) fail a single request.
//! - Shared-cache failures are not part of this taxonomy: they are
//!   downgraded to warnings where they happen.

use std::fmt;

use thiserror::Error;

/// Tag identifying the class of a [`ShardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Source too small, invalid plan, or fragment write failure.
    Fragmentation,
    /// Cipher failure or key persistence failure.
    Encryption,
    /// Metadata load, parse, or save failure.
    Metadata,
    /// Backup copy failure.
    Backup,
    /// Malformed or non-increasing version string.
    Version,
    /// Checksum mismatch at the cache or disk layer.
    Integrity,
    /// Missing artifact, fragment, or key.
    NotFound,
}

impl ErrorKind {
    /// Stable snake_case identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fragmentation => "fragmentation",
            Self::Encryption => "encryption",
            Self::Metadata => "metadata",
            Self::Backup => "backup",
            Self::Version => "version",
            Self::Integrity => "integrity",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders ` [key]` when an artifact key is attached, nothing otherwise.
fn scope(key: &Option<String>) -> String {
    match key {
        Some(k) => format!(" [{k}]"),
        None => String::new(),
    }
}

/// Top-level error type for the distribution pipeline.
#[derive(Error, Debug)]
pub enum ShardError {
    /// Splitting failed or fragments could not be written.
    #[error("fragmentation error{}: {message}", scope(.key))]
    Fragmentation {
        key: Option<String>,
        message: String,
    },

    /// Cipher or key-persistence failure.
    #[error("encryption error{}: {message}", scope(.key))]
    Encryption {
        key: Option<String>,
        message: String,
    },

    /// Metadata ledger could not be loaded, parsed, or saved.
    #[error("metadata error{}: {message}", scope(.key))]
    Metadata {
        key: Option<String>,
        message: String,
    },

    /// A backup snapshot could not be taken.
    #[error("backup error{}: {message}", scope(.key))]
    Backup {
        key: Option<String>,
        message: String,
    },

    /// Malformed or invalid version string.
    #[error("version error{}: {message}", scope(.key))]
    Version {
        key: Option<String>,
        message: String,
    },

    /// Checksum mismatch. Corrupted bytes are never served.
    #[error("integrity error{}: {message}", scope(.key))]
    Integrity {
        key: Option<String>,
        message: String,
    },

    /// Missing artifact, fragment, or key.
    #[error("not found{}: {message}", scope(.key))]
    NotFound {
        key: Option<String>,
        message: String,
    },
}

impl ShardError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, key: Option<&str>, message: impl Into<String>) -> Self {
        let key = key.map(str::to_string);
        let message = message.into();
        match kind {
            ErrorKind::Fragmentation => Self::Fragmentation { key, message },
            ErrorKind::Encryption => Self::Encryption { key, message },
            ErrorKind::Metadata => Self::Metadata { key, message },
            ErrorKind::Backup => Self::Backup { key, message },
            ErrorKind::Version => Self::Version { key, message },
            ErrorKind::Integrity => Self::Integrity { key, message },
            ErrorKind::NotFound => Self::NotFound { key, message },
        }
    }

    pub fn fragmentation(key: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fragmentation, key, message)
    }

    pub fn encryption(key: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encryption, key, message)
    }

    pub fn metadata(key: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Metadata, key, message)
    }

    pub fn backup(key: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backup, key, message)
    }

    pub fn version(key: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Version, key, message)
    }

    pub fn integrity(key: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, key, message)
    }

    pub fn not_found(key: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, key, message)
    }

    /// The tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fragmentation { .. } => ErrorKind::Fragmentation,
            Self::Encryption { .. } => ErrorKind::Encryption,
            Self::Metadata { .. } => ErrorKind::Metadata,
            Self::Backup { .. } => ErrorKind::Backup,
            Self::Version { .. } => ErrorKind::Version,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// The artifact key the error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Fragmentation { key, .. }
            | Self::Encryption { key, .. }
            | Self::Metadata { key, .. }
            | Self::Backup { key, .. }
            | Self::Version { key, .. }
            | Self::Integrity { key, .. }
            | Self::NotFound { key, .. } => key.as_deref(),
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Fragmentation { message, .. }
            | Self::Encryption { message, .. }
            | Self::Metadata { message, .. }
            | Self::Backup { message, .. }
            | Self::Version { message, .. }
            | Self::Integrity { message, .. }
            | Self::NotFound { message, .. } => message,
        }
    }

    /// Attach an artifact key if the error does not carry one yet.
    pub fn with_key(self, artifact: &str) -> Self {
        if self.key().is_some() {
            return self;
        }
        Self::new(self.kind(), Some(artifact), self.message().to_string())
    }
}
