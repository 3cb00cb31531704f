//! # Metadata Document
//!
//! The ledger persisted as JSON and shared between the offline fragmenter
//! and the online distributor:
//!
//! ```json
//! {
//!   "text_detector": {
//!     "version": "1.0.3",
//!     "original_name": "comictextdetector.pt",
//!     "sha256": "…",
//!     "is_fragmented": true,
//!     "fragments": [
//!       { "filename": "text_detector_chunk_3fa1c09b2e7d4410.woff2", "sha256": "…", "is_encrypted": false }
//!     ]
//!   }
//! }
//! ```
//!
//! A fragment's ordinal is its position in the `fragments` list. Nothing in
//! a fragment filename reveals that position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Sha256Digest;
use crate::error::ShardError;
use crate::identity::ArtifactKey;
use crate::version::Version;

/// One stored fragment of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    /// Randomized on-disk filename with a decoy extension.
    pub filename: String,
    /// Digest of the stored bytes (IV-prefixed ciphertext when encrypted).
    pub sha256: Sha256Digest,
    pub is_encrypted: bool,
}

/// One published artifact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub version: Version,
    pub original_name: String,
    /// Digest of the whole original artifact.
    pub sha256: Sha256Digest,
    pub is_fragmented: bool,
    #[serde(default)]
    pub fragments: Vec<FragmentRecord>,
    /// Whole-file name under the `full/` area, for unfragmented artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ArtifactRecord {
    /// Position of the encrypted fragment, if any.
    pub fn encrypted_index(&self) -> Option<usize> {
        self.fragments.iter().position(|f| f.is_encrypted)
    }

    /// Look up a fragment by filename, returning its ordinal.
    pub fn fragment(&self, filename: &str) -> Option<(usize, &FragmentRecord)> {
        self.fragments
            .iter()
            .enumerate()
            .find(|(_, f)| f.filename == filename)
    }

    /// File under `full/` holding an unfragmented artifact: `filename`,
    /// or `original_name` for records written without one. `None` for
    /// fragmented records and for names that are not a single safe path
    /// component.
    pub fn stored_file_name(&self) -> Option<&str> {
        if self.is_fragmented {
            return None;
        }
        let name = self.filename.as_deref().unwrap_or(&self.original_name);
        is_safe_file_name(name).then_some(name)
    }

    /// Fragment filenames in reconstruction order.
    pub fn fragment_names(&self) -> Vec<String> {
        self.fragments.iter().map(|f| f.filename.clone()).collect()
    }

    /// Structural checks on a record read from disk.
    pub fn validate(&self, key: &ArtifactKey) -> Result<(), ShardError> {
        let k = Some(key.as_str());
        if self.is_fragmented {
            if self.fragments.is_empty() {
                return Err(ShardError::metadata(k, "fragmented artifact lists no fragments"));
            }
            let encrypted = self.fragments.iter().filter(|f| f.is_encrypted).count();
            if encrypted != 1 {
                return Err(ShardError::metadata(
                    k,
                    format!("expected exactly one encrypted fragment, found {encrypted}"),
                ));
            }
            let mut seen = std::collections::BTreeSet::new();
            for f in &self.fragments {
                if !is_safe_file_name(&f.filename) {
                    return Err(ShardError::metadata(
                        k,
                        format!("unsafe fragment filename {:?}", f.filename),
                    ));
                }
                if !seen.insert(f.filename.as_str()) {
                    return Err(ShardError::metadata(
                        k,
                        format!("duplicate fragment filename {:?}", f.filename),
                    ));
                }
            }
        } else {
            if !self.fragments.is_empty() {
                return Err(ShardError::metadata(k, "unfragmented artifact lists fragments"));
            }
            if let Some(name) = &self.filename {
                if !is_safe_file_name(name) {
                    return Err(ShardError::metadata(k, format!("unsafe filename {name:?}")));
                }
            }
        }
        Ok(())
    }
}

/// A single path component with no traversal or separators.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// The full ledger: artifact key to its current record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataDocument {
    artifacts: BTreeMap<ArtifactKey, ArtifactRecord>,
}

impl MetadataDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ShardError> {
        let doc: Self = serde_json::from_slice(bytes)
            .map_err(|e| ShardError::metadata(None, format!("invalid metadata JSON: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ShardError> {
        let mut out = serde_json::to_vec_pretty(self)
            .map_err(|e| ShardError::metadata(None, format!("serialize metadata: {e}")))?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), ShardError> {
        for (key, record) in &self.artifacts {
            record.validate(key)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &ArtifactKey) -> Option<&ArtifactRecord> {
        self.artifacts.get(key)
    }

    /// Replace the record for `key` wholesale.
    pub fn insert(&mut self, key: ArtifactKey, record: ArtifactRecord) -> Option<ArtifactRecord> {
        self.artifacts.insert(key, record)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactKey, &ArtifactRecord)> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn key(s: &str) -> ArtifactKey {
        ArtifactKey::new(s).unwrap()
    }

    fn fragment(name: &str, encrypted: bool) -> FragmentRecord {
        FragmentRecord {
            filename: name.to_string(),
            sha256: Sha256Digest::of(name.as_bytes()),
            is_encrypted: encrypted,
        }
    }

    fn fragmented_record() -> ArtifactRecord {
        ArtifactRecord {
            version: Version::new(1, 0, 1),
            original_name: "detector.pt".into(),
            sha256: Sha256Digest::of(b"whole"),
            is_fragmented: true,
            fragments: vec![
                fragment("det_chunk_0000000000000001.css", false),
                fragment("det_chunk_0000000000000002.js", false),
                fragment("det_chunk_0000000000000003.png", false),
                fragment("det_chunk_0000000000000004.txt", true),
            ],
            filename: None,
        }
    }

    #[test]
    fn stored_file_name_falls_back_to_original_name() {
        let mut record = ArtifactRecord {
            version: Version::new(1, 0, 0),
            original_name: "globes.onnx".into(),
            sha256: Sha256Digest::of(b"g"),
            is_fragmented: false,
            fragments: vec![],
            filename: None,
        };
        assert_eq!(record.stored_file_name(), Some("globes.onnx"));
        record.filename = Some("globes_v2.onnx".into());
        assert_eq!(record.stored_file_name(), Some("globes_v2.onnx"));
        record.filename = None;
        record.original_name = "../globes.onnx".into();
        assert_eq!(record.stored_file_name(), None);
        assert_eq!(fragmented_record().stored_file_name(), None);
    }

    #[test]
    fn lookup_helpers() {
        let rec = fragmented_record();
        assert_eq!(rec.encrypted_index(), Some(3));
        let (idx, f) = rec.fragment("det_chunk_0000000000000002.js").unwrap();
        assert_eq!(idx, 1);
        assert!(!f.is_encrypted);
        assert!(rec.fragment("other_chunk.js").is_none());
        assert_eq!(rec.fragment_names().len(), 4);
    }

    #[test]
    fn json_shape_matches_ledger_format() {
        let mut doc = MetadataDocument::new();
        doc.insert(key("det"), fragmented_record());
        let json: serde_json::Value =
            serde_json::from_slice(&doc.to_json_pretty().unwrap()).unwrap();
        let rec = &json["det"];
        assert_eq!(rec["version"], "1.0.1");
        assert_eq!(rec["is_fragmented"], true);
        assert_eq!(rec["fragments"][3]["is_encrypted"], true);
        assert!(rec.get("filename").is_none());
        assert_eq!(rec["sha256"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn roundtrip_through_json() {
        let mut doc = MetadataDocument::new();
        doc.insert(key("det"), fragmented_record());
        let back = MetadataDocument::from_json(&doc.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn rejects_two_encrypted_fragments() {
        let mut rec = fragmented_record();
        rec.fragments[0].is_encrypted = true;
        let err = rec.validate(&key("det")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Metadata);
        assert_eq!(err.key(), Some("det"));
    }

    #[test]
    fn rejects_traversal_in_fragment_names() {
        let mut rec = fragmented_record();
        rec.fragments[1].filename = "../secret".into();
        assert!(rec.validate(&key("det")).is_err());
    }

    #[test]
    fn rejects_bad_json_and_bad_keys() {
        let err = MetadataDocument::from_json(b"{ not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Metadata);
        assert!(MetadataDocument::from_json(br#"{"a:b": {}}"#).is_err());
    }

    #[test]
    fn unfragmented_record_with_filename() {
        let json = br#"{
            "fonts": {
                "version": "1.0.0",
                "original_name": "anime_ace.ttf",
                "sha256": "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
                "is_fragmented": false,
                "filename": "anime_ace.ttf"
            }
        }"#;
        let doc = MetadataDocument::from_json(json).unwrap();
        let rec = doc.get(&key("fonts")).unwrap();
        assert!(!rec.is_fragmented);
        assert!(rec.fragments.is_empty());
        assert_eq!(rec.filename.as_deref(), Some("anime_ace.ttf"));
        assert_eq!(rec.encrypted_index(), None);
    }

    #[test]
    fn empty_object_is_empty_ledger() {
        let doc = MetadataDocument::from_json(b"{}").unwrap();
        assert!(doc.is_empty());
    }
}
