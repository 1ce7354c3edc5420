//! Job identity: a content hash of the sequence and the engine configuration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::EngineConfig;
use crate::sequence::Sequence;

/// SHA-256 identity of one prediction request, rendered as lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a request. Two requests with equal sequences and equal
    /// engine configurations always produce the same value.
    ///
    /// Every field is hashed with a little-endian `u64` length prefix, so no
    /// separator inside a key or value can make two configurations collide.
    pub fn of(sequence: &Sequence, config: &EngineConfig) -> Self {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, sequence.as_str());
        update_field(&mut hasher, &config.engine);
        update_field(&mut hasher, &config.model);
        // BTreeMap iteration is ordered, so parameter insertion order is irrelevant.
        hasher.update((config.parameters.len() as u64).to_le_bytes());
        for (key, value) in &config.parameters {
            update_field(&mut hasher, key);
            update_field(&mut hasher, value);
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hash arbitrary bytes, used for raw payload checksums.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
