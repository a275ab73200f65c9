//! Block identity: SHA-256 multihashes and links between nodes.

use std::fmt;

use multihash::Multihash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::StoreError;

/// Multihash code for SHA2-256.
const SHA2_256: u64 = 0x12;

/// Largest digest size carried by a [`Hash`], in bytes.
const MAX_DIGEST_BYTES: usize = 64;

/// The content address of a block: a self-describing multihash whose leading
/// bytes identify the algorithm and digest length.
///
/// Serialized (and CBOR-embedded) as the raw multihash byte string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash)]
pub struct Hash(Multihash<MAX_DIGEST_BYTES>);

impl Hash {
    /// Hashes `bytes` with SHA2-256.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        // A 32-byte digest always fits the 64-byte multihash buffer.
        let mh = Multihash::wrap(SHA2_256, &digest).expect("sha-256 digest fits multihash");
        Self(mh)
    }

    /// The multihash algorithm code.
    pub fn code(&self) -> u64 {
        self.0.code()
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> &[u8] {
        self.0.digest()
    }

    /// The full self-describing byte form (code + length + digest).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// Parses the self-describing byte form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] when the bytes are not a well-formed
    /// multihash.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mh = Multihash::from_bytes(bytes).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Self(mh))
    }

    /// Hex rendering of the full byte form, used for file names and display.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parses the hex rendering produced by [`to_hex`](Hash::to_hex).
    pub fn from_hex(s: &str) -> Result<Self, StoreError> {
        let bytes = hex::decode(s).map_err(|e| StoreError::Decode(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Truncated hex keeps tree dumps readable.
        let hex = self.to_hex();
        let short = &hex[..hex.len().min(16)];
        write!(f, "Hash({}…)", short)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Hash::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A reference from one node to another: the target's hash plus an advisory
/// size of everything reachable through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Link {
    /// Content address of the target block.
    pub hash: Hash,
    /// Advisory total byte size reachable through the target, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachable_size: Option<u64>,
}

impl Link {
    /// A link with no size advisory.
    pub fn to(hash: Hash) -> Self {
        Self {
            hash,
            reachable_size: None,
        }
    }

    /// A link carrying a reachable-size advisory.
    pub fn sized(hash: Hash, reachable_size: u64) -> Self {
        Self {
            hash,
            reachable_size: Some(reachable_size),
        }
    }
}
