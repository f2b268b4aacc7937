//! Hash functions used to place nodes and keys on the ring.
//!
//! The ring only needs a pure `&str -> u32` mapping. CRC-32 (IEEE) is the
//! default; xxHash32 is available as a built-in alternative and any closure
//! can be plugged in at construction time.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::RingError;

/// Shared hash function handle stored by a ring.
pub type HashFn = Arc<dyn Fn(&str) -> u32 + Send + Sync>;

/// Built-in hash algorithms selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// CRC-32 (IEEE polynomial) over the UTF-8 bytes.
    #[default]
    Crc32,
    /// xxHash32 with seed 0.
    Xxh32,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl HashAlgorithm {
    /// Returns the hash function for this algorithm.
    pub fn hasher(self) -> HashFn {
        match self {
            Self::Crc32 => Arc::new(crc32),
            Self::Xxh32 => Arc::new(xxh32),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crc32 => "crc32",
            Self::Xxh32 => "xxh32",
        }
    }
}

/// CRC-32 (IEEE) checksum of the key bytes.
pub fn crc32(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

/// xxHash32 of the key bytes, seed 0.
pub fn xxh32(key: &str) -> u32 {
    xxhash_rust::xxh32::xxh32(key.as_bytes(), 0)
}

/// Hash function installed when none was supplied.
pub fn default_hasher() -> HashFn {
    HashAlgorithm::default().hasher()
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для HashAlgorithm
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for HashAlgorithm {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crc32" => Ok(Self::Crc32),
            "xxh32" => Ok(Self::Xxh32),
            other => Err(RingError::InvalidArgument(format!(
                "unknown hash algorithm: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_vector() {
        // Standard CRC-32 check value.
        assert_eq!(crc32("123456789"), 0xCBF4_3926);
        assert_eq!(crc32(""), 0);
    }

    #[test]
    fn test_xxh32_known_vector() {
        assert_eq!(xxh32(""), 0x02CC_5D05);
    }

    #[test]
    fn test_hashers_are_deterministic() {
        for algo in [HashAlgorithm::Crc32, HashAlgorithm::Xxh32] {
            let h = algo.hasher();
            assert_eq!(h("node-a00"), h("node-a00"));
            assert_ne!(h("node-a00"), h("node-a01"));
        }
    }

    #[test]
    fn test_default_is_crc32() {
        let h = default_hasher();
        assert_eq!(h("foo"), crc32("foo"));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("crc32".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Crc32);
        assert_eq!(" XXH32 ".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Xxh32);
        assert!(matches!(
            "md5".parse::<HashAlgorithm>(),
            Err(RingError::InvalidArgument(_))
        ));
        assert_eq!(HashAlgorithm::Xxh32.to_string(), "xxh32");
    }
}
