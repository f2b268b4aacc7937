use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::{ring_base::wrap_index, HashRing};
use crate::Node;

/// Size of the 32-bit hash space.
const KEYSPACE: u64 = 1 << 32;

/// Returns early with the given error when the condition does not hold.
macro_rules! validate {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

/// Broken ring invariant reported by [`HashRing::validate_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Position index is not strictly ascending at `index`.
    SortOrderViolation { index: usize },
    /// Index length differs from the sum of replica counts or the map size.
    LengthMismatch { expected: usize, actual: usize },
    /// A position in the index has no owner in the map.
    MissingOwner { position: u32 },
    /// A map owner is not registered.
    UnknownOwner { position: u32, owner: String },
    /// A registry entry lists a position owned by someone else.
    ForeignPosition {
        node: String,
        position: u32,
        owner: Option<String>,
    },
    /// A registry key does not match the key of the stored node.
    KeyMismatch { registered: String, actual: String },
}

/// Deterministic copy of the three ring structures.
///
/// Two snapshots compare equal exactly when membership and every position
/// match, which makes them handy for checking that a failed `add` or an
/// `add`/`remove` pair left the ring as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RingSnapshot {
    /// Sorted position index.
    pub positions: Vec<u32>,
    /// Position -> owning node key.
    pub owners: BTreeMap<u32, String>,
    /// Node key -> positions in replica-index order.
    pub nodes: BTreeMap<String, Vec<u32>>,
}

/// Share of the hash space each node receives under the ring's resolution
/// rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RingStatistics {
    pub node_count: usize,
    pub position_count: usize,
    /// Node key -> fraction of the 2^32 hashes resolving to that node.
    pub shares: BTreeMap<String, f64>,
    pub min_share: f64,
    pub max_share: f64,
    pub mean_share: f64,
    pub std_dev: f64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<N: Node> HashRing<N> {
    /// Checks that the index, the map and the registry agree.
    pub fn validate_invariants(&self) -> Result<(), ValidationError> {
        for (index, pair) in self.positions.windows(2).enumerate() {
            validate!(
                pair[0] < pair[1],
                ValidationError::SortOrderViolation { index: index + 1 }
            );
        }

        let replica_total: usize = self.nodes.values().map(|e| e.positions.len()).sum();
        validate!(
            replica_total == self.positions.len(),
            ValidationError::LengthMismatch {
                expected: replica_total,
                actual: self.positions.len(),
            }
        );
        validate!(
            self.owners.len() == self.positions.len(),
            ValidationError::LengthMismatch {
                expected: self.positions.len(),
                actual: self.owners.len(),
            }
        );

        for &position in &self.positions {
            let owner = self
                .owners
                .get(&position)
                .ok_or(ValidationError::MissingOwner { position })?;
            validate!(
                self.nodes.contains_key(owner),
                ValidationError::UnknownOwner {
                    position,
                    owner: owner.clone(),
                }
            );
        }

        for (key, entry) in &self.nodes {
            validate!(
                entry.node.key() == key,
                ValidationError::KeyMismatch {
                    registered: key.clone(),
                    actual: entry.node.key().to_owned(),
                }
            );
            for &position in &entry.positions {
                let owner = self.owners.get(&position);
                validate!(
                    owner == Some(key),
                    ValidationError::ForeignPosition {
                        node: key.clone(),
                        position,
                        owner: owner.cloned(),
                    }
                );
            }
        }

        Ok(())
    }

    /// Copies the ring structures into ordered collections.
    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            positions: self.positions.clone(),
            owners: self
                .owners
                .iter()
                .map(|(&pos, owner)| (pos, owner.clone()))
                .collect(),
            nodes: self
                .nodes
                .iter()
                .map(|(key, entry)| (key.clone(), entry.positions.clone()))
                .collect(),
        }
    }

    /// Computes how much of the hash space resolves to each node.
    ///
    /// Every hash `h` falls into one search bucket: the first index whose
    /// position is `>= h`, or the index length if none. Buckets are mapped to
    /// owners with the same wrap rule `resolve` uses.
    pub fn statistics(&self) -> RingStatistics {
        let len = self.positions.len();
        if len == 0 {
            return RingStatistics::default();
        }

        let mut spans: BTreeMap<String, u64> = self
            .nodes
            .keys()
            .map(|key| (key.clone(), 0))
            .collect();

        let mut prev: Option<u32> = None;
        for found in 0..=len {
            let span = match (prev, self.positions.get(found)) {
                (None, Some(&pos)) => u64::from(pos) + 1,
                (Some(p), Some(&pos)) => u64::from(pos - p),
                (Some(p), None) => u64::from(u32::MAX - p),
                (None, None) => 0,
            };
            prev = self.positions.get(found).copied().or(prev);

            let pos = self.positions[wrap_index(found, len)];
            if let Some(owner) = self.owners.get(&pos) {
                *spans.entry(owner.clone()).or_default() += span;
            }
        }

        let shares: BTreeMap<String, f64> = spans
            .into_iter()
            .map(|(key, span)| (key, span as f64 / KEYSPACE as f64))
            .collect();

        let count = shares.len() as f64;
        let mean = shares.values().sum::<f64>() / count;
        let variance = shares.values().map(|s| (s - mean).powi(2)).sum::<f64>() / count;

        RingStatistics {
            node_count: self.nodes.len(),
            position_count: len,
            min_share: shares.values().copied().fold(f64::INFINITY, f64::min),
            max_share: shares.values().copied().fold(0.0, f64::max),
            mean_share: mean,
            std_dev: variance.sqrt(),
            shares,
        }
    }
}

impl RingSnapshot {
    /// Node keys present in the snapshot.
    pub fn node_keys(&self) -> HashSet<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }
}

impl RingStatistics {
    /// Ratio between the largest and the smallest share. `1.0` is a perfectly
    /// balanced ring.
    pub fn imbalance(&self) -> f64 {
        if self.min_share > 0.0 {
            self.max_share / self.min_share
        } else if self.node_count == 0 {
            1.0
        } else {
            f64::INFINITY
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_ring() -> HashRing<&'static str> {
        let hash = |key: &str| -> u32 {
            match key {
                "a00" => 100,
                "b00" => 200,
                "c00" => 300,
                _ => 0,
            }
        };
        let mut ring = HashRing::with_hasher(hash);
        for n in ["a", "b", "c"] {
            ring.add(n).unwrap();
        }
        ring
    }

    #[test]
    fn test_valid_ring_passes() {
        let mut ring: HashRing<String> = HashRing::new();
        assert!(ring.validate_invariants().is_ok());
        for i in 0..8 {
            ring.add_with_replicas(format!("node-{i}"), 20).unwrap();
        }
        assert!(ring.validate_invariants().is_ok());
        ring.remove("node-3").unwrap();
        assert!(ring.validate_invariants().is_ok());
    }

    #[test]
    fn test_detects_unsorted_index() {
        let mut ring = fixed_ring();
        ring.positions.swap(0, 2);
        assert!(matches!(
            ring.validate_invariants(),
            Err(ValidationError::SortOrderViolation { .. })
        ));
    }

    #[test]
    fn test_detects_missing_owner() {
        let mut ring = fixed_ring();
        ring.owners.remove(&200);
        assert!(matches!(
            ring.validate_invariants(),
            Err(ValidationError::LengthMismatch { .. })
        ));
        ring.owners.insert(250, "b".into());
        assert_eq!(
            ring.validate_invariants(),
            Err(ValidationError::MissingOwner { position: 200 })
        );
    }

    #[test]
    fn test_detects_foreign_position() {
        let mut ring = fixed_ring();
        ring.owners.insert(200, "a".into());
        assert!(matches!(
            ring.validate_invariants(),
            Err(ValidationError::ForeignPosition { position: 200, .. })
        ));
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let snap = fixed_ring().snapshot();
        assert_eq!(snap.positions, vec![100, 200, 300]);
        assert_eq!(snap.owners.get(&200).map(String::as_str), Some("b"));
        assert_eq!(snap.nodes.get("c"), Some(&vec![300]));
        assert_eq!(snap.node_keys().len(), 3);
    }

    #[test]
    fn test_statistics_follow_wrap_rule() {
        let stats = fixed_ring().statistics();
        let span = |s: f64| (s * KEYSPACE as f64).round() as u64;

        // a: [0, 100] plus (200, 300] through the last-element wrap.
        assert_eq!(span(stats.shares["a"]), 101 + 100);
        // b: (100, 200].
        assert_eq!(span(stats.shares["b"]), 100);
        // c: everything above 300.
        assert_eq!(span(stats.shares["c"]), u64::from(u32::MAX) - 300);

        let total: f64 = stats.shares.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.position_count, 3);
    }

    #[test]
    fn test_statistics_single_node_owns_everything() {
        let mut ring: HashRing<&str> = HashRing::new();
        ring.add_with_replicas("solo", 4).unwrap();
        let stats = ring.statistics();
        assert!((stats.shares["solo"] - 1.0).abs() < 1e-9);
        assert_eq!(stats.std_dev, 0.0);
        assert!((stats.imbalance() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_empty_ring() {
        let ring: HashRing<&str> = HashRing::new();
        let stats = ring.statistics();
        assert_eq!(stats, RingStatistics::default());
        assert_eq!(stats.imbalance(), 1.0);
    }
}
