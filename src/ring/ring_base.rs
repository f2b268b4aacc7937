use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::OnceLock,
};

use tracing::{debug, trace};

use crate::{default_hasher, HashAlgorithm, HashFn, Node, RingConfig, RingError, RingResult};

/// Attempts per replica index before `add` gives up with `HashCollision`.
pub const MAX_COLLISION_RETRIES: usize = 3;

/// Number of distinct 32-bit positions.
const POSITION_SPACE: u64 = 1 << 32;

/// Upper bound for buffers sized from a caller-supplied replica count.
const MAX_PREALLOCATED_REPLICAS: usize = 1 << 16;

/// Registry value: the node plus the positions its virtual replicas occupy,
/// in replica-index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEntry<N> {
    pub(super) node: N,
    pub(super) positions: Vec<u32>,
}

/// Consistent hash ring with virtual replicas.
///
/// Three structures are kept in lock-step:
/// - `positions`: every occupied 32-bit position, sorted ascending, no
///   duplicates;
/// - `owners`: position -> key of the owning node;
/// - `nodes`: node key -> [`RingEntry`].
///
/// `&mut self` methods either fully apply or leave all three untouched.
/// Wrap the ring in [`ConcurrentHashRing`](super::ConcurrentHashRing) to
/// share it between threads.
#[derive(Clone)]
pub struct HashRing<N> {
    pub(super) positions: Vec<u32>,
    pub(super) owners: HashMap<u32, String>,
    pub(super) nodes: HashMap<String, RingEntry<N>>,
    /// Filled with CRC-32 on first use when no hash was supplied.
    hash: OnceLock<HashFn>,
    /// Replica count used by [`HashRing::add`].
    default_replicas: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<N> RingEntry<N> {
    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn positions(&self) -> &[u32] {
        &self.positions
    }
}

impl<N: Node> HashRing<N> {
    /// Creates an empty ring. The default CRC-32 hash is installed lazily.
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            owners: HashMap::new(),
            nodes: HashMap::new(),
            hash: OnceLock::new(),
            default_replicas: 1,
        }
    }

    /// Creates an empty ring using a custom hash function.
    pub fn with_hasher<F>(hash: F) -> Self
    where
        F: Fn(&str) -> u32 + Send + Sync + 'static,
    {
        Self::with_hash_fn(std::sync::Arc::new(hash))
    }

    /// Creates an empty ring using an already shared hash function.
    pub fn with_hash_fn(hash: HashFn) -> Self {
        let ring = Self::new();
        // A fresh OnceLock is always empty, the set cannot fail.
        let _ = ring.hash.set(hash);
        ring
    }

    /// Creates an empty ring using one of the built-in algorithms.
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self::with_hash_fn(algorithm.hasher())
    }

    /// Creates an empty ring from configuration: hash algorithm and the
    /// replica count used by [`HashRing::add`].
    ///
    /// The config is taken as is. A replica count of 0 makes every `add` fail
    /// with `InvalidArgument`; call [`RingConfig::validate`] to catch it early.
    pub fn from_config(config: &RingConfig) -> Self {
        let mut ring = Self::with_algorithm(config.hash);
        ring.default_replicas = config.default_replicas;
        ring
    }

    /// Hashes `key` with the ring's hash function.
    pub fn hash_key(
        &self,
        key: &str,
    ) -> u32 {
        (self.hash.get_or_init(default_hasher))(key)
    }

    /// Registers `node` with the default replica count (1 unless configured).
    pub fn add(
        &mut self,
        node: N,
    ) -> RingResult<()> {
        let replicas = self.default_replicas;
        self.add_with_replicas(node, replicas)
    }

    /// Registers `node` with `replicas` virtual replicas.
    ///
    /// Replica `i` is placed at `hash(key ++ i ++ j)` for the first retry
    /// counter `j` in `0..3` whose position is free. If all three attempts
    /// collide for any replica, nothing is committed and `HashCollision` is
    /// returned.
    pub fn add_with_replicas(
        &mut self,
        node: N,
        replicas: usize,
    ) -> RingResult<()> {
        let key = node.key().to_owned();
        if key.is_empty() {
            return Err(RingError::InvalidArgument("node key is empty".into()));
        }
        if replicas < 1 {
            return Err(RingError::InvalidArgument(format!(
                "virtual replica count can't be less than 1, got {replicas}"
            )));
        }
        if self.nodes.contains_key(&key) {
            return Err(RingError::DuplicateNode(key));
        }

        let placed = self.place_replicas(&key, replicas)?;

        for &pos in &placed {
            self.owners.insert(pos, key.clone());
        }
        self.positions.extend_from_slice(&placed);
        self.positions.sort_unstable();

        debug!(
            node = %key,
            replicas,
            positions = self.positions.len(),
            "added node to ring"
        );

        self.nodes.insert(
            key,
            RingEntry {
                node,
                positions: placed,
            },
        );
        Ok(())
    }

    /// Removes the node with the same key as `node` and returns the stored
    /// node value.
    pub fn remove<K>(
        &mut self,
        node: &K,
    ) -> RingResult<N>
    where
        K: Node + ?Sized,
    {
        let key = node.key();
        let entry = self
            .nodes
            .remove(key)
            .ok_or_else(|| RingError::NodeNotFound(key.to_owned()))?;

        // Positions are unique, so an exact binary search hit is the entry.
        for pos in &entry.positions {
            self.owners.remove(pos);
            if let Ok(idx) = self.positions.binary_search(pos) {
                self.positions.remove(idx);
            }
        }

        debug!(
            node = %key,
            replicas = entry.positions.len(),
            positions = self.positions.len(),
            "removed node from ring"
        );
        Ok(entry.node)
    }

    /// Returns the node owning `key`.
    pub fn resolve(
        &self,
        key: &str,
    ) -> RingResult<&N> {
        let owner = self.resolve_owner(key)?;
        self.nodes
            .get(owner)
            .map(|entry| &entry.node)
            .ok_or(RingError::EmptyRing)
    }

    /// Returns the key of the node owning `key`.
    pub fn resolve_key(
        &self,
        key: &str,
    ) -> RingResult<&str> {
        self.resolve_owner(key)
    }

    /// Removes every node.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.owners.clear();
        self.nodes.clear();
        debug!("cleared ring");
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of occupied positions (sum of all replica counts).
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn default_replicas(&self) -> usize {
        self.default_replicas
    }

    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&N> {
        self.nodes.get(key).map(|entry| &entry.node)
    }

    pub fn entry(
        &self,
        key: &str,
    ) -> Option<&RingEntry<N>> {
        self.nodes.get(key)
    }

    /// Positions occupied by the node with `key`, in replica-index order.
    pub fn replicas(
        &self,
        key: &str,
    ) -> Option<&[u32]> {
        self.nodes.get(key).map(|entry| entry.positions.as_slice())
    }

    /// The sorted position index.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// Key of the node occupying `position`, if any.
    pub fn owner_of(
        &self,
        position: u32,
    ) -> Option<&str> {
        self.owners.get(&position).map(String::as_str)
    }

    /// All registered nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.nodes.values().map(|entry| &entry.node)
    }

    /// Index into `positions` that owns `hash`.
    ///
    /// Must only be called on a non-empty index.
    pub(crate) fn owner_index(
        &self,
        hash: u32,
    ) -> usize {
        let found = self.positions.partition_point(|&pos| pos < hash);
        wrap_index(found, self.positions.len())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

impl<N: Node> HashRing<N> {
    /// Picks a free position for every replica of `key` without touching the
    /// ring. Positions chosen earlier in the same call count as occupied.
    ///
    /// More replicas than free positions can never be placed, so such a
    /// request fails with `HashCollision` before any hashing.
    fn place_replicas(
        &self,
        key: &str,
        replicas: usize,
    ) -> RingResult<Vec<u32>> {
        let requested = (replicas as u64).saturating_add(self.positions.len() as u64);
        if requested > POSITION_SPACE {
            trace!(node = %key, replicas, "replica count exceeds position space");
            return Err(RingError::HashCollision(key.to_owned()));
        }

        let capacity = replicas.min(MAX_PREALLOCATED_REPLICAS);
        let mut placed = Vec::with_capacity(capacity);
        let mut taken = HashSet::with_capacity(capacity);

        for replica in 0..replicas {
            let pos = (0..MAX_COLLISION_RETRIES)
                .find_map(|attempt| {
                    let candidate = self.hash_key(&format!("{key}{replica}{attempt}"));
                    if self.owners.contains_key(&candidate) || taken.contains(&candidate) {
                        trace!(
                            node = %key,
                            replica,
                            attempt,
                            position = candidate,
                            "replica position collision"
                        );
                        None
                    } else {
                        Some(candidate)
                    }
                })
                .ok_or_else(|| RingError::HashCollision(key.to_owned()))?;

            taken.insert(pos);
            placed.push(pos);
        }

        Ok(placed)
    }

    fn resolve_owner(
        &self,
        key: &str,
    ) -> RingResult<&str> {
        if self.nodes.is_empty() || self.positions.is_empty() {
            return Err(RingError::EmptyRing);
        }

        let hash = self.hash_key(key);
        let idx = self.owner_index(hash);
        let pos = self.positions[idx];
        trace!(key, hash, position = pos, "resolved key");

        // Unreachable while the index and the map are in lock-step.
        self.owner_of(pos).ok_or(RingError::EmptyRing)
    }
}

/// Maps the result of the clockwise search (`found`, the first index whose
/// position is >= the hash, or `len` if none) to the owning index.
///
/// A hit on the last element wraps to index 0, and running off the end picks
/// the last element. This looks like an off-by-one in the ring this crate has
/// to stay compatible with: the highest position is never chosen by a direct
/// hit. Kept as is so that placements match.
pub(crate) fn wrap_index(
    found: usize,
    len: usize,
) -> usize {
    if found < len {
        if found == len - 1 {
            0
        } else {
            found
        }
    } else {
        len - 1
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для HashRing
////////////////////////////////////////////////////////////////////////////////

impl<N: Node> Default for HashRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: fmt::Debug> fmt::Debug for HashRing<N> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("nodes", &self.nodes.len())
            .field("positions", &self.positions.len())
            .field("default_replicas", &self.default_replicas)
            .field("custom_hash", &self.hash.get().is_some())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
