use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{HashRing, RingSnapshot, RingStatistics, ValidationError};
use crate::{HashAlgorithm, HashFn, Node, RingConfig, RingResult};

/// Thread-safe ring: one reader/writer lock guards all three ring
/// structures.
///
/// `resolve` and the other read-only calls take the shared lock and never
/// block each other. `add`, `remove` and `clear` hold the exclusive lock for
/// their whole run, so a reader sees a node either fully registered or not at
/// all. Cloning the handle shares the same ring.
///
/// Lock contention metrics are off by default; enable them with
/// [`ConcurrentHashRing::with_contention_metrics`]. Without them `resolve`
/// touches no shared counters.
pub struct ConcurrentHashRing<N> {
    inner: Arc<RwLock<HashRing<N>>>,
    metrics: Option<Arc<ContentionMetrics>>,
}

/// Lock acquisition counters.
#[derive(Debug, Default)]
pub struct ContentionMetrics {
    pub read_locks: AtomicUsize,
    pub write_locks: AtomicUsize,
    pub total_wait_time_ns: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentionSnapshot {
    pub read_locks: usize,
    pub write_locks: usize,
    pub total_wait_time_ns: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<N: Node> ConcurrentHashRing<N> {
    pub fn new() -> Self {
        Self::from_ring(HashRing::new())
    }

    pub fn with_hasher<F>(hash: F) -> Self
    where
        F: Fn(&str) -> u32 + Send + Sync + 'static,
    {
        Self::from_ring(HashRing::with_hasher(hash))
    }

    pub fn with_hash_fn(hash: HashFn) -> Self {
        Self::from_ring(HashRing::with_hash_fn(hash))
    }

    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self::from_ring(HashRing::with_algorithm(algorithm))
    }

    pub fn from_config(config: &RingConfig) -> Self {
        Self::from_ring(HashRing::from_config(config))
    }

    /// Wraps an existing ring.
    pub fn from_ring(ring: HashRing<N>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ring)),
            metrics: None,
        }
    }

    /// Starts counting lock acquisitions and wait time. Handles cloned
    /// afterwards share the counters.
    pub fn with_contention_metrics(mut self) -> Self {
        self.metrics = Some(Arc::new(ContentionMetrics::default()));
        self
    }

    pub fn add(
        &self,
        node: N,
    ) -> RingResult<()> {
        self.write().add(node)
    }

    pub fn add_with_replicas(
        &self,
        node: N,
        replicas: usize,
    ) -> RingResult<()> {
        self.write().add_with_replicas(node, replicas)
    }

    pub fn remove<K>(
        &self,
        node: &K,
    ) -> RingResult<N>
    where
        K: Node + ?Sized,
    {
        self.write().remove(node)
    }

    pub fn resolve_key(
        &self,
        key: &str,
    ) -> RingResult<String> {
        self.read().resolve_key(key).map(str::to_owned)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn position_count(&self) -> usize {
        self.read().position_count()
    }

    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.read().contains(key)
    }

    pub fn replicas(
        &self,
        key: &str,
    ) -> Option<Vec<u32>> {
        self.read().replicas(key).map(<[u32]>::to_vec)
    }

    pub fn positions(&self) -> Vec<u32> {
        self.read().positions().to_vec()
    }

    pub fn snapshot(&self) -> RingSnapshot {
        self.read().snapshot()
    }

    pub fn statistics(&self) -> RingStatistics {
        self.read().statistics()
    }

    pub fn validate_invariants(&self) -> Result<(), ValidationError> {
        self.read().validate_invariants()
    }

    /// Runs `f` against the ring under the shared lock.
    pub fn with_read<F, R>(
        &self,
        f: F,
    ) -> R
    where
        F: FnOnce(&HashRing<N>) -> R,
    {
        f(&self.read())
    }

    /// Runs `f` against the ring under the exclusive lock.
    pub fn with_write<F, R>(
        &self,
        f: F,
    ) -> R
    where
        F: FnOnce(&mut HashRing<N>) -> R,
    {
        f(&mut self.write())
    }

    /// Counters so far, all zero when metrics are disabled.
    pub fn metrics(&self) -> ContentionSnapshot {
        self.metrics
            .as_ref()
            .map(|m| m.snapshot())
            .unwrap_or_default()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }

    pub fn reset_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.reset();
        }
    }
}

impl<N: Node + Clone> ConcurrentHashRing<N> {
    /// Returns a copy of the node owning `key`.
    pub fn resolve(
        &self,
        key: &str,
    ) -> RingResult<N> {
        self.read().resolve(key).cloned()
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<N> {
        self.read().get(key).cloned()
    }

    pub fn nodes(&self) -> Vec<N> {
        self.read().nodes().cloned().collect()
    }
}

impl ContentionMetrics {
    fn inc_read(
        &self,
        wait_ns: u64,
    ) {
        self.read_locks.fetch_add(1, Ordering::Relaxed);
        self.total_wait_time_ns.fetch_add(wait_ns, Ordering::Relaxed);
    }

    fn inc_write(
        &self,
        wait_ns: u64,
    ) {
        self.write_locks.fetch_add(1, Ordering::Relaxed);
        self.total_wait_time_ns.fetch_add(wait_ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ContentionSnapshot {
        ContentionSnapshot {
            read_locks: self.read_locks.load(Ordering::Relaxed),
            write_locks: self.write_locks.load(Ordering::Relaxed),
            total_wait_time_ns: self.total_wait_time_ns.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.read_locks.store(0, Ordering::Relaxed);
        self.write_locks.store(0, Ordering::Relaxed);
        self.total_wait_time_ns.store(0, Ordering::Relaxed);
    }
}

impl ContentionSnapshot {
    pub fn total_locks(&self) -> usize {
        self.read_locks + self.write_locks
    }

    pub fn average_wait_time_ns(&self) -> f64 {
        let total = self.total_locks();
        if total == 0 {
            0.0
        } else {
            self.total_wait_time_ns as f64 / total as f64
        }
    }

    pub fn read_write_ratio(&self) -> f64 {
        if self.write_locks == 0 {
            f64::INFINITY
        } else {
            self.read_locks as f64 / self.write_locks as f64
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

impl<N> ConcurrentHashRing<N> {
    fn read(&self) -> RwLockReadGuard<'_, HashRing<N>> {
        let Some(metrics) = &self.metrics else {
            return self.inner.read();
        };
        let start = Instant::now();
        let guard = self.inner.read();
        metrics.inc_read(start.elapsed().as_nanos() as u64);
        guard
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashRing<N>> {
        let Some(metrics) = &self.metrics else {
            return self.inner.write();
        };
        let start = Instant::now();
        let guard = self.inner.write();
        metrics.inc_write(start.elapsed().as_nanos() as u64);
        guard
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ConcurrentHashRing
////////////////////////////////////////////////////////////////////////////////

impl<N> Clone for ConcurrentHashRing<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            metrics: self.metrics.clone(),
        }
    }
}

impl<N: Node> Default for ConcurrentHashRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Node> From<HashRing<N>> for ConcurrentHashRing<N> {
    fn from(ring: HashRing<N>) -> Self {
        Self::from_ring(ring)
    }
}

impl<N: fmt::Debug> fmt::Debug for ConcurrentHashRing<N> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ConcurrentHashRing")
            .field("ring", &*self.inner.read())
            .field("metrics", &self.metrics.as_ref().map(|m| m.snapshot()))
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::RingError;

    #[test]
    fn test_basic_operations() {
        let ring: ConcurrentHashRing<String> = ConcurrentHashRing::new();
        assert_eq!(ring.resolve("foo"), Err(RingError::EmptyRing));

        ring.add("node-a".to_string()).unwrap();
        ring.add_with_replicas("node-b".to_string(), 8).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.position_count(), 9);

        let owner = ring.resolve("foo").unwrap();
        assert_eq!(ring.resolve_key("foo").unwrap(), owner);

        assert_eq!(ring.remove("node-a").unwrap(), "node-a");
        assert_eq!(ring.resolve("foo").unwrap(), "node-b");
        assert!(ring.validate_invariants().is_ok());
    }

    #[test]
    fn test_clone_shares_state() {
        let ring: ConcurrentHashRing<String> = ConcurrentHashRing::new();
        let other = ring.clone();
        other.add("node-a".to_string()).unwrap();
        assert!(ring.contains("node-a"));
        assert_eq!(ring.get("node-a").as_deref(), Some("node-a"));
    }

    #[test]
    fn test_metrics_count_lock_kinds() {
        let ring: ConcurrentHashRing<String> =
            ConcurrentHashRing::new().with_contention_metrics();
        assert!(ring.metrics_enabled());
        ring.add("node-a".to_string()).unwrap();
        for _ in 0..10 {
            ring.resolve("k").unwrap();
        }

        let m = ring.metrics();
        assert_eq!(m.write_locks, 1);
        assert_eq!(m.read_locks, 10);
        assert_eq!(m.total_locks(), 11);
        assert!((m.read_write_ratio() - 10.0).abs() < f64::EPSILON);

        ring.reset_metrics();
        assert_eq!(ring.metrics().total_locks(), 0);
        assert_eq!(ring.metrics().average_wait_time_ns(), 0.0);
    }

    #[test]
    fn test_metrics_disabled_by_default() {
        let ring: ConcurrentHashRing<String> = ConcurrentHashRing::new();
        assert!(!ring.metrics_enabled());
        ring.add("node-a".to_string()).unwrap();
        for _ in 0..10 {
            ring.resolve("k").unwrap();
        }
        assert_eq!(ring.metrics(), ContentionSnapshot::default());
        ring.reset_metrics();
        assert_eq!(ring.metrics().total_locks(), 0);
    }

    #[test]
    fn test_clones_share_metrics() {
        let ring: ConcurrentHashRing<String> =
            ConcurrentHashRing::new().with_contention_metrics();
        let other = ring.clone();
        other.add("node-a".to_string()).unwrap();
        other.resolve("k").unwrap();
        assert_eq!(ring.metrics().write_locks, 1);
        assert_eq!(ring.metrics().read_locks, 1);
    }

    #[test]
    fn test_with_write_is_atomic_batch() {
        let ring: ConcurrentHashRing<String> = ConcurrentHashRing::new();
        ring.with_write(|r| {
            for i in 0..4 {
                r.add_with_replicas(format!("node-{i}"), 4)?;
            }
            Ok::<_, RingError>(())
        })
        .unwrap();
        assert_eq!(ring.with_read(|r| r.position_count()), 16);
    }

    #[test]
    fn test_parallel_resolves_agree() {
        let ring: ConcurrentHashRing<String> = ConcurrentHashRing::new();
        for i in 0..5 {
            ring.add_with_replicas(format!("node-{i}"), 32).unwrap();
        }
        let expected = ring.resolve("user:42").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ring = ring.clone();
                thread::spawn(move || {
                    (0..500)
                        .map(|_| ring.resolve("user:42").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for h in handles {
            assert!(h.join().unwrap().iter().all(|n| *n == expected));
        }
    }
}
