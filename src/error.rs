use thiserror::Error;

/// Errors returned by ring operations.
///
/// Every failure is local and synchronous. A failed `add` leaves the ring
/// untouched, so the ring stays usable after any error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// Node without a key, or a replica count below 1.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A node with the same key is already registered.
    #[error("node {0} already exists")]
    DuplicateNode(String),

    /// All retries for one replica index landed on occupied positions.
    #[error("node {0} hash collision")]
    HashCollision(String),

    /// No node with the given key is registered.
    #[error("node {0} not exist")]
    NodeNotFound(String),

    /// Resolution was attempted on a ring without nodes.
    #[error("ring is empty")]
    EmptyRing,
}

/// Convenience alias for ring APIs.
pub type RingResult<T> = std::result::Result<T, RingError>;

impl RingError {
    /// Returns `true` when calling again with different inputs may succeed
    /// without touching ring membership first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HashCollision(_))
    }
}
