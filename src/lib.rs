/// Ring construction settings loaded from files and the environment.
pub mod config;
/// Error taxonomy shared by all ring operations.
pub mod error;
/// Pluggable 32-bit hash functions (CRC-32 by default).
pub mod hash;
/// Tracing subscriber setup for binaries.
pub mod logging;
/// The `Node` capability: anything with a stable unique key.
pub mod node;
/// Consistent hash ring: single-owner core, concurrent wrapper, validation.
pub mod ring;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use config::RingConfig;
pub use error::{RingError, RingResult};
pub use hash::{crc32, default_hasher, xxh32, HashAlgorithm, HashFn};
pub use logging::{build_subscriber, init_logging, LoggingConfig};
pub use node::Node;
pub use ring::{
    ConcurrentHashRing, ContentionSnapshot, HashRing, RingEntry, RingSnapshot, RingStatistics,
    ValidationError, MAX_COLLISION_RETRIES,
};
