//! Consistent hash ring.
//!
//! # Modules
//!
//! - `ring_base`: single-owner ring (`HashRing`), placement and lookup.
//! - `concurrent`: thread-safe wrapper over one `RwLock`.
//! - `safety`: invariant validation, snapshots and keyspace statistics.

pub mod concurrent;
pub mod ring_base;
pub mod safety;

pub use concurrent::*;
pub use ring_base::*;
pub use safety::*;
