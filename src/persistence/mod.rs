//! Cache backends
//!
//! A cache maps identifier strings to packed values. Containers consult
//! caches through [`Ldict::cached`](crate::Ldict::cached); the backends only
//! need to store and return bytes.

pub mod disk;
pub mod memory;

pub use disk::DiskCache;
pub use memory::MemoryCache;

use crate::error::Result;

/// Key/value storage for packed values.
///
/// Implementations must be safe to share between containers, so every method
/// takes `&self`.
pub trait Cache: Send + Sync {
    fn contains(&self, key: &str) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key; returns whether it was present.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        "cache".to_string()
    }
}
