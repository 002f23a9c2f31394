//! Persisted key-value storage.

pub mod memory;
pub mod traits;

pub use memory::MemoryKv;
pub use traits::KvStore;
