//! In-memory storage engine for Plexus.
//!
//! [`MemoryStorage`] is the reference implementation of the
//! [`Storage`](plexus_core::Storage) contract: thread-safe, fully in
//! process, and suitable for development, tests, and single-node
//! deployments that do not need durability.

pub mod memory;

pub use memory::MemoryStorage;
