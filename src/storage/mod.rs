//! Ledger store implementations.
//!
//! The in-memory store is the reference implementation of the
//! [`Repository`](crate::domain::Repository) contract. Durable backends
//! can be added here without touching the pipeline.

mod memory;

pub use memory::MemoryStore;
