//! Persistence for the four tables the gateway core owns: usage records,
//! trace events, quota window snapshots and circuit breaker snapshots.
//! `InMemoryStore` is the zero-configuration default; `SeaOrmStore` is the
//! durable backend, grounded on the teacher's sea-orm storage crate but
//! scoped down to what this core actually writes.

pub mod memory;
pub mod seaorm;
pub mod store;

pub use memory::InMemoryStore;
pub use seaorm::SeaOrmStore;
pub use store::{BreakerSnapshot, Store, StorageError, StorageResult, UsageFilter};
