//! The uniform upstream contract every provider implementation speaks
//! (§4.1): the `Adapter` trait, its error taxonomy, and the immutable
//! name→Adapter `AdapterRegistry` the Router resolves candidates through.
//!
//! This crate intentionally depends on no concrete HTTP client — adapters
//! in `aigate-provider-impl` own that; here we only fix the shape they
//! must all present.

pub mod adapter;
pub mod errors;
pub mod registry;

pub use adapter::{Adapter, ChunkEvent, ChunkSink, ExecuteOutcome, Health, RawChunk, StreamCompletion};
pub use errors::{ProviderError, ProviderResult};
pub use registry::{AdapterRegistry, RegistryError};
