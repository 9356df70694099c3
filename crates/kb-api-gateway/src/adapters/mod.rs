//! Adapters for the API Gateway.
//!
//! Implementations of the outbound ports.

pub mod memory;

pub use memory::InMemoryBackend;
