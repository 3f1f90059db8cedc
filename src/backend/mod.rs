//! Storage backends for the version store.
//!
//! The store talks to its durable collaborator only through
//! [`traits::EventBackend`]; [`memory::InMemoryBackend`] is the in-process
//! reference implementation used by tests and as the default.

pub mod memory;
pub mod traits;

pub use memory::InMemoryBackend;
pub use traits::{BackendError, EventBackend};
