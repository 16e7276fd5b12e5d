//! Append-only event store boundary.
//!
//! One stream per fee invoice. The store makes no storage assumptions beyond
//! an atomic "append if still at version N" primitive.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
