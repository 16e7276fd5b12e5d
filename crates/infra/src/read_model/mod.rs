//! Disposable read-side storage (indexes rebuilt from the event log).

pub mod index_store;

pub use index_store::{InMemoryReadStore, ReadStore, ReadStoreError};
