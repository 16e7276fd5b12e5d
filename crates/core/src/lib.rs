//! `feeledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the fee ledger
//! (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
