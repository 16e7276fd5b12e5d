//! Infrastructure and application layer of the fee ledger: event store,
//! command dispatch, read-side index, student directory backend and the
//! ledger services.

pub mod command_dispatcher;
pub mod event_store;
pub mod ledger;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod student_directory;


pub use ledger::{FeeLedger, InMemoryBus, InMemoryFeeLedger};
pub use services::{LedgerError, LedgerResult, LockPolicy};
pub use student_directory::{InMemoryStudentDirectory, SeedError, StudentSeed};
