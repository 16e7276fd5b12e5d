use std::sync::Arc;
use std::thread;

use feeledger_infra::{InMemoryFeeLedger, InMemoryStudentDirectory, LockPolicy, SeedError};

use crate::config::ApiConfig;

/// Everything the handlers need.
pub struct AppServices {
    pub ledger: InMemoryFeeLedger,
}

impl AppServices {
    pub fn new(directory: Arc<InMemoryStudentDirectory>, policy: LockPolicy) -> Self {
        Self {
            ledger: InMemoryFeeLedger::in_memory(directory, policy),
        }
    }
}

pub fn build_services(config: &ApiConfig) -> Result<AppServices, SeedError> {
    let directory = match &config.students_file {
        Some(path) => {
            let directory = InMemoryStudentDirectory::from_json_file(path)?;
            tracing::info!(path = %path.display(), students = directory.len(), "student directory seeded");
            directory
        }
        None => {
            tracing::warn!("FEELEDGER_STUDENTS_FILE not set; starting with an empty student directory");
            InMemoryStudentDirectory::new()
        }
    };

    Ok(AppServices::new(Arc::new(directory), config.lock_policy))
}

/// Log every committed fee event on a background thread.
///
/// The thread ends when the bus is dropped.
pub fn spawn_event_logger(services: &AppServices) -> thread::JoinHandle<()> {
    let subscription = services.ledger.subscribe();
    thread::spawn(move || {
        while let Ok(envelope) = subscription.recv() {
            tracing::info!(
                event_type = envelope.event_type(),
                aggregate_id = %envelope.aggregate_id(),
                sequence_number = envelope.sequence_number(),
                "fee event committed"
            );
        }
    })
}
