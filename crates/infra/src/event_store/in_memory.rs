use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use feeledger_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

type Stream = Arc<Mutex<Vec<StoredEvent>>>;

/// In-memory append-only event store.
///
/// The outer map is only write-locked to register a new stream; the
/// version check and append run under the target stream's own mutex, so
/// appends to different invoices never wait on each other.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Stream>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn existing_stream(&self, aggregate_id: AggregateId) -> Result<Option<Stream>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.get(&aggregate_id).cloned())
    }

    fn stream_for_append(&self, aggregate_id: AggregateId) -> Result<Stream, EventStoreError> {
        if let Some(stream) = self.existing_stream(aggregate_id)? {
            return Ok(stream);
        }
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        Ok(streams.entry(aggregate_id).or_default().clone())
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::Unavailable("lock poisoned".to_string())
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same aggregate stream.
        let aggregate_id = first.aggregate_id;
        let aggregate_type = first.aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let stream = self.stream_for_append(aggregate_id)?;
        let mut stream = stream.lock().map_err(|_| poisoned())?;
        let current = Self::current_version(&stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            committed.push(stored);
        }
        stream.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        match self.existing_stream(aggregate_id)? {
            Some(stream) => Ok(stream.lock().map_err(|_| poisoned())?.clone()),
            None => Ok(vec![]),
        }
    }

    fn load_all(&self) -> Result<Vec<Vec<StoredEvent>>, EventStoreError> {
        let handles: Vec<Stream> = {
            let streams = self.streams.read().map_err(|_| poisoned())?;
            streams.values().cloned().collect()
        };

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let stream = handle.lock().map_err(|_| poisoned())?;
            // A registered stream stays empty if its first append lost the race.
            if !stream.is_empty() {
                out.push(stream.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Barrier;
    use std::thread;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "fees.invoice.test".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "n": 1 }),
        }
    }

    #[test]
    fn append_assigns_sequence_numbers_from_one() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let committed = store
            .append(vec![event(id, "fees.invoice"), event(id, "fees.invoice")], ExpectedVersion::NoStream)
            .unwrap();
        assert_eq!(
            committed.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let more = store
            .append(vec![event(id, "fees.invoice")], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(more[0].sequence_number, 3);
        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "fees.invoice")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(id, "fees.invoice")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn mixed_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let err = store
            .append(vec![event(a, "fees.invoice"), event(b, "fees.invoice")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));

        store
            .append(vec![event(a, "fees.invoice")], ExpectedVersion::Any)
            .unwrap();
        let err = store
            .append(vec![event(a, "other.type")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn unknown_stream_loads_empty() {
        let store = InMemoryEventStore::new();
        assert!(store.load_stream(AggregateId::new()).unwrap().is_empty());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn load_all_returns_every_stream() {
        let store = InMemoryEventStore::new();
        for _ in 0..3 {
            let id = AggregateId::new();
            store
                .append(vec![event(id, "fees.invoice")], ExpectedVersion::NoStream)
                .unwrap();
        }
        assert_eq!(store.load_all().unwrap().len(), 3);
    }

    #[test]
    fn concurrent_appends_at_same_version_admit_exactly_one() {
        let store = Arc::new(InMemoryEventStore::new());
        let id = AggregateId::new();
        store
            .append(vec![event(id, "fees.invoice")], ExpectedVersion::NoStream)
            .unwrap();

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.append(vec![event(id, "fees.invoice")], ExpectedVersion::Exact(1))
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();

        assert_eq!(successes, 1);
        assert_eq!(store.load_stream(id).unwrap().len(), 2);
    }
}
