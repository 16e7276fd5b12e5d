use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadStoreError {
    #[error("read store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store abstraction for disposable read models.
pub trait ReadStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    /// Read-modify-write under the store's write lock; starts from
    /// `V::default()` for a missing key.
    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> Result<(), ReadStoreError>;
    /// Drop every record (rebuild support).
    fn clear(&self) -> Result<(), ReadStoreError>;
}

impl<K, V, S> ReadStore<K, V> for Arc<S>
where
    S: ReadStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> Result<(), ReadStoreError> {
        (**self).update(key, f)
    }

    fn clear(&self) -> Result<(), ReadStoreError> {
        (**self).clear()
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryReadStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> ReadStoreError {
    ReadStoreError::Unavailable("lock poisoned".to_string())
}

impl<K, V> ReadStore<K, V> for InMemoryReadStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Default + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(key).cloned()
    }

    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> Result<(), ReadStoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        f(map.entry(key).or_default());
        Ok(())
    }

    fn clear(&self) -> Result<(), ReadStoreError> {
        self.inner.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn update_starts_from_default() {
        let store = InMemoryReadStore::<u32, Vec<u32>>::new();
        store.update(1, &mut |v| v.push(10)).unwrap();
        store.update(1, &mut |v| v.push(11)).unwrap();

        assert_eq!(store.get(&1), Some(vec![10, 11]));
        assert_eq!(store.get(&2), None);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Arc::new(InMemoryReadStore::<u32, Vec<u32>>::new());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || store.update(7, &mut |v| v.push(i)))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        assert_eq!(store.get(&7).map(|v| v.len()), Some(10));
        store.clear().unwrap();
        assert_eq!(store.get(&7), None);
    }

    #[test]
    fn poisoned_store_reports_unavailable() {
        let store = Arc::new(InMemoryReadStore::<u32, Vec<u32>>::new());
        let poison = store.clone();
        let _ = thread::spawn(move || {
            let _ = poison.update(1, &mut |_| panic!("writer died"));
        })
        .join();

        assert!(matches!(
            store.update(1, &mut |v| v.push(1)),
            Err(ReadStoreError::Unavailable(_))
        ));
        assert!(store.clear().is_err());
    }
}
