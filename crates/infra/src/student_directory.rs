//! In-memory student directory for tests/dev.
//!
//! Onboarding lives elsewhere; this backend is seeded up front (directly or
//! from a JSON file) and afterwards only has its lock flags flipped.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use feeledger_students::{
    DirectoryError, LockState, StudentDirectory, StudentDisplayInfo, StudentId, StudentRecord,
};

/// One student as written in a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSeed {
    pub id: StudentId,
    pub name: String,
    pub class_name: String,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub fee_locked: bool,
    #[serde(default)]
    pub lock_reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read student seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid student seed file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    class_name: String,
    mobile: Option<String>,
    lock: LockState,
}

/// Student directory held in memory.
///
/// Ordered by id so class lookups are deterministic.
#[derive(Debug, Default)]
pub struct InMemoryStudentDirectory {
    students: RwLock<BTreeMap<StudentId, Entry>>,
}

impl InMemoryStudentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: impl IntoIterator<Item = StudentSeed>) -> Self {
        let dir = Self::new();
        for seed in seeds {
            dir.insert(seed);
        }
        dir
    }

    /// Load a JSON array of `StudentSeed`s.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        let seeds: Vec<StudentSeed> = serde_json::from_str(&raw)?;
        Ok(Self::from_seeds(seeds))
    }

    pub fn insert(&self, seed: StudentSeed) {
        let lock = if seed.fee_locked {
            LockState {
                fee_locked: true,
                lock_reason: seed.lock_reason,
            }
        } else {
            LockState::unlocked()
        };

        if let Ok(mut students) = self.students.write() {
            students.insert(
                seed.id,
                Entry {
                    name: seed.name,
                    class_name: seed.class_name,
                    mobile: seed.mobile,
                    lock,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.students.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unavailable() -> DirectoryError {
    DirectoryError::Unavailable("lock poisoned".to_string())
}

impl StudentDirectory for InMemoryStudentDirectory {
    fn lookup(&self, id: StudentId) -> Result<StudentRecord, DirectoryError> {
        let students = self.students.read().map_err(|_| unavailable())?;
        let entry = students.get(&id).ok_or(DirectoryError::NotFound(id))?;
        Ok(StudentRecord {
            id,
            class_name: entry.class_name.clone(),
            lock: entry.lock.clone(),
        })
    }

    fn ids_in_class(&self, class_name: &str) -> Result<Vec<StudentId>, DirectoryError> {
        let students = self.students.read().map_err(|_| unavailable())?;
        Ok(students
            .iter()
            .filter(|(_, e)| e.class_name == class_name)
            .map(|(id, _)| *id)
            .collect())
    }

    fn set_lock(&self, id: StudentId, lock: LockState) -> Result<LockState, DirectoryError> {
        let mut students = self.students.write().map_err(|_| unavailable())?;
        let entry = students.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        entry.lock = lock;
        Ok(entry.lock.clone())
    }

    fn display_info(&self, id: StudentId) -> Result<StudentDisplayInfo, DirectoryError> {
        let students = self.students.read().map_err(|_| unavailable())?;
        let entry = students.get(&id).ok_or(DirectoryError::NotFound(id))?;
        Ok(StudentDisplayInfo {
            name: entry.name.clone(),
            mobile: entry.mobile.clone(),
        })
    }
}
