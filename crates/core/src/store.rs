use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::domain::Database;
use crate::io::atomic_write;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read database file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse database file `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("could not encode database: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("could not write database file `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// Whole-document persistence for the tracker database.
pub trait DatabaseStore: Send + Sync {
    /// `Ok(None)` means nothing has been saved yet.
    fn load(&self) -> Result<Option<Database>, StoreError>;
    fn save(&self, database: &Database) -> Result<(), StoreError>;
    fn describe(&self) -> String;
}

/// Stores the database as one indented JSON document.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatabaseStore for JsonFileStore {
    fn load(&self) -> Result<Option<Database>, StoreError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Read { path: self.path.clone(), source }),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| StoreError::Parse { path: self.path.clone(), source })
    }

    fn save(&self, database: &Database) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(database).map_err(StoreError::Encode)?;
        atomic_write(&self.path, &encoded)
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Keeps the last saved snapshot in memory; used where no file should be touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    saved: Option<Database>,
    saves: usize,
}

impl MemoryStore {
    pub fn with_database(database: Database) -> Self {
        Self { state: Mutex::new(MemoryState { saved: Some(database), saves: 0 }) }
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    pub fn saved(&self) -> Option<Database> {
        self.lock().saved.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DatabaseStore for MemoryStore {
    fn load(&self) -> Result<Option<Database>, StoreError> {
        Ok(self.lock().saved.clone())
    }

    fn save(&self, database: &Database) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.saved = Some(database.clone());
        state.saves += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}
