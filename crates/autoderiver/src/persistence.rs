//! Persisted application state and the byte stores it is kept in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::evaluate::EvaluationOptions;
use crate::parameters::PackedValues;

pub const STATE_KEY: &str = "autoderiver-state";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored state is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// An opaque key-value byte store.
pub trait Storage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    fn save(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// One `<key>.json` file per key under a base directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.base_path)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path(key)) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RefCell<HashMap<String, Vec<u8>>>,
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        self.values
            .borrow_mut()
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}

/// A schema as stored: never the derived item list, only the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSchema {
    pub name: String,
    pub input: String,
    #[serde(default)]
    pub parameters: PackedValues,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub schemas: Vec<PersistedSchema>,
    pub article: String,
    pub options: EvaluationOptions,
}

impl PersistedState {
    pub fn load(storage: &dyn Storage) -> Result<Option<Self>, PersistenceError> {
        let Some(bytes) = storage.load(STATE_KEY)? else {
            debug!("no stored state");
            return Ok(None);
        };
        let state: Self = serde_json::from_slice(&bytes).inspect_err(|error| {
            warn!(%error, "stored state could not be read");
        })?;
        debug!(schemas = state.schemas.len(), "state loaded");
        Ok(Some(state))
    }

    pub fn save(&self, storage: &dyn Storage) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        storage.save(STATE_KEY, &bytes).inspect_err(|error| {
            warn!(%error, "state could not be saved");
        })?;
        debug!(schemas = self.schemas.len(), "state saved");
        Ok(())
    }
}
