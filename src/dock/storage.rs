use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::Result;

/// Key/value persistence for JSON documents.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Option<Value>;

    fn write(&self, key: &str, value: Value);

    fn remove(&self, key: &str);
}

/// Keeps values in memory only.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, Value>>,
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }
}

/// Stores every key of one JSON object file. The file is rewritten on every change.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileBackend {
    /// Opens `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &Map<String, Value>) {
        let written = serde_json::to_vec_pretty(values)
            .map_err(crate::Error::from)
            .and_then(|bytes| {
                if let Some(dir) = self.path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(&self.path, bytes)?;
                Ok(())
            });
        if let Err(err) = written {
            log::warn!("failed to persist {}: {err}", self.path.display());
        }
    }
}

impl StorageBackend for JsonFileBackend {
    fn read(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: Value) {
        let mut values = self.values.lock();
        values.insert(key.to_owned(), value);
        self.flush(&values);
    }

    fn remove(&self, key: &str) {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.flush(&values);
        }
    }
}

/// Typed access to one key of a [`StorageBackend`].
pub struct StorageHelper<T> {
    key: String,
    backend: Arc<dyn StorageBackend>,
    _ph: PhantomData<fn() -> T>,
}

impl<T> StorageHelper<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            key: key.into(),
            backend,
            _ph: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored value, or the default when nothing (or nothing decodable) is stored.
    pub fn get(&self) -> T {
        let Some(value) = self.backend.read(&self.key) else {
            return T::default();
        };
        serde_json::from_value(value).unwrap_or_else(|err| {
            log::warn!("discarding unreadable stored {}: {err}", self.key);
            T::default()
        })
    }

    pub fn set(&self, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.backend.write(&self.key, value),
            Err(err) => log::warn!("failed to encode {}: {err}", self.key),
        }
    }

    /// Shallow-merges the fields of `partial` into the stored object.
    pub fn merge(&self, partial: Value) {
        let current = self
            .backend
            .read(&self.key)
            .or_else(|| serde_json::to_value(T::default()).ok());

        let merged = match (current, partial) {
            (Some(Value::Object(mut current)), Value::Object(partial)) => {
                current.extend(partial);
                Value::Object(current)
            }
            (_, partial) => partial,
        };
        self.backend.write(&self.key, merged);
    }

    pub fn reset(&self) {
        self.backend.remove(&self.key);
    }
}
