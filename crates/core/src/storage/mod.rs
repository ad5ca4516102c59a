//! Minimal durable key-value storage used to persist playback state.

use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{Result, SpectraError};

/// String key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Volatile store, useful for tests and when no durable location exists.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores each key as `<key>.json` inside a directory, created on demand.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(SpectraError::Storage(format!("invalid storage key `{key}`")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) => match e.kind() {
                ErrorKind::NotFound => Ok(None),
                ErrorKind::PermissionDenied => Err(SpectraError::Storage(format!(
                    "permission denied: cannot read {path:?}"
                ))),
                _ => Err(SpectraError::Storage(format!(
                    "failed to read {path:?}: {e}"
                ))),
            },
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Err(e) = fs::create_dir_all(&self.dir) {
            return Err(SpectraError::Storage(match e.kind() {
                ErrorKind::PermissionDenied => {
                    format!("permission denied: cannot create directory {:?}", self.dir)
                }
                _ => format!("failed to create directory {:?}: {e}", self.dir),
            }));
        }

        fs::write(&path, value).map_err(|e| {
            SpectraError::Storage(match e.kind() {
                ErrorKind::PermissionDenied => {
                    format!("permission denied: cannot write to {path:?}")
                }
                _ => format!("failed to write to {path:?}: {e}"),
            })
        })
    }
}
