use std::collections::HashMap;
use std::sync::Mutex;

use cask_types::error::{CaskError, Result};

use crate::storage::StorageBackend;

/// In-memory storage backend for testing. Thread-safe via Mutex.
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let map = self.data.lock().unwrap();
        Ok(map.contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let map = self.data.lock().unwrap();
        let keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Ok(keys)
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        match map.get(key) {
            Some(data) => {
                let start = offset as usize;
                let end = start.checked_add(length as usize).ok_or_else(|| {
                    CaskError::Other(format!(
                        "short read on {key} at offset {offset}: offset + length overflows usize"
                    ))
                })?;
                if start >= data.len() || end > data.len() {
                    return Err(CaskError::Other(format!(
                        "short read on {key} at offset {offset}: expected {length} bytes, got {}",
                        data.len().saturating_sub(start)
                    )));
                }
                Ok(Some(data[start..end].to_vec()))
            }
            None => Ok(None),
        }
    }
}
