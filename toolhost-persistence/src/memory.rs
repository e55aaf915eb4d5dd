//! Ephemeral, in-process backend: the final link of the fallback chain.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{Backend, BackendKind};
use crate::error::DataError;

#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get(&self, domain: &str, id: &str) -> Result<Option<Value>, DataError> {
        let data = self.data.read().expect("memory backend lock poisoned");
        Ok(data.get(domain).and_then(|records| records.get(id)).cloned())
    }

    async fn list(&self, domain: &str) -> Result<Vec<Value>, DataError> {
        let data = self.data.read().expect("memory backend lock poisoned");
        Ok(data.get(domain).map(|records| records.values().cloned().collect()).unwrap_or_default())
    }

    async fn save(&self, domain: &str, id: &str, value: Value) -> Result<Value, DataError> {
        let mut data = self.data.write().expect("memory backend lock poisoned");
        data.entry(domain.to_string()).or_default().insert(id.to_string(), value.clone());
        Ok(value)
    }

    async fn delete(&self, domain: &str, id: &str) -> Result<bool, DataError> {
        let mut data = self.data.write().expect("memory backend lock poisoned");
        Ok(data.get_mut(domain).map(|records| records.remove(id).is_some()).unwrap_or(false))
    }

    async fn count(&self, domain: &str) -> Result<u64, DataError> {
        let data = self.data.read().expect("memory backend lock poisoned");
        Ok(data.get(domain).map(|records| records.len() as u64).unwrap_or(0))
    }
}
