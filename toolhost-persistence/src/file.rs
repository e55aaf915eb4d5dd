//! Single-document filesystem backend: the middle link of the fallback
//! chain, used when no durable store is configured but a data directory is.
//!
//! The whole document is serialized atomically on every write: write to a
//! temp file in the same directory, `fsync`, then `rename` over the target
//! — the rename is the only operation observers can see half of, and POSIX
//! guarantees it's atomic.
//!
//! On disk, every domain is an array of records except `triggersState`,
//! which the contract describes as a single optional object rather than a
//! list; internally it is still tracked as a 0-or-1-element list and
//! unwrapped/wrapped at the document boundary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{Backend, BackendKind};
use crate::domain::{self, TRIGGERS};
use crate::error::DataError;

pub struct FileBackend {
    doc_path: PathBuf,
    state: RwLock<HashMap<String, Vec<Value>>>,
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

impl FileBackend {
    /// Loads (or initializes) the document at `data_dir/state.json`.
    pub async fn open(data_dir: &Path) -> Result<Self, DataError> {
        tokio::fs::create_dir_all(data_dir).await.map_err(DataError::backend)?;
        let doc_path = data_dir.join("state.json");
        let state = match tokio::fs::read(&doc_path).await {
            Ok(bytes) => parse_document(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => empty_document(),
            Err(err) => return Err(DataError::backend(err)),
        };
        let backend = Self { doc_path, state: RwLock::new(state) };
        backend.persist().await?;
        Ok(backend)
    }

    async fn persist(&self) -> Result<(), DataError> {
        let state = self.state.read().await;
        let mut doc = serde_json::Map::new();
        for (domain, records) in state.iter() {
            if domain.as_str() == TRIGGERS {
                doc.insert(domain.clone(), records.first().cloned().unwrap_or(Value::Null));
            } else {
                doc.insert(domain.clone(), Value::Array(records.clone()));
            }
        }
        drop(state);

        let bytes = serde_json::to_vec_pretty(&Value::Object(doc)).map_err(DataError::backend)?;
        let dir = self.doc_path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = dir.join(format!(".state.json.{}.tmp", uuid::Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&temp_path).await.map_err(DataError::backend)?;
        use tokio::io::AsyncWriteExt;
        file.write_all(&bytes).await.map_err(DataError::backend)?;
        file.sync_all().await.map_err(DataError::backend)?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.doc_path).await.map_err(DataError::backend)?;
        Ok(())
    }
}

fn empty_document() -> HashMap<String, Vec<Value>> {
    domain::ALL.iter().map(|name| (name.to_string(), Vec::new())).collect()
}

fn parse_document(bytes: &[u8]) -> Result<HashMap<String, Vec<Value>>, DataError> {
    let doc: Value = if bytes.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(bytes).map_err(DataError::backend)?
    };
    let mut state = empty_document();
    if let Value::Object(map) = doc {
        for (domain, value) in map {
            let records = if domain == TRIGGERS {
                match value {
                    Value::Null => Vec::new(),
                    other => vec![other],
                }
            } else {
                match value {
                    Value::Array(items) => items,
                    other => vec![other],
                }
            };
            state.insert(domain, records);
        }
    }
    Ok(state)
}

#[async_trait]
impl Backend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    async fn get(&self, domain: &str, id: &str) -> Result<Option<Value>, DataError> {
        let state = self.state.read().await;
        Ok(state.get(domain).and_then(|records| records.iter().find(|r| record_id(r) == Some(id)).cloned()))
    }

    async fn list(&self, domain: &str) -> Result<Vec<Value>, DataError> {
        let state = self.state.read().await;
        Ok(state.get(domain).cloned().unwrap_or_default())
    }

    async fn save(&self, domain: &str, id: &str, mut value: Value) -> Result<Value, DataError> {
        if let Value::Object(map) = &mut value {
            map.insert("id".to_string(), Value::String(id.to_string()));
        }
        {
            let mut state = self.state.write().await;
            let records = state.entry(domain.to_string()).or_default();
            if domain == TRIGGERS {
                records.clear();
                records.push(value.clone());
            } else if let Some(existing) = records.iter_mut().find(|r| record_id(r) == Some(id)) {
                *existing = value.clone();
            } else {
                records.push(value.clone());
            }
        }
        self.persist().await?;
        Ok(value)
    }

    async fn delete(&self, domain: &str, id: &str) -> Result<bool, DataError> {
        let removed = {
            let mut state = self.state.write().await;
            match state.get_mut(domain) {
                Some(records) => {
                    let before = records.len();
                    records.retain(|r| record_id(r) != Some(id));
                    before != records.len()
                }
                None => false,
            }
        };
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn count(&self, domain: &str) -> Result<u64, DataError> {
        let state = self.state.read().await;
        Ok(state.get(domain).map(|records| records.len() as u64).unwrap_or(0))
    }

    async fn close(&self) {
        let _ = self.persist().await;
    }
}
