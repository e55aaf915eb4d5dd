//! The per-domain adapter handed out by the manager — a thin wrapper over
//! whichever [`Backend`] was chosen at init plus a fixed domain name.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::Backend;
use crate::error::DataError;

#[derive(Clone)]
pub struct Adapter {
    backend: Arc<dyn Backend>,
    domain: &'static str,
}

impl Adapter {
    pub(crate) fn new(backend: Arc<dyn Backend>, domain: &'static str) -> Self {
        Self { backend, domain }
    }

    pub async fn get(&self, id: &str) -> Option<Value> {
        self.backend.get(self.domain, id).await.unwrap_or_else(|err| {
            tracing::error!(domain = self.domain, id, error = %err, "adapter get failed");
            None
        })
    }

    pub async fn list(&self) -> Vec<Value> {
        self.backend.list(self.domain).await.unwrap_or_else(|err| {
            tracing::error!(domain = self.domain, error = %err, "adapter list failed");
            Vec::new()
        })
    }

    pub async fn save(&self, id: &str, value: Value) -> Result<Value, DataError> {
        self.backend.save(self.domain, id, value).await
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.backend.delete(self.domain, id).await.unwrap_or_else(|err| {
            tracing::error!(domain = self.domain, id, error = %err, "adapter delete failed");
            false
        })
    }

    pub async fn count(&self) -> u64 {
        self.backend.count(self.domain).await.unwrap_or(0)
    }
}
