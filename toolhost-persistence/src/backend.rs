//! The single adapter interface every concrete backend implements, per the
//! design note: "persistence fallback is expressed as three concrete
//! implementations of one adapter interface per domain... no runtime
//! polymorphic chain walk at call time." The manager picks one
//! implementation at init and every domain adapter is a thin wrapper over
//! it plus a domain name.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Durable,
    File,
    Memory,
}

impl BackendKind {
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Durable => "durable",
            BackendKind::File => "file",
            BackendKind::Memory => "memory",
        }
    }
}

/// A record-oriented store keyed by `(domain, id)`. Every domain the
/// persistence manager serves shares this same interface; concrete
/// per-domain schemas live above this layer (out of scope here — records
/// are opaque JSON).
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Returns `None` on absence rather than an error.
    async fn get(&self, domain: &str, id: &str) -> Result<Option<Value>, DataError>;

    /// Returns an empty vector on absence rather than an error.
    async fn list(&self, domain: &str) -> Result<Vec<Value>, DataError>;

    /// Upserts `value` under `id`, returning the stored value.
    async fn save(&self, domain: &str, id: &str, value: Value) -> Result<Value, DataError>;

    /// Returns whether a record existed and was removed.
    async fn delete(&self, domain: &str, id: &str) -> Result<bool, DataError>;

    async fn count(&self, domain: &str) -> Result<u64, DataError>;

    /// Best-effort close; never observed to fail mid-shutdown.
    async fn close(&self) {}
}
