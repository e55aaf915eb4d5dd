//! Ambient substrate shared by every toolhost crate: configuration, error
//! taxonomy, health aggregation and small cross-cutting value types.

pub mod config;
pub mod error;
pub mod health;
pub mod services;
pub mod types;

pub mod prelude {
    pub use crate::config::{Config, TransportMode};
    pub use crate::error::{rpc_code, AppError, RpcError};
    pub use crate::health::{HealthIndicator, HealthLabel, HealthRegistry, HealthSnapshot, SubsystemHealth};
    pub use crate::services::ServiceBag;
    pub use crate::types::{mint_tool_use_id, now_rfc3339, HookOutcome, HookPayload, HookType};
}
