//! Application layer - configuration and orchestration.

mod config;
mod orchestrator;

pub use config::{
    CacheConfig, Config, DatabaseBackend, DatabaseConfig, GatewayConfig, GatewayKind,
    LoggingConfig, RiskConfig, TOKEN_ENV,
};
pub use orchestrator::App;
