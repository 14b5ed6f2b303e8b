use std::path::Path;

use super::output;
use crate::app::{Config, DatabaseBackend, GatewayKind, TOKEN_ENV};
use crate::error::Result;

/// Validate the configuration file without starting the desk.
pub fn execute(config_path: &Path) -> Result<()> {
    println!("Checking configuration: {}", config_path.display());

    let config = Config::load(config_path)?;
    output::ok("Configuration file is valid");

    output::section("Summary");
    output::key_value("Gateway", format!("{:?}", config.gateway.kind));
    match config.database.backend {
        DatabaseBackend::Sqlite => output::key_value("Database", &config.database.url),
        DatabaseBackend::Memory => output::key_value("Database", "in-memory"),
    }
    output::key_value(
        "Refresh",
        format!(
            "structural {}s, trading {}ms",
            config.cache.structural_refresh_secs, config.cache.trading_refresh_ms
        ),
    );
    output::key_value(
        "Freeze",
        format!("{}s default", config.risk.default_freeze_duration_secs),
    );
    println!();

    if config.gateway.kind == GatewayKind::Metaapi {
        if config.gateway.token.is_some() {
            output::ok(&format!("API token found (from {TOKEN_ENV} env var)"));
        } else {
            output::warn("No API token configured");
            output::note(&format!("  Set {TOKEN_ENV} to connect to MetaApi"));
        }
    }
    Ok(())
}
