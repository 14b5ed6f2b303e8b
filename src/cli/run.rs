//! Handler for the `run` command.

use tracing::info;

use super::RunArgs;
use crate::app::{App, Config};
use crate::error::Result;

/// Execute the run command.
pub async fn execute(mut config: Config, args: &RunArgs) -> Result<()> {
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    config.init_logging();

    info!(
        gateway = ?config.gateway.kind,
        database = ?config.database.backend,
        "riskboard starting"
    );
    App::run(config).await?;
    info!("riskboard stopped");
    Ok(())
}
