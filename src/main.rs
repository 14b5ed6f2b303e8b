use clap::Parser;
use riskboard::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    cli::execute(cli).await?;
    Ok(())
}
