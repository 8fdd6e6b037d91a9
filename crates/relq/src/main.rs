use clap::Parser;
use relq::cli::{self, Cli};
use relq_shared::ObservabilitySystem;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli::load_config(&cli)?;
    ObservabilitySystem::init(&config.observability)?;

    match cli::run(&cli.command, &config).await {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "command failed");
            Err(e)
        }
    }
}
