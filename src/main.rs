use clap::Parser;
use stock_rl::cli::{self, Cli, Commands};
use stock_rl::error::Result;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Train(args) => {
            let config = cli::build_config(&cli.config, args)?;
            init_logging(&config.logging);
            cli::run_train(config, args.restore.as_deref()).await?;
        }
        Commands::Evaluate(args) => {
            let config = cli::evaluate_config(&cli.config, args)?;
            init_logging(&config.logging);
            cli::run_evaluate(&config, &args.checkpoint, args.seed)?;
        }
        Commands::InspectData { path } => {
            init_logging_simple();
            cli::run_inspect_data(path)?;
        }
    }

    Ok(())
}
