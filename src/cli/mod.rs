//! stock-rl CLI
//!
//! Commands:
//! - `stock-rl train` - Train a PPO agent on the stock trading environment
//! - `stock-rl evaluate` - Replay a checkpointed policy over one episode
//! - `stock-rl inspect-data` - Summarize a price CSV

pub mod commands;

use clap::{Args, Parser, Subcommand};

pub use commands::{
    build_config, evaluate_config, load_series, run_evaluate, run_inspect_data, run_train,
    EvaluationReport,
};

/// Stock trading reinforcement learning CLI
#[derive(Parser, Debug)]
#[command(name = "stock-rl")]
#[command(author, version, about = "Train PPO agents on a simulated stock trading environment")]
pub struct Cli {
    /// Configuration directory (default.toml, <STOCK_RL_ENV>.toml)
    #[arg(long, global = true, default_value = "config", env = "STOCK_RL_CONFIG_DIR")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a PPO agent with parallel rollout workers
    Train(TrainArgs),

    /// Run a checkpointed policy deterministically over one episode
    Evaluate(EvaluateArgs),

    /// Print a summary of a price CSV
    InspectData {
        /// CSV with Date, Open, High, Low, Close, Volume columns
        path: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Number of rollout workers (0 samples on the driver)
    #[arg(long, default_value = "1")]
    pub num_cpus: usize,

    /// Number of accelerators for the learner
    #[arg(long, default_value = "0")]
    pub num_gpus: usize,

    /// Log level when RUST_LOG is unset (TRACE, DEBUG, INFO, WARN, ERROR);
    /// overrides `[logging] level`
    #[arg(long)]
    pub tune_log_level: Option<String>,

    /// Log the account state after every environment step
    #[arg(long)]
    pub env_logging: bool,

    /// Resume from a checkpoint directory or a file inside it
    #[arg(long)]
    pub restore: Option<String>,

    /// Price CSV; a synthetic series is used when omitted
    #[arg(long)]
    pub data: Option<String>,

    /// Stop after this many training iterations
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Root directory for experiment checkpoints
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    /// Seed for workers, environments and the learner
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Checkpoint directory or a file inside it
    #[arg(short, long)]
    pub checkpoint: String,

    /// Price CSV; a synthetic series is used when omitted
    #[arg(long)]
    pub data: Option<String>,

    /// Seed for the environment
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Log the account state after every step
    #[arg(long)]
    pub env_logging: bool,
}
