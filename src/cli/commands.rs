//! Command handlers for the stock-rl CLI

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use super::{EvaluateArgs, TrainArgs};
use crate::config::{AppConfig, DataConfig};
use crate::error::{Result, TraderError, TrainError};
use crate::rl::environment::{
    EnvRegistry, Environment, EpisodeStart, PriceSeries, SeriesSummary, StockTradingEnvironment,
};
use crate::rl::training::{run_episode, Checkpointer, EpisodeResult, Experiment, ExperimentSummary};

/// Account state after a deterministic evaluation episode
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub checkpoint_iteration: usize,
    pub episode: EpisodeResult,
    pub initial_balance: f64,
    pub balance: f64,
    pub shares_held: f64,
    pub max_net_worth: f64,
    pub total_fees: f64,
}

/// Load the layered configuration and apply `train` flags on top
pub fn build_config(config_dir: &str, args: &TrainArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load_from(config_dir)?;

    config.training.num_workers = args.num_cpus;
    config.training.num_gpus = args.num_gpus;
    config.trading.log_steps |= args.env_logging;
    if let Some(level) = &args.tune_log_level {
        config.logging.level = level.to_lowercase();
    }
    if let Some(data) = &args.data {
        config.data.csv_path = Some(data.clone());
    }
    if let Some(iterations) = args.iterations {
        config.training.iterations = iterations;
    }
    if let Some(dir) = &args.checkpoint_dir {
        config.training.checkpoint_dir = dir.clone();
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }

    validated(config)
}

/// Load the layered configuration and apply `evaluate` flags on top
pub fn evaluate_config(config_dir: &str, args: &EvaluateArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load_from(config_dir)?;

    config.trading.log_steps |= args.env_logging;
    if let Some(data) = &args.data {
        config.data.csv_path = Some(data.clone());
    }

    validated(config)
}

fn validated(config: AppConfig) -> Result<AppConfig> {
    config
        .validate()
        .map_err(|errors| TraderError::InvalidConfig(errors.join("; ")))?;
    Ok(config)
}

/// Read the configured CSV, or generate the synthetic series
pub fn load_series(data: &DataConfig) -> Result<PriceSeries> {
    match &data.csv_path {
        Some(path) => {
            info!(path = %path, "Loading price series");
            PriceSeries::from_csv(path)
        }
        None => {
            info!(
                len = data.synthetic.len,
                seed = data.synthetic.seed,
                "Generating synthetic price series"
            );
            PriceSeries::synthetic(&data.synthetic)
        }
    }
}

/// Register the environment and run the experiment until its stop
/// iteration or Ctrl+C
pub async fn run_train(config: AppConfig, restore: Option<&str>) -> Result<ExperimentSummary> {
    let series = Arc::new(load_series(&config.data)?);
    log_summary(&series.summary());

    let registry = EnvRegistry::with_stock_trading(series, config.trading.clone());
    let rl = config.rl();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               stock-rl PPO Training                          ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Environment:    {:<44}║", rl.training.env_name);
    println!("║  Workers:        {:<44}║", rl.training.num_workers);
    println!("║  GPUs:           {:<44}║", rl.training.num_gpus);
    println!("║  Batch Size:     {:<44}║", rl.training.train_batch_size);
    println!("║  Iterations:     {:<44}║", rl.training.iterations);
    println!("║  Checkpoints:    {:<44}║", rl.training.checkpoint_dir);
    println!("╚══════════════════════════════════════════════════════════════╝");

    let mut experiment = Experiment::new(rl, registry)?;
    if let Some(path) = restore {
        info!(path = %path, "Restoring from checkpoint");
        experiment.restore(path)?;
    }

    let stop = experiment.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping after the current iteration");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let outcome = experiment.run().await;
    ctrl_c.abort();
    let summary = outcome?;

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║               Training Complete                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Iterations:     {:<44}║", summary.iterations);
    println!("║  Timesteps:      {:<44}║", summary.timesteps_total);
    println!("║  Best Reward:    {:<44}║", fmt_opt(summary.best_reward_mean));
    println!("║  Interrupted:    {:<44}║", summary.interrupted);
    println!("╚══════════════════════════════════════════════════════════════╝");
    if let Some(path) = &summary.best_checkpoint {
        println!("Best checkpoint: {}", path.display());
    }
    if let Some(path) = &summary.last_checkpoint {
        println!("Last checkpoint: {}", path.display());
    }

    Ok(summary)
}

/// Replay a checkpointed policy with its mean action from the first
/// admissible step
pub fn run_evaluate(config: &AppConfig, checkpoint: &str, seed: u64) -> Result<EvaluationReport> {
    let state = Checkpointer::load(checkpoint)?;
    let series = Arc::new(load_series(&config.data)?);

    let mut env_config = config.trading.clone();
    env_config.episode_start = EpisodeStart::Beginning;
    env_config.seed = Some(seed);
    let mut env = StockTradingEnvironment::new(series, env_config)?;

    state
        .policy_config
        .check_compatible(env.observation_space().dim(), env.action_space())
        .map_err(TrainError::IncompatibleCheckpoint)?;

    let policy = state.policy_snapshot();
    let episode = run_episode(&mut env, &policy, true, seed)?;
    let account = env.account();
    let report = EvaluationReport {
        checkpoint_iteration: state.iteration,
        episode,
        initial_balance: account.initial_balance(),
        balance: account.balance(),
        shares_held: account.shares_held(),
        max_net_worth: account.max_net_worth(),
        total_fees: account.total_fees(),
    };

    info!(
        iteration = report.checkpoint_iteration,
        steps = report.episode.length,
        reward = report.episode.total_reward,
        net_worth = report.episode.final_net_worth,
        "Evaluation finished"
    );

    println!("Checkpoint iteration: {}", report.checkpoint_iteration);
    println!("Steps:                {}", report.episode.length);
    println!("Total reward:         {:.4}", report.episode.total_reward);
    println!("Balance:              {:.2}", report.balance);
    println!("Shares held:          {:.4}", report.shares_held);
    println!("Net worth:            {:.2}", report.episode.final_net_worth);
    println!("Max net worth:        {:.2}", report.max_net_worth);
    println!("Profit:               {:.2}", report.episode.profit);
    println!("Trades:               {}", report.episode.num_trades);
    println!("Fees:                 {:.2}", report.total_fees);

    Ok(report)
}

/// Load a price CSV and print its summary
pub fn run_inspect_data(path: &str) -> Result<SeriesSummary> {
    let series = PriceSeries::from_csv(path)?;
    let summary = series.summary();

    println!("File:        {path}");
    println!("Bars:        {}", summary.bars);
    println!(
        "Dates:       {} .. {}",
        summary
            .first_date
            .map_or_else(|| "-".to_string(), |d| d.to_string()),
        summary
            .last_date
            .map_or_else(|| "-".to_string(), |d| d.to_string()),
    );
    println!("Close range: {:.2} .. {:.2}", summary.min_close, summary.max_close);
    println!("Mean volume: {:.0}", summary.mean_volume);

    Ok(summary)
}

fn log_summary(summary: &SeriesSummary) {
    info!(
        bars = summary.bars,
        first_date = ?summary.first_date,
        last_date = ?summary.last_date,
        min_close = summary.min_close,
        max_close = summary.max_close,
        "Price series ready"
    );
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::environment::SyntheticConfig;
    use std::io::Write;

    fn train_args() -> TrainArgs {
        TrainArgs {
            num_cpus: 3,
            num_gpus: 0,
            tune_log_level: Some("DEBUG".to_string()),
            env_logging: true,
            restore: None,
            data: None,
            iterations: Some(4),
            checkpoint_dir: Some("/tmp/stock-rl-test".to_string()),
            seed: Some(11),
        }
    }

    #[test]
    fn test_build_config_applies_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = build_config(dir.path().to_str().unwrap(), &train_args()).unwrap();

        assert_eq!(config.training.num_workers, 3);
        assert_eq!(config.training.iterations, 4);
        assert_eq!(config.training.seed, 11);
        assert_eq!(config.training.checkpoint_dir, "/tmp/stock-rl-test");
        assert!(config.trading.log_steps);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_log_level_comes_from_file_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(file, "[logging]\nlevel = \"warn\"").unwrap();

        let args = TrainArgs {
            tune_log_level: None,
            ..train_args()
        };
        let config = build_config(dir.path().to_str().unwrap(), &args).unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_evaluate_config_rejects_zero_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(file, "[trading]\nwindow_size = 0").unwrap();

        let args = EvaluateArgs {
            checkpoint: "unused".to_string(),
            data: None,
            seed: 0,
            env_logging: true,
        };
        let err = evaluate_config(dir.path().to_str().unwrap(), &args).unwrap_err();
        assert!(matches!(err, TraderError::InvalidConfig(msg) if msg.contains("window_size")));
    }

    #[test]
    fn test_build_config_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(file, "[trading]\ninitial_balance = -5.0").unwrap();

        let err = build_config(dir.path().to_str().unwrap(), &train_args()).unwrap_err();
        assert!(matches!(err, TraderError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_series_synthetic() {
        let data = DataConfig {
            csv_path: None,
            synthetic: SyntheticConfig {
                len: 50,
                ..Default::default()
            },
        };
        assert_eq!(load_series(&data).unwrap().len(), 50);
    }

    #[test]
    fn test_inspect_data_reads_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Adj Close,Volume").unwrap();
        writeln!(file, "2020-01-03,10,11,9,10.5,10.5,1000").unwrap();
        writeln!(file, "2020-01-02,9,10,8,9.5,9.5,2000").unwrap();

        let summary = run_inspect_data(path.to_str().unwrap()).unwrap();
        assert_eq!(summary.bars, 2);
        assert_eq!(summary.first_date.unwrap().to_string(), "2020-01-02");
        assert_eq!(summary.max_close, 10.5);
    }

    #[test]
    fn test_evaluate_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_evaluate(
            &AppConfig::default(),
            dir.path().join("nope").to_str().unwrap(),
            0,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TraderError::Train(TrainError::CheckpointNotFound(_))
        ));
    }
}
