use std::io::Write;
use std::path::Path;

use stock_rl::cli::{run_evaluate, run_inspect_data, run_train};
use stock_rl::config::AppConfig;
use stock_rl::error::{TrainError, TraderError};
use stock_rl::rl::training::Checkpointer;

/// Write a dated OHLCV file in descending date order, the way many price
/// exports arrive.
fn write_prices(path: &Path, bars: usize) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "Date,Open,High,Low,Close,Adj Close,Volume").unwrap();
    let start = chrono::NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
    for i in (0..bars).rev() {
        let date = start + chrono::Duration::days(i as i64);
        let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05;
        writeln!(
            file,
            "{date},{:.2},{:.2},{:.2},{close:.2},{close:.2},{}",
            close - 0.5,
            close + 1.0,
            close - 1.0,
            1_000_000 + i * 1_000
        )
        .unwrap();
    }
}

fn app_config(csv: &Path, checkpoints: &Path, iterations: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.data.csv_path = Some(csv.display().to_string());
    config.trading.max_episode_steps = 40;
    config.ppo.n_epochs = 2;
    config.ppo.hidden_dim = 16;
    config.training.num_workers = 2;
    config.training.train_batch_size = 120;
    config.training.iterations = iterations;
    config.training.checkpoint_dir = checkpoints.display().to_string();
    config.training.seed = 3;
    config
}

/// Train on a CSV, resume from the last checkpoint and evaluate it.
#[tokio::test]
async fn train_restore_and_evaluate_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("AAPL.csv");
    write_prices(&csv, 120);
    let checkpoints = dir.path().join("checkpoints");

    let config = app_config(&csv, &checkpoints, 4);
    assert!(config.validate().is_ok());

    let summary = run_train(config, None).await.unwrap();
    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.timesteps_total, 4 * 120);
    assert!(!summary.interrupted);

    // Periodic checkpoint at 3, final checkpoint at 4
    let checkpointer = Checkpointer::new(checkpoints.join("StockTrading_env"), 50).unwrap();
    let saved: Vec<usize> = checkpointer
        .list_checkpoints()
        .iter()
        .map(|c| c.metadata.iteration)
        .collect();
    assert_eq!(saved, vec![3, 4]);

    let last = summary.last_checkpoint.unwrap();
    let resumed = run_train(app_config(&csv, &checkpoints, 6), Some(last.to_str().unwrap()))
        .await
        .unwrap();
    assert_eq!(resumed.iterations, 6);
    assert_eq!(resumed.timesteps_total, 6 * 120);

    let eval_config = app_config(&csv, &checkpoints, 6);
    let report = run_evaluate(
        &eval_config,
        resumed.last_checkpoint.unwrap().to_str().unwrap(),
        9,
    )
    .unwrap();
    assert_eq!(report.checkpoint_iteration, 6);
    assert!(report.episode.length > 0);
    assert!(report.balance >= 0.0);
    assert!(report.shares_held >= 0.0);
    let holdings_value = report.episode.final_net_worth - report.balance;
    assert!(holdings_value >= -1e-6);
}

/// A checkpoint trained against a different observation shape is refused.
#[tokio::test]
async fn evaluate_rejects_incompatible_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("prices.csv");
    write_prices(&csv, 80);
    let checkpoints = dir.path().join("checkpoints");

    let summary = run_train(app_config(&csv, &checkpoints, 1), None)
        .await
        .unwrap();
    let checkpoint = summary.last_checkpoint.unwrap();

    let mut other = app_config(&csv, &checkpoints, 1);
    other.trading.window_size = 3;
    let err = run_evaluate(&other, checkpoint.to_str().unwrap(), 0).unwrap_err();
    assert!(matches!(
        err,
        TraderError::Train(TrainError::IncompatibleCheckpoint(_))
    ));
}

/// Input rows are sorted by date regardless of file order.
#[test]
fn inspect_data_sorts_by_date() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("prices.csv");
    write_prices(&csv, 30);

    let summary = run_inspect_data(csv.to_str().unwrap()).unwrap();
    assert_eq!(summary.bars, 30);
    assert_eq!(summary.first_date.unwrap().to_string(), "2019-01-01");
    assert_eq!(summary.last_date.unwrap().to_string(), "2019-01-30");
}

/// Training fails fast on a series shorter than the observation window.
#[tokio::test]
async fn too_short_series_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("prices.csv");
    write_prices(&csv, 4);

    let err = run_train(app_config(&csv, &dir.path().join("ckpt"), 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TraderError::Env(_)), "unexpected error: {err}");
}
