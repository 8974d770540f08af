pub mod cli;
pub mod config;
pub mod error;
pub mod rl;

pub use config::AppConfig;
pub use error::{EnvError, Result, TrainError, TraderError};
pub use rl::{
    Environment, EnvRegistry, Experiment, ExperimentSummary, PriceSeries, RLConfig,
    StockTradingEnvironment, Trainer, TradingEnvConfig, TrainingResult, DEFAULT_ENV_NAME,
};
