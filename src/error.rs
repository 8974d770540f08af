use thiserror::Error;

/// Main error type for the trading trainer
#[derive(Error, Debug)]
pub enum TraderError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Price data errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Environment contract errors
    #[error(transparent)]
    Env(#[from] EnvError),

    // Training errors
    #[error(transparent)]
    Train(#[from] TrainError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for TraderError
pub type Result<T> = std::result::Result<T, TraderError>;

/// Violations of the environment contract
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("Environment not reset: call reset() before step()")]
    NotReset,

    #[error("Episode is done: call reset() before stepping again")]
    EpisodeDone,

    #[error("Invalid action {action:?}: {reason}")]
    InvalidAction { action: Vec<f32>, reason: String },

    #[error("Price series too short: {len} bars, need at least {required}")]
    SeriesTooShort { len: usize, required: usize },

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Invalid environment configuration: {0}")]
    InvalidConfig(String),
}

/// Failures raised by the trainer and experiment runner
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Resource allocation failed: requested {requested} {resource}, available {available}")]
    ResourceAllocation {
        resource: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("Rollout worker {worker} failed: {reason}")]
    WorkerFailure { worker: usize, reason: String },

    #[error("All {0} rollout workers failed")]
    AllWorkersFailed(usize),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Incompatible checkpoint: {0}")]
    IncompatibleCheckpoint(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}
