use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rl::config::{PPOConfig, RLConfig, TrainingConfig};
use crate::rl::environment::{SyntheticConfig, TradingEnvConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub trading: TradingEnvConfig,
    pub ppo: PPOConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// OHLCV CSV file; a synthetic series is generated when unset
    pub csv_path: Option<String>,
    /// Parameters for the synthetic series
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for daily-rotated log files
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory, then the environment
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STOCK_RL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (STOCK_RL_TRAINING__NUM_WORKERS, etc.)
            .add_source(
                Environment::with_prefix("STOCK_RL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// PPO and training settings as one unit
    pub fn rl(&self) -> RLConfig {
        RLConfig {
            ppo: self.ppo.clone(),
            training: self.training.clone(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.trading.validate() {
            errors.extend(e.into_iter().map(|m| format!("trading: {m}")));
        }
        if let Err(e) = self.rl().validate() {
            errors.extend(e);
        }
        if self.data.csv_path.is_none() && self.data.synthetic.len <= self.trading.window_size {
            errors.push(format!(
                "data.synthetic.len must exceed trading.window_size ({})",
                self.trading.window_size
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
