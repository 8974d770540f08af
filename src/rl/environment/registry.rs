//! Environment Registry
//!
//! Maps environment names to factories so rollout workers can build their
//! own independent instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::market::PriceSeries;
use super::trading::{StockTradingEnvironment, TradingEnvConfig};
use super::{EnvResult, Environment};
use crate::error::EnvError;

/// Name the stock trading environment is registered under
pub const DEFAULT_ENV_NAME: &str = "StockTrading_env";

/// Per-instance context handed to a factory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvContext {
    /// Index of the rollout worker that owns the instance
    pub worker_index: usize,
    /// Seed for the instance's random source
    pub seed: u64,
}

/// Builds a fresh environment instance
pub type EnvFactory =
    Arc<dyn Fn(EnvContext) -> EnvResult<Box<dyn Environment>> + Send + Sync>;

/// Name-to-factory map
#[derive(Clone, Default)]
pub struct EnvRegistry {
    factories: HashMap<String, EnvFactory>,
}

impl fmt::Debug for EnvRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl EnvRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock trading environment under [`DEFAULT_ENV_NAME`]
    pub fn with_stock_trading(series: Arc<PriceSeries>, config: TradingEnvConfig) -> Self {
        let mut registry = Self::new();
        registry.register_stock_trading(DEFAULT_ENV_NAME, series, config);
        registry
    }

    /// Register a factory, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(EnvContext) -> EnvResult<Box<dyn Environment>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a stock trading environment sharing `series` across instances
    pub fn register_stock_trading(
        &mut self,
        name: impl Into<String>,
        series: Arc<PriceSeries>,
        config: TradingEnvConfig,
    ) {
        self.register(name, move |ctx: EnvContext| {
            let config = TradingEnvConfig {
                seed: Some(ctx.seed),
                ..config.clone()
            };
            let env = StockTradingEnvironment::new(series.clone(), config)?;
            Ok(Box::new(env) as Box<dyn Environment>)
        });
    }

    pub fn get(&self, name: &str) -> EnvResult<EnvFactory> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| EnvError::UnknownEnvironment(name.to_string()))
    }

    /// Build an instance of the named environment
    pub fn make(&self, name: &str, ctx: EnvContext) -> EnvResult<Box<dyn Environment>> {
        (self.get(name)?)(ctx)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
