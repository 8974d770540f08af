//! Price Series
//!
//! Read-only OHLCV history that environments step through. Loaded from CSV
//! or generated synthetically for experiments without a data file.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TraderError};

/// One OHLCV record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    #[serde(rename = "Date", default)]
    pub date: Option<NaiveDate>,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Volume")]
    pub volume: f64,
}

impl PriceBar {
    fn validate(&self, index: usize) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(TraderError::InvalidMarketData(format!(
                "bar {index}: prices must be finite and positive"
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(TraderError::InvalidMarketData(format!(
                "bar {index}: volume must be finite and non-negative"
            )));
        }
        Ok(())
    }
}

/// Synthetic series parameters (geometric Brownian motion)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of bars
    pub len: usize,
    /// Starting close price
    pub initial_price: f64,
    /// Per-bar drift of log returns
    pub drift: f64,
    /// Per-bar volatility of log returns
    pub volatility: f64,
    /// Mean daily volume
    pub mean_volume: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            len: 2_000,
            initial_price: 100.0,
            drift: 0.0002,
            volatility: 0.015,
            mean_volume: 1_000_000.0,
            seed: 7,
        }
    }
}

/// Summary statistics over a series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub bars: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub min_close: f64,
    pub max_close: f64,
    pub mean_volume: f64,
}

/// Ordered, read-only OHLCV history
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build from bars, validating prices and sorting by date when dated
    pub fn from_bars(mut bars: Vec<PriceBar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(TraderError::InvalidMarketData(
                "price series is empty".to_string(),
            ));
        }
        for (i, bar) in bars.iter().enumerate() {
            bar.validate(i)?;
        }
        if bars.iter().all(|b| b.date.is_some()) {
            bars.sort_by_key(|b| b.date);
        }
        Ok(Self { bars })
    }

    /// Load from a CSV file with `Date,Open,High,Low,Close,Volume` headers.
    /// Extra columns are ignored.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut reader = csv::Reader::from_reader(file);

        let mut bars = Vec::new();
        for record in reader.deserialize() {
            let bar: PriceBar = record?;
            bars.push(bar);
        }

        debug!(path = %path.display(), bars = bars.len(), "Loaded price series");
        Self::from_bars(bars)
    }

    /// Generate a geometric Brownian motion series
    pub fn synthetic(config: &SyntheticConfig) -> Result<Self> {
        if config.len == 0 || config.initial_price <= 0.0 || config.volatility < 0.0 {
            return Err(TraderError::InvalidConfig(
                "synthetic series needs len > 0, initial_price > 0, volatility >= 0".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let returns = Normal::new(config.drift, config.volatility)
            .map_err(|e| TraderError::InvalidConfig(e.to_string()))?;
        let noise = Normal::new(0.0, config.volatility.max(1e-6) / 2.0)
            .map_err(|e| TraderError::InvalidConfig(e.to_string()))?;

        let mut bars = Vec::with_capacity(config.len);
        let mut prev_close = config.initial_price;

        for _ in 0..config.len {
            let open = prev_close;
            let close = open * returns.sample(&mut rng).exp();
            let high = open.max(close) * (1.0 + noise.sample(&mut rng).abs());
            let low = open.min(close) * (1.0 - noise.sample(&mut rng).abs()).max(0.5);
            let volume = config.mean_volume * (1.0 + noise.sample(&mut rng)).abs();

            bars.push(PriceBar {
                date: None,
                open,
                high,
                low,
                close,
                volume,
            });
            prev_close = close;
        }

        Self::from_bars(bars)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bar(&self, index: usize) -> &PriceBar {
        &self.bars[index]
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    /// Bars in `[end + 1 - len, end]`
    pub fn window(&self, end: usize, len: usize) -> &[PriceBar] {
        &self.bars[end + 1 - len..=end]
    }

    pub fn summary(&self) -> SeriesSummary {
        let closes = self.bars.iter().map(|b| b.close);
        let min_close = closes.clone().fold(f64::INFINITY, f64::min);
        let max_close = closes.fold(f64::NEG_INFINITY, f64::max);
        let mean_volume =
            self.bars.iter().map(|b| b.volume).sum::<f64>() / self.bars.len() as f64;

        SeriesSummary {
            bars: self.bars.len(),
            first_date: self.bars.first().and_then(|b| b.date),
            last_date: self.bars.last().and_then(|b| b.date),
            min_close,
            max_close,
            mean_volume,
        }
    }
}
