pub mod config;
pub mod confirmation;
pub mod indicators;
pub mod trend;

pub use config::StrategyConfig;
pub use confirmation::{Confirmation, ConfirmationEngine, IndicatorSnapshot, MacdPoint, Trigger};
pub use trend::{TrendClassifier, TrendReading};

/// Trend classifier and confirmation engine built from one config.
#[derive(Debug, Clone)]
pub struct Strategy {
    pub trend: TrendClassifier,
    pub confirmation: ConfirmationEngine,
}

impl Strategy {
    /// Validate `cfg` and build both stages.
    pub fn from_config(cfg: &StrategyConfig) -> common::Result<Self> {
        cfg.validate()?;
        Ok(Self {
            trend: TrendClassifier::new(cfg.trend.fast_period, cfg.trend.slow_period),
            confirmation: ConfirmationEngine::new(cfg),
        })
    }
}
