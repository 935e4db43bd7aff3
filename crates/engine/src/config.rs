use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Error, Interval, Result};
use risk::RiskPolicy;
use strategy::StrategyConfig;

/// Upper bound for `cooldown_secs` and `tick_secs` (30 days).
const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Bot configuration file (TOML). Every key is optional.
///
/// Example `config/trendbot.toml`:
/// ```toml
/// leverage = 10
/// cooldown_secs = 1800
/// tick_secs = 60
/// trend_interval = "15"
/// confirmation_interval = "60"
///
/// [strategy.rsi]
/// buy_below = 40.0
/// sell_above = 60.0
///
/// [risk]
/// policy = "percent"
/// stop_loss_pct = 0.02
/// take_profit_pct = 0.04
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TraderConfig {
    pub leverage: u32,
    /// Minimum wait after a reversal close before a new entry.
    pub cooldown_secs: u64,
    /// Decision loop cadence.
    pub tick_secs: u64,
    /// Candles fetched per timeframe each iteration.
    pub candle_limit: usize,
    /// Timeframe the trend is classified on.
    pub trend_interval: Interval,
    /// Timeframe confirmation indicators and risk sizing run on. May equal
    /// `trend_interval`, in which case candles are fetched once.
    pub confirmation_interval: Interval,
    pub attach_take_profit: bool,
    pub attach_stop_loss: bool,
    /// Decimal places TP/SL prices are rounded to before submission.
    pub price_decimals: u32,
    /// Seed the cooldown from the exchange's last closed position at startup.
    pub restore_cooldown_from_exchange: bool,
    pub strategy: StrategyConfig,
    pub risk: RiskPolicy,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            leverage: 10,
            cooldown_secs: 1800,
            tick_secs: 60,
            candle_limit: 200,
            trend_interval: Interval::M15,
            confirmation_interval: Interval::H1,
            attach_take_profit: true,
            attach_stop_loss: false,
            price_decimals: 2,
            restore_cooldown_from_exchange: true,
            strategy: StrategyConfig::default(),
            risk: RiskPolicy::default(),
        }
    }
}

impl TraderConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Bot config not found, using defaults");
            let cfg = Self::default();
            cfg.validate()?;
            return Ok(cfg);
        }
        let content = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Bot config loaded");
        Ok(cfg)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.leverage == 0 || self.leverage > 100 {
            return Err(Error::Config(format!("leverage must be in 1..=100, got {}", self.leverage)));
        }
        if self.tick_secs == 0 || self.tick_secs > MAX_DURATION_SECS {
            return Err(Error::Config(format!(
                "tick_secs must be in 1..={MAX_DURATION_SECS}, got {}",
                self.tick_secs
            )));
        }
        if self.cooldown_secs > MAX_DURATION_SECS {
            return Err(Error::Config(format!(
                "cooldown_secs must be <= {MAX_DURATION_SECS}, got {}",
                self.cooldown_secs
            )));
        }
        if !(2..=1000).contains(&self.candle_limit) {
            return Err(Error::Config(format!(
                "candle_limit must be in 2..=1000, got {}",
                self.candle_limit
            )));
        }
        if self.price_decimals > 10 {
            return Err(Error::Config(format!(
                "price_decimals must be <= 10, got {}",
                self.price_decimals
            )));
        }
        self.strategy.validate()?;
        self.risk.validate()?;

        if self.candle_limit < self.strategy.trend.slow_period {
            warn!(
                candle_limit = self.candle_limit,
                slow_period = self.strategy.trend.slow_period,
                "Candle window shorter than the slow trend period; trend readings will not be warmed up"
            );
        }
        Ok(())
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn tick(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tick_secs as i64)
    }
}
