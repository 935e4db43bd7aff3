use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Indicator periods and confirmation thresholds: the `[strategy]` section
/// of the bot config file.
///
/// Example:
/// ```toml
/// [strategy.trend]
/// fast_period = 90
/// slow_period = 200
///
/// [strategy.rsi]
/// period = 14
/// buy_below = 40.0
/// sell_above = 60.0
///
/// [strategy.bollinger]
/// period = 20
/// multiplier = 2.0
///
/// [strategy.macd]
/// fast = 12
/// slow = 26
/// signal = 9
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub trend: TrendConfig,
    pub rsi: RsiConfig,
    pub bollinger: BollingerConfig,
    pub macd: MacdConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrendConfig {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self { fast_period: 90, slow_period: 200 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RsiConfig {
    pub period: usize,
    /// Uptrend entries confirm when RSI is strictly below this.
    pub buy_below: f64,
    /// Downtrend entries confirm when RSI is strictly above this.
    pub sell_above: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self { period: 14, buy_below: 40.0, sell_above: 60.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BollingerConfig {
    pub period: usize,
    pub multiplier: f64,
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self { period: 20, multiplier: 2.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MacdConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self { fast: 12, slow: 26, signal: 9 }
    }
}

impl StrategyConfig {
    /// Reject parameter combinations the indicators cannot work with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.trend;
        if t.fast_period == 0 || t.fast_period >= t.slow_period {
            return Err(Error::Config(format!(
                "strategy.trend: need 0 < fast_period < slow_period, got {} / {}",
                t.fast_period, t.slow_period
            )));
        }

        let r = &self.rsi;
        if r.period == 0 {
            return Err(Error::Config("strategy.rsi.period must be >= 1".into()));
        }
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(r.buy_below) || !in_range(r.sell_above) || r.buy_below >= r.sell_above {
            return Err(Error::Config(format!(
                "strategy.rsi: need 0 <= buy_below < sell_above <= 100, got {} / {}",
                r.buy_below, r.sell_above
            )));
        }

        let b = &self.bollinger;
        if b.period < 2 {
            return Err(Error::Config("strategy.bollinger.period must be >= 2".into()));
        }
        if !(b.multiplier.is_finite() && b.multiplier >= 0.0) {
            return Err(Error::Config(format!(
                "strategy.bollinger.multiplier must be non-negative, got {}",
                b.multiplier
            )));
        }

        let m = &self.macd;
        if m.fast == 0 || m.signal == 0 || m.fast >= m.slow {
            return Err(Error::Config(format!(
                "strategy.macd: need 0 < fast < slow and signal > 0, got {}/{}/{}",
                m.fast, m.slow, m.signal
            )));
        }
        Ok(())
    }
}
