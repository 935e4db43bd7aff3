use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Candle, Error, PositionSide, Result, RiskLevels};

/// Computes stop-loss and take-profit levels for a prospective entry.
///
/// Implementations must put the stop on the adverse side of `entry_price`
/// and the target on the favorable side. `RiskSizer::levels` callers should
/// go through [`size_entry`], which enforces that contract.
pub trait RiskSizer: Send + Sync {
    fn name(&self) -> &str;

    fn levels(&self, candles: &[Candle], entry_price: f64, side: PositionSide) -> Result<RiskLevels>;
}

/// Run `sizer` and reject any result that breaks the stop/target contract.
pub fn size_entry(
    sizer: &dyn RiskSizer,
    candles: &[Candle],
    entry_price: f64,
    side: PositionSide,
) -> Result<RiskLevels> {
    if !(entry_price.is_finite() && entry_price > 0.0) {
        return Err(Error::RiskSizing(format!("invalid entry price {entry_price}")));
    }
    let levels = sizer.levels(candles, entry_price, side)?;
    levels.validate(entry_price, side)?;
    debug!(
        sizer = sizer.name(),
        %side,
        entry = entry_price,
        stop = levels.stop_price,
        target = levels.target_price,
        "Risk levels computed"
    );
    Ok(levels)
}

/// User-configurable sizing policy: the `[risk]` section of the bot config.
///
/// ```toml
/// [risk]
/// policy = "atr"
/// period = 14
/// stop_multiplier = 1.5
/// target_multiplier = 3.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum RiskPolicy {
    /// Fixed fractions of the entry price.
    Percent {
        /// Distance to the stop (e.g. 0.02 = 2%).
        stop_loss_pct: f64,
        /// Distance to the target (e.g. 0.04 = 4%).
        take_profit_pct: f64,
    },
    /// Multiples of the Average True Range.
    Atr {
        period: usize,
        stop_multiplier: f64,
        target_multiplier: f64,
    },
}

impl Default for RiskPolicy {
    fn default() -> Self {
        RiskPolicy::Percent {
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
        }
    }
}

impl RiskPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            RiskPolicy::Percent { stop_loss_pct, take_profit_pct } => {
                let ok = |p: f64| p.is_finite() && p > 0.0 && p < 1.0;
                if !ok(stop_loss_pct) || !ok(take_profit_pct) {
                    return Err(Error::Config(format!(
                        "risk: percentages must be in (0, 1), got stop {stop_loss_pct} / target {take_profit_pct}"
                    )));
                }
            }
            RiskPolicy::Atr { period, stop_multiplier, target_multiplier } => {
                if period == 0 {
                    return Err(Error::Config("risk.period must be >= 1".into()));
                }
                let ok = |m: f64| m.is_finite() && m > 0.0;
                if !ok(stop_multiplier) || !ok(target_multiplier) {
                    return Err(Error::Config(format!(
                        "risk: multipliers must be positive, got stop {stop_multiplier} / target {target_multiplier}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate and build the sizer this policy describes.
    pub fn build(&self) -> Result<Box<dyn RiskSizer>> {
        self.validate()?;
        Ok(match *self {
            RiskPolicy::Percent { stop_loss_pct, take_profit_pct } => {
                Box::new(PercentSizer { stop_loss_pct, take_profit_pct })
            }
            RiskPolicy::Atr { period, stop_multiplier, target_multiplier } => Box::new(AtrSizer {
                period,
                stop_multiplier,
                target_multiplier,
            }),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PercentSizer {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl RiskSizer for PercentSizer {
    fn name(&self) -> &str {
        "percent"
    }

    fn levels(&self, _candles: &[Candle], entry_price: f64, side: PositionSide) -> Result<RiskLevels> {
        Ok(offset_levels(
            entry_price,
            side,
            entry_price * self.stop_loss_pct,
            entry_price * self.take_profit_pct,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct AtrSizer {
    pub period: usize,
    pub stop_multiplier: f64,
    pub target_multiplier: f64,
}

impl RiskSizer for AtrSizer {
    fn name(&self) -> &str {
        "atr"
    }

    fn levels(&self, candles: &[Candle], entry_price: f64, side: PositionSide) -> Result<RiskLevels> {
        let atr = atr(candles, self.period).ok_or_else(|| {
            Error::RiskSizing(format!(
                "ATR({}) needs {} candles, got {}",
                self.period,
                self.period + 1,
                candles.len()
            ))
        })?;
        if atr <= 0.0 {
            return Err(Error::RiskSizing("ATR is zero; no volatility to size against".into()));
        }
        Ok(offset_levels(
            entry_price,
            side,
            atr * self.stop_multiplier,
            atr * self.target_multiplier,
        ))
    }
}

fn offset_levels(entry: f64, side: PositionSide, stop_distance: f64, target_distance: f64) -> RiskLevels {
    match side {
        PositionSide::Long => RiskLevels {
            stop_price: entry - stop_distance,
            target_price: entry + target_distance,
        },
        PositionSide::Short => RiskLevels {
            stop_price: entry + stop_distance,
            target_price: entry - target_distance,
        },
    }
}

/// Average True Range with Wilder smoothing, on the latest candle.
///
/// Seeds with the mean of the first `period` true ranges (each needs a
/// previous close), so at least `period + 1` candles are required.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let c = &w[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect();

    let mut value = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        value = (value * (period - 1) as f64 + tr) / period as f64;
    }
    Some(value)
}
