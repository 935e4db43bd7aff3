use serde::Serialize;
use tracing::debug;

use common::{Signal, Trend};

use crate::config::StrategyConfig;
use crate::indicators::{Bands, BollingerBands, MacdIndicator, MacdSignal, RsiIndicator};

/// MACD and signal-line values on one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
}

impl MacdPoint {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }
}

/// Latest indicator values the confirmation is decided on.
/// Undefined values mean the indicator has not warmed up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    /// Reference price; may be a live quote newer than the last close.
    pub price: f64,
    pub rsi: Option<f64>,
    pub bands: Option<Bands>,
    pub macd_prev: Option<MacdPoint>,
    pub macd_curr: Option<MacdPoint>,
}

/// Which predicate confirmed a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    /// RSI beyond the configured threshold.
    Rsi,
    /// Price outside the Bollinger band.
    Band,
    /// MACD crossed its signal line in the trend's direction.
    MacdCross,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub signal: Signal,
    /// Every predicate that held. Empty when `signal` is `None`.
    pub triggers: Vec<Trigger>,
}

/// Derives trend-aligned Buy/Sell signals from RSI, Bollinger Bands and
/// MACD crossovers. Never emits a signal against the trend.
#[derive(Debug, Clone)]
pub struct ConfirmationEngine {
    rsi: RsiIndicator,
    bollinger: BollingerBands,
    macd: MacdIndicator,
    buy_below: f64,
    sell_above: f64,
}

impl ConfirmationEngine {
    /// Build from a validated config.
    pub fn new(cfg: &StrategyConfig) -> Self {
        Self {
            rsi: RsiIndicator::new(cfg.rsi.period),
            bollinger: BollingerBands::new(cfg.bollinger.period, cfg.bollinger.multiplier),
            macd: MacdIndicator::new(cfg.macd.fast, cfg.macd.slow, cfg.macd.signal),
            buy_below: cfg.rsi.buy_below,
            sell_above: cfg.rsi.sell_above,
        }
    }

    /// Compute the indicator snapshot for `closes` at reference `price`.
    pub fn snapshot(&self, closes: &[f64], price: f64) -> IndicatorSnapshot {
        let macd = self.macd.series(closes);
        let (macd_prev, macd_curr) = match macd.last_two() {
            Some(((pm, ps), (cm, cs))) => (
                Some(MacdPoint { macd: pm, signal: ps }),
                Some(MacdPoint { macd: cm, signal: cs }),
            ),
            None => (
                None,
                macd.macd
                    .last()
                    .zip(macd.signal.last())
                    .map(|(&m, &s)| MacdPoint { macd: m, signal: s }),
            ),
        };

        IndicatorSnapshot {
            price,
            rsi: self.rsi.latest(closes),
            bands: self.bollinger.latest(closes),
            macd_prev,
            macd_curr,
        }
    }

    /// Evaluate all three predicates for `trend`; any one is sufficient.
    pub fn confirm(&self, trend: Trend, snap: &IndicatorSnapshot) -> Confirmation {
        let mut triggers = Vec::new();
        let cross = match (snap.macd_prev, snap.macd_curr) {
            (Some(p), Some(c)) => MacdSignal::between((p.macd, p.signal), (c.macd, c.signal)),
            _ => MacdSignal::Neutral,
        };

        let signal = match trend {
            Trend::Uptrend => {
                if snap.rsi.is_some_and(|r| r < self.buy_below) {
                    triggers.push(Trigger::Rsi);
                }
                if snap.bands.is_some_and(|b| snap.price < b.lower) {
                    triggers.push(Trigger::Band);
                }
                if cross == MacdSignal::Bullish {
                    triggers.push(Trigger::MacdCross);
                }
                Signal::Buy
            }
            Trend::Downtrend => {
                if snap.rsi.is_some_and(|r| r > self.sell_above) {
                    triggers.push(Trigger::Rsi);
                }
                if snap.bands.is_some_and(|b| snap.price > b.upper) {
                    triggers.push(Trigger::Band);
                }
                if cross == MacdSignal::Bearish {
                    triggers.push(Trigger::MacdCross);
                }
                Signal::Sell
            }
        };

        if triggers.is_empty() {
            debug!(%trend, "No confirmation signal");
            return Confirmation { signal: Signal::None, triggers };
        }
        debug!(%trend, %signal, ?triggers, "Confirmation signal");
        Confirmation { signal, triggers }
    }

    /// Snapshot and confirm in one step.
    pub fn evaluate(&self, trend: Trend, closes: &[f64], price: f64) -> (IndicatorSnapshot, Confirmation) {
        let snap = self.snapshot(closes, price);
        let confirmation = self.confirm(trend, &snap);
        (snap, confirmation)
    }
}
