use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV candle as returned by the exchange.
/// `timestamp` is the candle open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Quote-currency volume.
    pub turnover: f64,
}

/// A validated candle window: non-empty, strictly increasing timestamps.
///
/// Exchanges commonly return klines newest-first; construction sorts them
/// ascending so index `len - 1` is always the most recent candle.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(mut candles: Vec<Candle>) -> Result<Self> {
        if candles.is_empty() {
            return Err(Error::DataUnavailable("empty candle window".into()));
        }
        candles.sort_by_key(|c| c.timestamp);
        if let Some(pair) = candles.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(Error::DataUnavailable(format!(
                "duplicate candle timestamp {}",
                pair[0].timestamp
            )));
        }
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn last(&self) -> &Candle {
        // Non-empty by construction.
        &self.candles[self.candles.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// Kline interval, using Bybit's interval codes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1")]
    M1,
    #[serde(rename = "3")]
    M3,
    #[serde(rename = "5")]
    M5,
    #[serde(rename = "15")]
    M15,
    #[serde(rename = "30")]
    M30,
    #[serde(rename = "60")]
    H1,
    #[serde(rename = "120")]
    H2,
    #[serde(rename = "240")]
    H4,
    #[serde(rename = "360")]
    H6,
    #[serde(rename = "720")]
    H12,
    #[serde(rename = "D")]
    D1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1",
            Interval::M3 => "3",
            Interval::M5 => "5",
            Interval::M15 => "15",
            Interval::M30 => "30",
            Interval::H1 => "60",
            Interval::H2 => "120",
            Interval::H4 => "240",
            Interval::H6 => "360",
            Interval::H12 => "720",
            Interval::D1 => "D",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directional market classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Uptrend,
    Downtrend,
}

impl Trend {
    /// The position side that agrees with this trend.
    pub fn aligned_side(&self) -> PositionSide {
        match self {
            Trend::Uptrend => PositionSide::Long,
            Trend::Downtrend => PositionSide::Short,
        }
    }

    /// True when holding `side` during this trend goes against it.
    pub fn contradicts(&self, side: PositionSide) -> bool {
        self.aligned_side() != side
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Uptrend => write!(f, "uptrend"),
            Trend::Downtrend => write!(f, "downtrend"),
        }
    }
}

/// Trend-aligned confirmation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    #[default]
    None,
}

impl Signal {
    /// The position side a signal would open, if any.
    pub fn entry_side(&self) -> Option<PositionSide> {
        match self {
            Signal::Buy => Some(PositionSide::Long),
            Signal::Sell => Some(PositionSide::Short),
            Signal::None => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "buy"),
            Signal::Sell => write!(f, "sell"),
            Signal::None => write!(f, "none"),
        }
    }
}

/// Side of an order on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position in this direction.
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Read-only snapshot of the exchange's open position for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    /// Average entry price, when the exchange reports one.
    pub entry_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The most recently closed position, used to restore the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub updated_at: DateTime<Utc>,
}

/// Stop-loss and take-profit price levels for a prospective entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub stop_price: f64,
    pub target_price: f64,
}

impl RiskLevels {
    /// Check the levels against an entry: stop on the adverse side, target
    /// on the favorable side, both finite and positive.
    pub fn validate(&self, entry_price: f64, side: PositionSide) -> Result<()> {
        let finite = self.stop_price.is_finite() && self.target_price.is_finite();
        if !finite || self.stop_price <= 0.0 || self.target_price <= 0.0 {
            return Err(Error::RiskSizing(format!(
                "levels must be finite and positive (stop={}, target={})",
                self.stop_price, self.target_price
            )));
        }
        let ordered = match side {
            PositionSide::Long => self.stop_price < entry_price && entry_price < self.target_price,
            PositionSide::Short => self.target_price < entry_price && entry_price < self.stop_price,
        };
        if !ordered {
            return Err(Error::RiskSizing(format!(
                "{side} levels on the wrong side of entry {entry_price} (stop={}, target={})",
                self.stop_price, self.target_price
            )));
        }
        Ok(())
    }
}

/// An entry order to be submitted to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-assigned id, sent to the exchange so duplicates are traceable.
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Reference price at decision time. Orders are submitted at market.
    pub price: f64,
    pub leverage: u32,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
}

impl OrderRequest {
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        price: f64,
        leverage: u32,
    ) -> Self {
        Self {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            leverage,
            take_profit: None,
            stop_loss: None,
        }
    }
}

/// Exchange acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub client_order_id: String,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
