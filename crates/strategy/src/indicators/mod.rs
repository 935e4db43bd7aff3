//! Indicator library.
//!
//! Every function takes a closing-price slice (oldest first) and returns a
//! series index-aligned to it. Indicators with a warm-up window return
//! `None` at indices where the window is not yet satisfied.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use bollinger::{Bands, BollingerBands};
pub use ema::ema;
pub use macd::{MacdIndicator, MacdSeries, MacdSignal};
pub use rsi::RsiIndicator;
pub use sma::sma;

/// A value series aligned to a candle sequence. `None` marks an index
/// before the indicator's warm-up window is satisfied.
pub type Series = Vec<Option<f64>>;
