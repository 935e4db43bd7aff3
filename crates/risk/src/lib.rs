pub mod sizing;

pub use sizing::{atr, size_entry, AtrSizer, PercentSizer, RiskPolicy, RiskSizer};
