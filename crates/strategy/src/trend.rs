use serde::Serialize;

use common::Trend;

use crate::indicators::ema;

/// Classifies trend from a fast/slow EMA pair over the full history.
#[derive(Debug, Clone)]
pub struct TrendClassifier {
    pub fast_period: usize,
    pub slow_period: usize,
}

/// Result of a trend classification, with the values it was based on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendReading {
    pub trend: Trend,
    pub fast_ema: f64,
    pub slow_ema: f64,
    /// False when fewer closes than `slow_period` were available. The
    /// reading is still usable, with degraded confidence.
    pub warmed_up: bool,
}

impl TrendClassifier {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        assert!(fast_period >= 1, "fast period must be >= 1");
        assert!(fast_period < slow_period, "fast period must be less than slow period");
        Self { fast_period, slow_period }
    }

    /// Uptrend when the fast EMA is strictly above the slow EMA on the
    /// latest close; ties and everything else are Downtrend.
    /// Returns `None` only for an empty slice.
    pub fn classify(&self, closes: &[f64]) -> Option<TrendReading> {
        let fast_ema = *ema(closes, self.fast_period).last()?;
        let slow_ema = *ema(closes, self.slow_period).last()?;

        let trend = if fast_ema > slow_ema {
            Trend::Uptrend
        } else {
            Trend::Downtrend
        };

        Some(TrendReading {
            trend,
            fast_ema,
            slow_ema,
            warmed_up: closes.len() >= self.slow_period,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_prices_are_an_uptrend() {
        let closes: Vec<f64> = (0..300).map(|i| 100.0 + i as f64).collect();
        let reading = TrendClassifier::new(90, 200).classify(&closes).unwrap();
        assert_eq!(reading.trend, Trend::Uptrend);
        assert!(reading.warmed_up);
        assert!(reading.fast_ema > reading.slow_ema);
    }

    #[test]
    fn falling_prices_are_a_downtrend() {
        let closes: Vec<f64> = (0..300).map(|i| 400.0 - i as f64).collect();
        let reading = TrendClassifier::new(90, 200).classify(&closes).unwrap();
        assert_eq!(reading.trend, Trend::Downtrend);
    }

    #[test]
    fn flat_prices_tie_to_downtrend() {
        let reading = TrendClassifier::new(3, 6).classify(&[50.0; 10]).unwrap();
        assert_eq!(reading.fast_ema, reading.slow_ema);
        assert_eq!(reading.trend, Trend::Downtrend);
    }

    #[test]
    fn short_history_is_flagged_not_rejected() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let reading = TrendClassifier::new(90, 200).classify(&closes).unwrap();
        assert!(!reading.warmed_up);
        assert_eq!(reading.trend, Trend::Uptrend);
    }

    #[test]
    fn empty_history_has_no_reading() {
        assert!(TrendClassifier::new(90, 200).classify(&[]).is_none());
    }
}
