//! Bollinger Bands.
//!
//! - Middle: SMA over `period` closes
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle − (multiplier × StdDev)
//!
//! StdDev is the *sample* standard deviation (divides by N−1), matching
//! pandas `rolling(...).std()`. Warm-up: the first `period − 1` indices are
//! undefined.

use serde::{Deserialize, Serialize};

use super::sma;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub period: usize,
    pub multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        assert!(multiplier >= 0.0, "Bollinger multiplier must be non-negative");
        Self { period, multiplier }
    }

    pub fn series(&self, closes: &[f64]) -> Vec<Option<Bands>> {
        let middles = sma(closes, self.period);

        middles
            .iter()
            .enumerate()
            .map(|(i, middle)| {
                let middle = (*middle)?;
                let window = &closes[i + 1 - self.period..=i];
                let variance = window
                    .iter()
                    .map(|x| {
                        let diff = x - middle;
                        diff * diff
                    })
                    .sum::<f64>()
                    / (self.period - 1) as f64;
                let band = self.multiplier * variance.sqrt();
                Some(Bands {
                    upper: middle + band,
                    middle,
                    lower: middle - band,
                })
            })
            .collect()
    }

    /// Bands at the most recent close.
    pub fn latest(&self, closes: &[f64]) -> Option<Bands> {
        self.series(closes).last().copied().flatten()
    }
}
