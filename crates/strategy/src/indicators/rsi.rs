use super::Series;

/// RSI (Relative Strength Index) indicator.
///
/// Average gain and loss are plain trailing means over up to `period`
/// price changes, with partial windows allowed from the first sample (the
/// change at index 0 counts as zero). This is the rolling-mean RSI the bot
/// has always traded on, not Wilder's smoothed variant.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self { period }
    }

    /// RSI at every index of `closes`.
    ///
    /// An index is undefined when its window saw no price movement at all
    /// (average gain and average loss both zero).
    pub fn series(&self, closes: &[f64]) -> Series {
        let mut gains = Vec::with_capacity(closes.len());
        let mut losses = Vec::with_capacity(closes.len());
        for i in 0..closes.len() {
            let delta = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
            gains.push(delta.max(0.0));
            losses.push((-delta).max(0.0));
        }

        (0..closes.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(self.period);
                let n = (i + 1 - start) as f64;
                let avg_gain = gains[start..=i].iter().sum::<f64>() / n;
                let avg_loss = losses[start..=i].iter().sum::<f64>() / n;
                rsi_from_averages(avg_gain, avg_loss)
            })
            .collect()
    }

    /// RSI of the most recent close.
    pub fn latest(&self, closes: &[f64]) -> Option<f64> {
        self.series(closes).last().copied().flatten()
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        if avg_gain > 0.0 {
            return Some(100.0);
        }
        return None;
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
