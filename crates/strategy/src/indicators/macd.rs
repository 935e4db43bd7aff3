use super::ema;

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// Computes: MACD line = EMA(fast) − EMA(slow), Signal = EMA(macd_line, signal_period),
/// using the same seeded EMA as the rest of the library, so both lines are
/// defined at every index.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// Crossover state on the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdSignal {
    Bullish, // MACD crossed above signal line
    Bearish, // MACD crossed below signal line
    Neutral, // No crossover on the latest bar
}

impl MacdSignal {
    /// Strict crossover between two consecutive `(macd, signal)` bars.
    pub fn between(prev: (f64, f64), curr: (f64, f64)) -> Self {
        let ((prev_macd, prev_sig), (curr_macd, curr_sig)) = (prev, curr);
        if prev_macd < prev_sig && curr_macd > curr_sig {
            MacdSignal::Bullish
        } else if prev_macd > prev_sig && curr_macd < curr_sig {
            MacdSignal::Bearish
        } else {
            MacdSignal::Neutral
        }
    }
}

/// MACD and signal lines, index-aligned to the input closes.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

impl MacdSeries {
    /// `(macd, signal)` on the latest bar and the one before it.
    pub fn last_two(&self) -> Option<((f64, f64), (f64, f64))> {
        let n = self.macd.len();
        if n < 2 {
            return None;
        }
        Some((
            (self.macd[n - 2], self.signal[n - 2]),
            (self.macd[n - 1], self.signal[n - 1]),
        ))
    }
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be less than slow period");
        Self { fast, slow, signal }
    }

    pub fn series(&self, closes: &[f64]) -> MacdSeries {
        let fast = ema(closes, self.fast);
        let slow = ema(closes, self.slow);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema(&macd, self.signal);
        MacdSeries { macd, signal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossover(macd: &MacdIndicator, closes: &[f64]) -> Option<MacdSignal> {
        macd.series(closes)
            .last_two()
            .map(|(prev, curr)| MacdSignal::between(prev, curr))
    }

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn macd_returns_none_with_single_close() {
        let macd = MacdIndicator::new(12, 26, 9);
        assert!(crossover(&macd, &[100.0]).is_none());
    }

    #[test]
    fn macd_lines_are_aligned_and_start_at_zero() {
        let macd = MacdIndicator::new(12, 26, 9);
        let series = macd.series(&trending_up(40));
        assert_eq!(series.macd.len(), 40);
        assert_eq!(series.signal.len(), 40);
        assert_eq!(series.macd[0], 0.0);
        assert_eq!(series.signal[0], 0.0);
    }

    #[test]
    fn macd_detects_bullish_crossover_after_reversal() {
        let macd = MacdIndicator::new(3, 6, 3);
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let mut found = false;
        for i in 0..10 {
            prices.push(81.0 + i as f64 * 3.0);
            if crossover(&macd, &prices) == Some(MacdSignal::Bullish) {
                found = true;
                break;
            }
        }
        assert!(found, "expected a bullish crossover after the reversal");
    }

    #[test]
    fn macd_detects_bearish_crossover_after_reversal() {
        let macd = MacdIndicator::new(3, 6, 3);
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let mut found = false;
        for i in 0..10 {
            prices.push(119.0 - i as f64 * 3.0);
            if crossover(&macd, &prices) == Some(MacdSignal::Bearish) {
                found = true;
                break;
            }
        }
        assert!(found, "expected a bearish crossover after the reversal");
    }

    #[test]
    fn crossover_requires_strict_inequalities() {
        assert_eq!(MacdSignal::between((-1.0, 0.0), (0.5, 0.0)), MacdSignal::Bullish);
        assert_eq!(MacdSignal::between((1.0, 0.0), (-0.5, 0.0)), MacdSignal::Bearish);
        // Touching the signal line is not a cross.
        assert_eq!(MacdSignal::between((-1.0, 0.0), (0.0, 0.0)), MacdSignal::Neutral);
        assert_eq!(MacdSignal::between((0.0, 0.0), (1.0, 0.0)), MacdSignal::Neutral);
    }

    #[test]
    fn macd_neutral_on_steady_trend() {
        let macd = MacdIndicator::new(3, 6, 3);
        assert_eq!(crossover(&macd, &trending_up(40)), Some(MacdSignal::Neutral));
    }
}
