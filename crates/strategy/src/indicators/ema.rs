/// Exponential Moving Average over the full series.
///
/// Seeds with the first observation and applies
/// `ema[i] = α·x[i] + (1−α)·ema[i−1]` with `α = 2/(period+1)`, the same
/// recurrence as pandas `ewm(span=period, adjust=False)`. Defined at every
/// index; accuracy improves with more history.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &x in values {
        let next = match prev {
            None => x,
            Some(p) => alpha * x + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}
