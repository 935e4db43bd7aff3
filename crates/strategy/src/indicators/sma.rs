use super::Series;

/// Simple Moving Average of the trailing `period` values.
/// Undefined until `period` samples exist.
pub fn sma(values: &[f64], period: usize) -> Series {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &x) in values.iter().enumerate() {
        sum += x;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out.push(Some(sum / period as f64));
        } else {
            out.push(None);
        }
    }
    out
}
