use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, PositionSide};
use risk::{size_entry, RiskPolicy};

fn candles(closes: &[f64], spread: f64) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: Utc.timestamp_opt(i as i64 * 900, 0).unwrap(),
            open: close,
            high: close + spread,
            low: (close - spread).max(0.0),
            close,
            volume: 1.0,
            turnover: close,
        })
        .collect()
}

fn side() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

proptest! {
    /// Percent sizing always puts the stop on the adverse side and the
    /// target on the favorable side of the entry.
    #[test]
    fn percent_levels_respect_direction(
        entry in 0.0001f64..1_000_000.0f64,
        stop_pct in 0.001f64..0.5f64,
        target_pct in 0.001f64..0.9f64,
        side in side(),
    ) {
        let sizer = RiskPolicy::Percent { stop_loss_pct: stop_pct, take_profit_pct: target_pct }
            .build()
            .unwrap();
        let levels = size_entry(sizer.as_ref(), &[], entry, side).unwrap();
        prop_assert!(levels.stop_price.is_finite() && levels.target_price.is_finite());
        prop_assert!(levels.stop_price != levels.target_price);
        match side {
            PositionSide::Long => {
                prop_assert!(levels.stop_price < entry && entry < levels.target_price)
            }
            PositionSide::Short => {
                prop_assert!(levels.target_price < entry && entry < levels.stop_price)
            }
        }
    }

    /// ATR sizing either satisfies the same contract or reports an error;
    /// it never panics and never returns inverted levels.
    #[test]
    fn atr_levels_never_inverted(
        closes in prop::collection::vec(1.0f64..10_000.0f64, 2..120),
        spread in 0.0f64..50.0f64,
        entry in 1.0f64..10_000.0f64,
        side in side(),
    ) {
        let sizer = RiskPolicy::Atr { period: 14, stop_multiplier: 1.5, target_multiplier: 3.0 }
            .build()
            .unwrap();
        if let Ok(levels) = size_entry(sizer.as_ref(), &candles(&closes, spread), entry, side) {
            match side {
                PositionSide::Long => {
                    prop_assert!(levels.stop_price < entry && entry < levels.target_price)
                }
                PositionSide::Short => {
                    prop_assert!(levels.target_price < entry && entry < levels.stop_price)
                }
            }
        }
    }
}
