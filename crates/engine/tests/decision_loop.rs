use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use common::{
    Candle, ClosedPosition, Error, ExchangeClient, Interval, OrderRequest, OrderResult,
    OrderSide, Position, PositionSide, Result,
};
use engine::{IterationOutcome, Trader, TraderConfig};

const SYMBOL: &str = "BTCUSDT";

/// Exchange double with scripted market data, a single-position ledger and
/// failure switches. Records every call the trader makes.
#[derive(Default)]
struct ScriptedExchange {
    candles: Mutex<Vec<Candle>>,
    price: Mutex<f64>,
    position: Mutex<Option<Position>>,
    last_closed: Mutex<Option<ClosedPosition>>,
    orders: Mutex<Vec<OrderRequest>>,
    candle_calls: Mutex<HashMap<Interval, usize>>,
    position_queries: AtomicUsize,
    closes: AtomicUsize,
    fail_candles: AtomicBool,
    fail_query: AtomicBool,
    fail_close: AtomicBool,
    fail_order: AtomicBool,
}

impl ScriptedExchange {
    fn new(closes: &[f64], price: f64) -> Arc<Self> {
        let exchange = Self::default();
        *exchange.candles.lock().unwrap() = candles(closes);
        *exchange.price.lock().unwrap() = price;
        Arc::new(exchange)
    }

    fn open(&self, side: PositionSide) {
        *self.position.lock().unwrap() = Some(Position {
            symbol: SYMBOL.into(),
            side,
            size: 0.03,
            entry_price: Some(100.0),
            opened_at: at(-3600),
            updated_at: at(-60),
        });
    }

    fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    fn candle_calls(&self) -> usize {
        self.candle_calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn fetch_candles(&self, _: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        *self.candle_calls.lock().unwrap().entry(interval).or_default() += 1;
        if self.fail_candles.load(Ordering::SeqCst) {
            return Err(Error::Http("connection reset".into()));
        }
        // Newest first, the way the exchange serves klines.
        let mut candles = self.candles.lock().unwrap().clone();
        candles.reverse();
        candles.truncate(limit);
        Ok(candles)
    }

    async fn fetch_reference_price(&self, _: &str) -> Result<f64> {
        Ok(*self.price.lock().unwrap())
    }

    async fn get_open_position(&self, _: &str) -> Result<Option<Position>> {
        self.position_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(Error::Http("timeout".into()));
        }
        Ok(self.position.lock().unwrap().clone())
    }

    async fn close_position(&self, _: &Position) -> Result<()> {
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(Error::Exchange("retCode 110017: reduce-only rejected".into()));
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        *self.position.lock().unwrap() = None;
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        if self.fail_order.load(Ordering::SeqCst) {
            return Err(Error::Exchange("retCode 110007: insufficient balance".into()));
        }
        let side = match order.side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };
        self.orders.lock().unwrap().push(order.clone());
        *self.position.lock().unwrap() = Some(Position {
            symbol: order.symbol.clone(),
            side,
            size: order.quantity,
            entry_price: Some(order.price),
            opened_at: Utc::now(),
            updated_at: Utc::now(),
        });
        Ok(OrderResult {
            order_id: format!("order-{}", self.orders.lock().unwrap().len()),
            client_order_id: order.client_order_id.clone(),
        })
    }

    async fn get_last_closed_position(&self, _: &str) -> Result<Option<ClosedPosition>> {
        Ok(*self.last_closed.lock().unwrap())
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: at(i as i64 * 900),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
            turnover: close * 10.0,
        })
        .collect()
}

/// 200 steadily rising closes: uptrend, price well inside the bands.
fn rising() -> Vec<f64> {
    (0..200).map(|i| 100.0 + i as f64).collect()
}

/// 200 steadily falling closes: downtrend.
fn falling() -> Vec<f64> {
    (0..200).map(|i| 400.0 - i as f64).collect()
}

fn config() -> TraderConfig {
    TraderConfig {
        cooldown_secs: 120,
        tick_secs: 60,
        restore_cooldown_from_exchange: false,
        ..TraderConfig::default()
    }
}

fn trader(exchange: &Arc<ScriptedExchange>, cfg: TraderConfig) -> Trader {
    Trader::new(exchange.clone(), SYMBOL, 0.03, cfg).unwrap()
}

#[tokio::test]
async fn uptrend_with_price_below_lower_band_enters_long() {
    // Reference price far below the lower band confirms the buy.
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    let mut trader = trader(&exchange, config());

    let outcome = trader.tick(at(0)).await.unwrap();

    let IterationOutcome::Entered { side, order, levels } = outcome else {
        panic!("expected an entry, got {outcome:?}");
    };
    assert_eq!(side, PositionSide::Long);
    assert!(levels.stop_price < 50.0 && 50.0 < levels.target_price);

    let orders = exchange.orders();
    assert_eq!(orders.len(), 1);
    let placed = &orders[0];
    assert_eq!(placed.side, OrderSide::Buy);
    assert_eq!(placed.quantity, 0.03);
    assert_eq!(placed.leverage, 10);
    assert_eq!(placed.take_profit, Some(52.0));
    assert_eq!(placed.stop_loss, None);
    assert_eq!(order.client_order_id, placed.client_order_id);
    assert!(!placed.client_order_id.is_empty());
}

#[tokio::test]
async fn downtrend_with_price_above_upper_band_enters_short() {
    let exchange = ScriptedExchange::new(&falling(), 1000.0);
    let cfg = TraderConfig { attach_stop_loss: true, ..config() };
    let mut trader = trader(&exchange, cfg);

    let outcome = trader.tick(at(0)).await.unwrap();

    assert!(matches!(outcome, IterationOutcome::Entered { side: PositionSide::Short, .. }));
    let placed = &exchange.orders()[0];
    assert_eq!(placed.side, OrderSide::Sell);
    assert_eq!(placed.stop_loss, Some(1020.0));
    assert_eq!(placed.take_profit, Some(960.0));
}

#[tokio::test]
async fn no_confirmation_means_no_order() {
    let closes = rising();
    let last = *closes.last().unwrap();
    let exchange = ScriptedExchange::new(&closes, last);
    let mut trader = trader(&exchange, config());

    let outcome = trader.tick(at(0)).await.unwrap();

    assert!(matches!(outcome, IterationOutcome::NoSignal { .. }));
    assert!(exchange.orders().is_empty());
}

#[tokio::test]
async fn never_opens_a_second_position() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    let mut trader = trader(&exchange, config());

    assert!(matches!(trader.tick(at(0)).await, Some(IterationOutcome::Entered { .. })));
    let second = trader.tick(at(60)).await.unwrap();

    assert_eq!(second, IterationOutcome::Holding { side: PositionSide::Long });
    assert_eq!(exchange.orders().len(), 1);
}

#[tokio::test]
async fn reversal_closes_position_and_waits_out_cooldown() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    exchange.open(PositionSide::Short);
    let mut trader = trader(&exchange, config());

    // Uptrend against a short: close, no entry in the same iteration.
    let outcome = trader.tick(at(0)).await.unwrap();
    assert_eq!(
        outcome,
        IterationOutcome::Closed { side: PositionSide::Short, cooldown_until: at(120) }
    );
    assert_eq!(exchange.closes.load(Ordering::SeqCst), 1);
    assert!(exchange.orders().is_empty());
    assert_eq!(trader.lifecycle().last_closed_at(), Some(at(0)));

    // Flat and signalling, but still cooling down.
    let outcome = trader.tick(at(60)).await.unwrap();
    assert_eq!(outcome, IterationOutcome::CoolingDown { until: at(120) });
    assert!(exchange.orders().is_empty());

    // Cooldown elapsed: entry proceeds.
    let outcome = trader.tick(at(120)).await.unwrap();
    assert!(matches!(outcome, IterationOutcome::Entered { side: PositionSide::Long, .. }));
    assert_eq!(exchange.orders().len(), 1);
}

#[tokio::test]
async fn scheduler_sleeps_through_cooldown_after_close() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    exchange.open(PositionSide::Short);
    let cfg = TraderConfig { cooldown_secs: 1800, ..config() };
    let mut trader = trader(&exchange, cfg);

    let outcome = trader.tick(at(0)).await;
    assert_eq!(trader.next_wake(at(0), outcome.as_ref()), at(1800));

    let holding = IterationOutcome::Holding { side: PositionSide::Long };
    assert_eq!(trader.next_wake(at(0), Some(&holding)), at(60));
    assert_eq!(trader.next_wake(at(0), None), at(60));
}

#[tokio::test]
async fn oversized_cooldown_is_rejected_at_startup() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    let cfg = TraderConfig { cooldown_secs: 10_000_000_000_000, ..config() };

    let err = Trader::new(exchange.clone(), SYMBOL, 0.03, cfg).err().unwrap();

    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn query_failure_aborts_without_trading() {
    let exchange = ScriptedExchange::new(&falling(), 1000.0);
    exchange.open(PositionSide::Long);
    exchange.fail_query.store(true, Ordering::SeqCst);
    let mut trader = trader(&exchange, config());

    assert_eq!(trader.tick(at(0)).await, None);
    assert_eq!(exchange.closes.load(Ordering::SeqCst), 0);
    assert!(exchange.orders().is_empty());
    assert_eq!(trader.lifecycle().last_closed_at(), None);
}

#[tokio::test]
async fn close_failure_aborts_and_leaves_cooldown_unset() {
    let exchange = ScriptedExchange::new(&falling(), 1000.0);
    exchange.open(PositionSide::Long);
    exchange.fail_close.store(true, Ordering::SeqCst);
    let mut trader = trader(&exchange, config());

    assert_eq!(trader.tick(at(0)).await, None);
    assert!(exchange.orders().is_empty());
    assert_eq!(trader.lifecycle().last_closed_at(), None);

    // Next iteration retries the close once the exchange recovers.
    exchange.fail_close.store(false, Ordering::SeqCst);
    let outcome = trader.tick(at(60)).await.unwrap();
    assert!(matches!(outcome, IterationOutcome::Closed { side: PositionSide::Long, .. }));
}

#[tokio::test]
async fn order_failure_is_contained_to_the_iteration() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    exchange.fail_order.store(true, Ordering::SeqCst);
    let mut trader = trader(&exchange, config());

    assert_eq!(trader.tick(at(0)).await, None);
    assert!(trader.lifecycle().entry_allowed(at(0)));

    exchange.fail_order.store(false, Ordering::SeqCst);
    assert!(matches!(trader.tick(at(60)).await, Some(IterationOutcome::Entered { .. })));
}

#[tokio::test]
async fn missing_market_data_skips_before_position_query() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    exchange.fail_candles.store(true, Ordering::SeqCst);
    let mut trader = trader(&exchange, config());

    assert_eq!(trader.tick(at(0)).await, None);
    assert_eq!(exchange.position_queries.load(Ordering::SeqCst), 0);
    assert!(exchange.orders().is_empty());
}

#[tokio::test]
async fn empty_candle_window_is_data_unavailable() {
    let exchange = ScriptedExchange::new(&[], 50.0);
    let mut trader = trader(&exchange, config());

    assert_eq!(trader.tick(at(0)).await, None);
    assert_eq!(exchange.position_queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dual_timeframe_fetches_both_intervals() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    let mut trader = trader(&exchange, config());

    trader.tick(at(0)).await;

    let calls = exchange.candle_calls.lock().unwrap().clone();
    assert_eq!(calls.get(&Interval::M15), Some(&1));
    assert_eq!(calls.get(&Interval::H1), Some(&1));
}

#[tokio::test]
async fn single_timeframe_fetches_candles_once() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    let cfg = TraderConfig {
        trend_interval: Interval::M15,
        confirmation_interval: Interval::M15,
        ..config()
    };
    let mut trader = trader(&exchange, cfg);

    let outcome = trader.tick(at(0)).await;

    assert!(matches!(outcome, Some(IterationOutcome::Entered { .. })));
    assert_eq!(exchange.candle_calls(), 1);
}

#[tokio::test]
async fn run_iterates_until_shutdown() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    let trader = trader(&exchange, config());
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(trader.run(shutdown.clone()));

    // The first iteration runs immediately.
    for _ in 0..200 {
        if !exchange.orders().is_empty() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(exchange.orders().len(), 1);

    shutdown.cancel();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("trader did not stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn restored_cooldown_blocks_first_entry() {
    let exchange = ScriptedExchange::new(&rising(), 50.0);
    *exchange.last_closed.lock().unwrap() = Some(ClosedPosition {
        updated_at: Utc::now() - Duration::seconds(10),
    });
    let cfg = TraderConfig { restore_cooldown_from_exchange: true, ..config() };
    let trader = trader(&exchange, cfg);
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(trader.run(shutdown.clone()));
    for _ in 0..200 {
        if exchange.position_queries.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    shutdown.cancel();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("trader did not stop on shutdown")
        .unwrap();

    assert!(exchange.position_queries.load(Ordering::SeqCst) >= 1);
    assert!(exchange.orders().is_empty());
}
