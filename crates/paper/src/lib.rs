use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Candle, ClosedPosition, Error, ExchangeClient, Interval, OrderRequest, OrderResult,
    OrderSide, Position, PositionSide, Result,
};

/// Protective exit levels attached to a paper entry.
#[derive(Debug, Clone, Copy, Default)]
struct Brackets {
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
}

impl Brackets {
    /// The level crossed at `price`, if any. The stop wins when both are.
    fn triggered(&self, side: PositionSide, price: f64) -> Option<(f64, &'static str)> {
        let (stop_hit, target_hit) = match side {
            PositionSide::Long => (
                self.stop_loss.is_some_and(|s| price <= s),
                self.take_profit.is_some_and(|t| price >= t),
            ),
            PositionSide::Short => (
                self.stop_loss.is_some_and(|s| price >= s),
                self.take_profit.is_some_and(|t| price <= t),
            ),
        };
        if stop_hit {
            self.stop_loss.map(|s| (s, "stop loss"))
        } else if target_hit {
            self.take_profit.map(|t| (t, "take profit"))
        } else {
            None
        }
    }
}

/// Simulated exchange for paper trading.
///
/// Market data comes from an optional live feed (usually a public Bybit
/// client) or from candles and prices pushed in by the caller. Orders fill
/// immediately at the reference price with configurable slippage and never
/// leave the process. Attached take-profit and stop-loss levels are checked
/// whenever a new price is seen and close the position at the level.
pub struct PaperClient {
    feed: Option<Arc<dyn ExchangeClient>>,
    /// Latest known price per symbol.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    candles: Arc<RwLock<HashMap<(String, Interval), Vec<Candle>>>>,
    /// At most one simulated position per symbol.
    positions: Arc<RwLock<HashMap<String, (Position, Brackets)>>>,
    last_closed: Arc<RwLock<HashMap<String, ClosedPosition>>>,
    realized_pnl: Arc<RwLock<f64>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps, "PaperClient initialized");
        Self {
            feed: None,
            prices: Arc::new(RwLock::new(HashMap::new())),
            candles: Arc::new(RwLock::new(HashMap::new())),
            positions: Arc::new(RwLock::new(HashMap::new())),
            last_closed: Arc::new(RwLock::new(HashMap::new())),
            realized_pnl: Arc::new(RwLock::new(0.0)),
            slippage_bps,
        }
    }

    /// Read candles and prices from `feed`; keep positions local.
    pub fn with_market_feed(feed: Arc<dyn ExchangeClient>, slippage_bps: f64) -> Self {
        Self {
            feed: Some(feed),
            ..Self::new(slippage_bps)
        }
    }

    /// Record a new price and fire any take-profit or stop-loss it crosses.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
        self.check_brackets(symbol, price).await;
    }

    pub async fn set_candles(&self, symbol: &str, interval: Interval, candles: Vec<Candle>) {
        self.candles
            .write()
            .await
            .insert((symbol.to_string(), interval), candles);
    }

    /// Sum of simulated PnL over every closed position, in quote currency.
    pub async fn realized_pnl(&self) -> f64 {
        *self.realized_pnl.read().await
    }

    async fn check_brackets(&self, symbol: &str, price: f64) {
        let mut positions = self.positions.write().await;
        let Some((position, brackets)) = positions.get(symbol) else {
            return;
        };
        let Some((level, reason)) = brackets.triggered(position.side, price) else {
            return;
        };
        let Some((position, _)) = positions.remove(symbol) else {
            return;
        };
        drop(positions);
        self.record_close(&position, level, reason).await;
    }

    async fn record_close(&self, position: &Position, exit_price: f64, reason: &str) {
        let entry_price = position.entry_price.unwrap_or(exit_price);
        let pnl = match position.side {
            PositionSide::Long => (exit_price - entry_price) * position.size,
            PositionSide::Short => (entry_price - exit_price) * position.size,
        };

        self.last_closed
            .write()
            .await
            .insert(position.symbol.clone(), ClosedPosition { updated_at: Utc::now() });
        *self.realized_pnl.write().await += pnl;

        info!(
            symbol = %position.symbol,
            side = %position.side,
            size = position.size,
            entry = entry_price,
            exit = exit_price,
            pnl,
            reason,
            "Paper position closed"
        );
    }

    fn fill_price(&self, mid: f64, side: OrderSide) -> f64 {
        // Buys pay more, sells receive less
        match side {
            OrderSide::Buy => mid * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    async fn mid_price(&self, symbol: &str) -> Result<f64> {
        if let Some(feed) = &self.feed {
            let price = feed.fetch_reference_price(symbol).await?;
            self.update_price(symbol, price).await;
            return Ok(price);
        }
        self.prices.read().await.get(symbol).copied().ok_or_else(|| {
            Error::DataUnavailable(format!(
                "PaperClient has no price for '{symbol}'. Call update_price or attach a market feed."
            ))
        })
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn fetch_candles(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        if let Some(feed) = &self.feed {
            return feed.fetch_candles(symbol, interval, limit).await;
        }
        let candles = self.candles.read().await;
        let series = candles
            .get(&(symbol.to_string(), interval))
            .ok_or_else(|| Error::DataUnavailable(format!("no {interval} candles for {symbol}")))?;
        let skip = series.len().saturating_sub(limit);
        Ok(series[skip..].to_vec())
    }

    async fn fetch_reference_price(&self, symbol: &str) -> Result<f64> {
        self.mid_price(symbol).await
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Option<Position>> {
        Ok(self
            .positions
            .read()
            .await
            .get(symbol)
            .map(|(position, _)| position.clone()))
    }

    async fn close_position(&self, position: &Position) -> Result<()> {
        // Pricing first: a new price may already have closed the position.
        let mid = self
            .mid_price(&position.symbol)
            .await
            .map_err(|e| e.into_execution_failed())?;
        let Some((open, _)) = self.positions.write().await.remove(&position.symbol) else {
            return Err(Error::ExecutionFailed(format!(
                "no open paper position on {}",
                position.symbol
            )));
        };

        let exit_price = self.fill_price(mid, open.side.entry_order_side().opposite());
        self.record_close(&open, exit_price, "closed").await;
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        if self.positions.read().await.contains_key(&order.symbol) {
            return Err(Error::ExecutionFailed(format!(
                "paper position already open on {}",
                order.symbol
            )));
        }

        let mid = self
            .mid_price(&order.symbol)
            .await
            .map_err(|e| e.into_execution_failed())?;
        let fill_price = self.fill_price(mid, order.side);
        let side = match order.side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mid,
            fill = fill_price,
            qty = order.quantity,
            take_profit = ?order.take_profit,
            stop_loss = ?order.stop_loss,
            "Paper fill simulated"
        );

        let now = Utc::now();
        let brackets = Brackets {
            take_profit: order.take_profit,
            stop_loss: order.stop_loss,
        };
        self.positions.write().await.insert(
            order.symbol.clone(),
            (
                Position {
                    symbol: order.symbol.clone(),
                    side,
                    size: order.quantity,
                    entry_price: Some(fill_price),
                    opened_at: now,
                    updated_at: now,
                },
                brackets,
            ),
        );

        Ok(OrderResult {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
            client_order_id: order.client_order_id.clone(),
        })
    }

    async fn get_last_closed_position(&self, symbol: &str) -> Result<Option<ClosedPosition>> {
        Ok(self.last_closed.read().await.get(symbol).copied())
    }
}
