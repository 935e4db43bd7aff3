use async_trait::async_trait;

use crate::{Candle, ClosedPosition, Interval, OrderRequest, OrderResult, Position, Result};

/// Abstraction over the exchange connection.
///
/// `BybitClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Implementations report failures with the error taxonomy the decision
/// loop acts on: `DataUnavailable` for market data, `QueryFailed` for
/// position queries, `ExecutionFailed` for orders and closes.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetch up to `limit` most recent candles. Order is not guaranteed.
    async fn fetch_candles(&self, symbol: &str, interval: Interval, limit: usize)
        -> Result<Vec<Candle>>;

    /// Latest tradable price, possibly newer than the last candle close.
    async fn fetch_reference_price(&self, symbol: &str) -> Result<f64>;

    /// The open position for `symbol`, if any.
    async fn get_open_position(&self, symbol: &str) -> Result<Option<Position>>;

    /// Close `position` in full at market.
    async fn close_position(&self, position: &Position) -> Result<()>;

    /// Submit an entry order.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult>;

    /// The most recently closed position for `symbol`, if any.
    async fn get_last_closed_position(&self, symbol: &str) -> Result<Option<ClosedPosition>>;
}
