use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::{
    CandleSeries, Error, ExchangeClient, Interval, OrderRequest, OrderResult, PositionSide,
    Result, RiskLevels, Signal, Trend,
};
use risk::{size_entry, RiskSizer};
use strategy::{IndicatorSnapshot, Strategy, TrendReading, Trigger};

use crate::config::TraderConfig;
use crate::lifecycle::{PositionLifecycle, Reaction};

/// What one iteration of the decision loop decided.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// An open position contradicted the trend and was closed.
    Closed {
        side: PositionSide,
        cooldown_until: DateTime<Utc>,
    },
    /// An open position agrees with the trend; entry was not evaluated.
    Holding { side: PositionSide },
    /// Flat, but the re-entry cooldown has not expired.
    CoolingDown { until: DateTime<Utc> },
    /// Flat and eligible, but no confirmation signal.
    NoSignal { trend: Trend },
    /// An entry order was accepted.
    Entered {
        side: PositionSide,
        order: OrderResult,
        levels: RiskLevels,
    },
}

/// Diagnostics gathered while an iteration runs, logged if it fails.
#[derive(Debug, Default)]
struct IterationContext {
    trend: Option<TrendReading>,
    snapshot: Option<IndicatorSnapshot>,
    signal: Option<Signal>,
    triggers: Vec<Trigger>,
}

/// The decision loop for one symbol.
///
/// Holds no market or position state between iterations apart from the
/// lifecycle's cooldown; everything else is refetched and recomputed on
/// every tick.
pub struct Trader {
    client: Arc<dyn ExchangeClient>,
    symbol: String,
    quantity: f64,
    config: TraderConfig,
    strategy: Strategy,
    sizer: Box<dyn RiskSizer>,
    lifecycle: PositionLifecycle,
}

impl Trader {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        symbol: impl Into<String>,
        quantity: f64,
        config: TraderConfig,
    ) -> Result<Self> {
        config.validate()?;
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(Error::Config(format!("order quantity must be positive, got {quantity}")));
        }
        let strategy = Strategy::from_config(&config.strategy)?;
        let sizer = config.risk.build()?;
        let lifecycle = PositionLifecycle::new(config.cooldown());

        Ok(Self {
            client,
            symbol: symbol.into(),
            quantity,
            config,
            strategy,
            sizer,
            lifecycle,
        })
    }

    pub fn lifecycle(&self) -> &PositionLifecycle {
        &self.lifecycle
    }

    /// Run until `shutdown` is cancelled. The first iteration runs
    /// immediately; shutdown is honored between iterations only.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            symbol = %self.symbol,
            quantity = self.quantity,
            tick_secs = self.config.tick_secs,
            cooldown_secs = self.config.cooldown_secs,
            trend_interval = %self.config.trend_interval,
            confirmation_interval = %self.config.confirmation_interval,
            sizer = self.sizer.name(),
            "Trader started"
        );

        if self.config.restore_cooldown_from_exchange {
            self.lifecycle
                .restore_from_exchange(self.client.as_ref(), &self.symbol)
                .await;
        }

        let mut next_wake = Utc::now();
        loop {
            let wait = (next_wake - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, trader stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let now = Utc::now();
            let outcome = self.tick(now).await;
            next_wake = self.next_wake(now, outcome.as_ref());
            debug!(next_wake = %next_wake, "Next iteration scheduled");
        }
    }

    /// When the next iteration should run. After a reversal close the loop
    /// sleeps through the cooldown instead of ticking.
    pub fn next_wake(&self, now: DateTime<Utc>, outcome: Option<&IterationOutcome>) -> DateTime<Utc> {
        let next_tick = now
            .checked_add_signed(self.config.tick())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        match outcome {
            Some(IterationOutcome::Closed { cooldown_until, .. }) if *cooldown_until > next_tick => {
                info!(until = %cooldown_until, "Cooling down after close; next iteration at cooldown expiry");
                *cooldown_until
            }
            _ => next_tick,
        }
    }

    /// Run one iteration inside the failure boundary. Errors are logged with
    /// whatever context was gathered and swallowed; the next tick retries
    /// from scratch.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Option<IterationOutcome> {
        info!("-------------------- Bot Iteration --------------------");
        let mut ctx = IterationContext::default();

        match self.run_iteration(now, &mut ctx).await {
            Ok(outcome) => {
                log_outcome(&outcome);
                Some(outcome)
            }
            Err(e) => {
                let trend = ctx.trend.map(|r| r.trend);
                match e {
                    Error::DataUnavailable(_) => warn!(
                        error = %e,
                        ?trend,
                        "Iteration skipped: market data unavailable"
                    ),
                    _ => error!(
                        error = %e,
                        ?trend,
                        trend_reading = ?ctx.trend,
                        signal = ?ctx.signal,
                        triggers = ?ctx.triggers,
                        snapshot = ?ctx.snapshot,
                        "Iteration aborted"
                    ),
                }
                None
            }
        }
    }

    async fn run_iteration(
        &mut self,
        now: DateTime<Utc>,
        ctx: &mut IterationContext,
    ) -> Result<IterationOutcome> {
        let trend_candles = self.fetch_series(self.config.trend_interval).await?;
        let confirm_candles = if self.config.confirmation_interval == self.config.trend_interval {
            trend_candles.clone()
        } else {
            self.fetch_series(self.config.confirmation_interval).await?
        };

        let reading = self
            .strategy
            .trend
            .classify(&trend_candles.closes())
            .ok_or_else(|| Error::DataUnavailable("no closes to classify".into()))?;
        ctx.trend = Some(reading);
        info!(
            trend = %reading.trend,
            fast_ema = reading.fast_ema,
            slow_ema = reading.slow_ema,
            candles = trend_candles.len(),
            interval = %self.config.trend_interval,
            "Trend classified"
        );
        if !reading.warmed_up {
            warn!(
                candles = trend_candles.len(),
                slow_period = self.config.strategy.trend.slow_period,
                "Fewer candles than the slow trend period; trend confidence degraded"
            );
        }

        let reaction = self
            .lifecycle
            .react_to_trend(self.client.as_ref(), &self.symbol, reading.trend, now)
            .await?;
        match reaction {
            Reaction::Closed { side, cooldown_until, .. } => {
                return Ok(IterationOutcome::Closed { side, cooldown_until });
            }
            Reaction::Holding(position) => {
                return Ok(IterationOutcome::Holding { side: position.side });
            }
            Reaction::NoPosition => {}
        }

        if !self.lifecycle.entry_allowed(now) {
            // entry_allowed is only false after a recorded close
            let until = self.lifecycle.cooldown_until().unwrap_or(now);
            return Ok(IterationOutcome::CoolingDown { until });
        }

        let price = self
            .client
            .fetch_reference_price(&self.symbol)
            .await
            .map_err(|e| e.into_data_unavailable())?;

        let (snapshot, confirmation) =
            self.strategy
                .confirmation
                .evaluate(reading.trend, &confirm_candles.closes(), price);
        ctx.snapshot = Some(snapshot);
        ctx.signal = Some(confirmation.signal);
        ctx.triggers = confirmation.triggers.clone();
        info!(
            price,
            rsi = ?snapshot.rsi,
            bands = ?snapshot.bands,
            macd_prev = ?snapshot.macd_prev,
            macd_curr = ?snapshot.macd_curr,
            macd_histogram = ?snapshot.macd_curr.map(|p| p.histogram()),
            interval = %self.config.confirmation_interval,
            "Indicator snapshot"
        );

        let Some(side) = confirmation.signal.entry_side() else {
            return Ok(IterationOutcome::NoSignal { trend: reading.trend });
        };

        let levels = size_entry(self.sizer.as_ref(), confirm_candles.candles(), price, side)?;

        let mut order = OrderRequest::market(
            &self.symbol,
            side.entry_order_side(),
            self.quantity,
            price,
            self.config.leverage,
        );
        if self.config.attach_take_profit {
            order.take_profit = Some(round_to(levels.target_price, self.config.price_decimals));
        }
        if self.config.attach_stop_loss {
            order.stop_loss = Some(round_to(levels.stop_price, self.config.price_decimals));
        }

        info!(
            signal = %confirmation.signal,
            triggers = ?confirmation.triggers,
            side = %order.side,
            qty = order.quantity,
            price,
            take_profit = ?order.take_profit,
            stop_loss = ?order.stop_loss,
            client_order_id = %order.client_order_id,
            "Placing entry order"
        );
        // A failure here may be resubmitted next tick with a new client id.
        let result = self
            .client
            .place_order(&order)
            .await
            .map_err(|e| e.into_execution_failed())?;

        Ok(IterationOutcome::Entered { side, order: result, levels })
    }

    async fn fetch_series(&self, interval: Interval) -> Result<CandleSeries> {
        let candles = self
            .client
            .fetch_candles(&self.symbol, interval, self.config.candle_limit)
            .await
            .map_err(|e| e.into_data_unavailable())?;
        CandleSeries::new(candles)
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn log_outcome(outcome: &IterationOutcome) {
    match outcome {
        IterationOutcome::Closed { side, cooldown_until } => {
            info!(%side, until = %cooldown_until, "Position closed due to trend change; skipping entry")
        }
        IterationOutcome::Holding { side } => {
            info!(%side, "Position still open; skipping entry")
        }
        IterationOutcome::CoolingDown { until } => {
            info!(until = %until, "Cooldown active; skipping entry")
        }
        IterationOutcome::NoSignal { trend } => info!(%trend, "No trade signal generated"),
        IterationOutcome::Entered { side, order, .. } => info!(
            %side,
            order_id = %order.order_id,
            client_order_id = %order.client_order_id,
            "Order successfully placed"
        ),
    }
}
