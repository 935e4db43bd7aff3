use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use common::{Error, ExchangeClient, Position, PositionSide, Result, Trend};

/// The only state carried from one iteration to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownState {
    last_closed_at: Option<DateTime<Utc>>,
}

impl CooldownState {
    pub fn last_closed_at(&self) -> Option<DateTime<Utc>> {
        self.last_closed_at
    }

    /// Record a close. Never moves the timestamp backwards.
    pub fn record_close(&mut self, at: DateTime<Utc>) {
        match self.last_closed_at {
            Some(prev) if prev >= at => {}
            _ => self.last_closed_at = Some(at),
        }
    }
}

/// Where the position lifecycle stands for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Flat,
    Open(PositionSide),
    Cooldown { until: DateTime<Utc> },
}

/// What the lifecycle manager did in response to the current trend.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// No position is open; entry may be evaluated (subject to cooldown).
    NoPosition,
    /// A position is open and agrees with the trend. Nothing to do.
    Holding(Position),
    /// A position against the trend was closed; a cooldown has started.
    Closed {
        side: PositionSide,
        size: f64,
        cooldown_until: DateTime<Utc>,
    },
}

/// Owns the cooldown and drives open → close → cooldown → flat.
///
/// Position state is never remembered between iterations: every reaction
/// starts from a fresh exchange query, and any query or close failure is
/// returned to the caller without touching the cooldown.
#[derive(Debug, Clone)]
pub struct PositionLifecycle {
    cooldown: Duration,
    state: CooldownState,
}

impl PositionLifecycle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: CooldownState::default(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_closed_at(&self) -> Option<DateTime<Utc>> {
        self.state.last_closed_at()
    }

    /// Seed the cooldown from an earlier close (e.g. after a restart).
    pub fn record_close(&mut self, at: DateTime<Utc>) {
        self.state.record_close(at);
    }

    /// When the current cooldown ends, if a close has ever been recorded.
    /// Saturates at the latest representable instant.
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.state.last_closed_at().map(|t| {
            t.checked_add_signed(self.cooldown)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// True once `now >= lastClosedAt + cooldown`, or if nothing was ever closed.
    pub fn entry_allowed(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until().map_or(true, |until| now >= until)
    }

    /// Classify the lifecycle from a fresh position snapshot.
    pub fn state(&self, position: Option<&Position>, now: DateTime<Utc>) -> LifecycleState {
        match (position, self.cooldown_until()) {
            (Some(p), _) => LifecycleState::Open(p.side),
            (None, Some(until)) if now < until => LifecycleState::Cooldown { until },
            (None, _) => LifecycleState::Flat,
        }
    }

    /// Query the open position and close it if `trend` contradicts its side.
    ///
    /// Errors leave the cooldown untouched; the caller must treat position
    /// state as unknown for this iteration.
    pub async fn react_to_trend(
        &mut self,
        client: &dyn ExchangeClient,
        symbol: &str,
        trend: Trend,
        now: DateTime<Utc>,
    ) -> Result<Reaction> {
        let position = client
            .get_open_position(symbol)
            .await
            .map_err(|e| e.into_query_failed())?;

        let Some(position) = position else {
            info!(%symbol, "No open position");
            return Ok(Reaction::NoPosition);
        };

        if !trend.contradicts(position.side) {
            info!(%symbol, side = %position.side, %trend, "Position agrees with trend, holding");
            return Ok(Reaction::Holding(position));
        }

        // Must not fail once the close has gone through.
        let cooldown_until = now.checked_add_signed(self.cooldown).ok_or_else(|| {
            Error::Config(format!("cooldown {} overflows the clock from {now}", self.cooldown))
        })?;

        info!(
            %symbol,
            side = %position.side,
            size = position.size,
            %trend,
            "Trend reversed against open position, closing"
        );
        if let Err(e) = client.close_position(&position).await {
            warn!(%symbol, error = %e, "Close failed; position state unknown this iteration");
            return Err(e.into_execution_failed());
        }

        self.state.record_close(now);
        info!(%symbol, until = %cooldown_until, "Position closed, cooldown started");

        Ok(Reaction::Closed {
            side: position.side,
            size: position.size,
            cooldown_until,
        })
    }

    /// Seed the cooldown from the exchange's most recent closed position.
    /// A failed lookup is logged and leaves the cooldown empty.
    pub async fn restore_from_exchange(&mut self, client: &dyn ExchangeClient, symbol: &str) {
        match client.get_last_closed_position(symbol).await {
            Ok(Some(closed)) => {
                self.state.record_close(closed.updated_at);
                info!(
                    %symbol,
                    last_closed_at = %closed.updated_at,
                    "Cooldown restored from exchange"
                );
            }
            Ok(None) => info!(%symbol, "No closed positions on record"),
            Err(e) => warn!(%symbol, error = %e, "Could not restore cooldown from exchange"),
        }
    }
}
