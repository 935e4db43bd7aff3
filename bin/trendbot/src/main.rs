use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{Config, ExchangeClient, Result, TradingMode};
use engine::{BybitClient, Trader, TraderConfig};
use paper::PaperClient;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let trader = match build_trader() {
        Ok(trader) => trader,
        Err(e) => {
            error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    // ── Shutdown ─────────────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            ctrl_c.cancel();
        }
    });

    trader.run(shutdown).await;
    info!("TrendBot stopped");
}

fn build_trader() -> Result<Trader> {
    // ── Config ───────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    info!(
        mode = %cfg.trading_mode,
        env = ?cfg.bybit_env,
        symbol = %cfg.symbol,
        "TrendBot starting"
    );
    let trader_cfg = TraderConfig::load(&cfg.bot_config_path)?;

    // ── Exchange client (injected based on TRADING_MODE) ─────────────────────
    let client: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            let (Some(key), Some(secret)) = (cfg.bybit_api_key.clone(), cfg.bybit_secret.clone()) else {
                return Err(common::Error::Config(
                    "BYBIT_API_KEY and BYBIT_API_SECRET are required in live mode".into(),
                ));
            };
            info!("Live trading mode: using BybitClient");
            Arc::new(BybitClient::new(cfg.bybit_env, key, secret)?)
        }
        TradingMode::Paper => {
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode: using PaperClient");
            let feed = Arc::new(BybitClient::public(cfg.bybit_env)?);
            Arc::new(PaperClient::with_market_feed(feed, cfg.paper_slippage_bps))
        }
    };

    Trader::new(client, cfg.symbol, cfg.quantity, trader_cfg)
}
