use crate::{Error, Result, TradingMode};

/// Which Bybit deployment the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BybitEnvironment {
    Mainnet,
    Testnet,
    /// Bybit's demo-trading environment: real market data, simulated funds.
    Demo,
}

impl BybitEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            BybitEnvironment::Mainnet => "https://api.bybit.com",
            BybitEnvironment::Testnet => "https://api-testnet.bybit.com",
            BybitEnvironment::Demo => "https://api-demo.bybit.com",
        }
    }
}

/// Process-level configuration loaded from environment variables at startup.
/// Strategy and scheduling parameters live in the TOML file at
/// `bot_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials. Required in live mode only.
    pub bybit_api_key: Option<String>,
    pub bybit_secret: Option<String>,
    pub bybit_env: BybitEnvironment,

    // Trading
    pub trading_mode: TradingMode,
    pub symbol: String,
    pub quantity: f64,
    pub paper_slippage_bps: f64,

    // Bot config file path
    pub bot_config_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let trading_mode = match get("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let bybit_env = match get("BYBIT_ENV")
            .unwrap_or_else(|| "demo".to_string())
            .to_lowercase()
            .as_str()
        {
            "mainnet" => BybitEnvironment::Mainnet,
            "testnet" => BybitEnvironment::Testnet,
            "demo" => BybitEnvironment::Demo,
            other => {
                return Err(Error::Config(format!(
                    "BYBIT_ENV must be 'mainnet', 'testnet' or 'demo', got: '{other}'"
                )))
            }
        };

        let bybit_api_key = get("BYBIT_API_KEY");
        let bybit_secret = get("BYBIT_API_SECRET");
        if trading_mode == TradingMode::Live && (bybit_api_key.is_none() || bybit_secret.is_none()) {
            return Err(Error::Config(
                "BYBIT_API_KEY and BYBIT_API_SECRET must be set in live mode. Check your .env file."
                    .into(),
            ));
        }

        let quantity = parse_or(get("TRADE_QUANTITY"), "TRADE_QUANTITY", 0.03)?;
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(Error::Config(format!("TRADE_QUANTITY must be positive, got {quantity}")));
        }

        let paper_slippage_bps = parse_or(get("PAPER_SLIPPAGE_BPS"), "PAPER_SLIPPAGE_BPS", 10.0)?;
        if !(paper_slippage_bps.is_finite() && paper_slippage_bps >= 0.0) {
            return Err(Error::Config(format!(
                "PAPER_SLIPPAGE_BPS must be non-negative, got {paper_slippage_bps}"
            )));
        }

        Ok(Config {
            bybit_api_key,
            bybit_secret,
            bybit_env,
            trading_mode,
            symbol: get("TRADING_SYMBOL")
                .unwrap_or_else(|| "BTCUSDT".to_string())
                .to_uppercase(),
            quantity,
            paper_slippage_bps,
            bot_config_path: get("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/trendbot.toml".to_string()),
        })
    }
}

fn parse_or(value: Option<String>, key: &str, default: f64) -> Result<f64> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| Error::Config(format!("{key} is not a number: '{raw}'"))),
    }
}
