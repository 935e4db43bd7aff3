use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, info};

use common::{
    BybitEnvironment, Candle, ClosedPosition, Error, ExchangeClient, Interval, OrderRequest,
    OrderResult, Position, PositionSide, Result,
};

/// USDT-margined perpetuals.
const CATEGORY: &str = "linear";
const RECV_WINDOW_MS: u64 = 5000;
/// Bybit retCode for "leverage not modified".
const LEVERAGE_NOT_MODIFIED: i64 = 110043;

struct Credentials {
    api_key: String,
    secret: String,
}

/// REST client for Bybit's v5 unified API. Used for market data, order
/// placement and position queries.
pub struct BybitClient {
    base_url: String,
    credentials: Option<Credentials>,
    http: Client,
}

impl BybitClient {
    pub fn new(
        env: BybitEnvironment,
        api_key: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self> {
        let mut client = Self::public(env)?;
        client.credentials = Some(Credentials {
            api_key: api_key.into(),
            secret: secret.into(),
        });
        Ok(client)
    }

    /// A client without credentials: market data endpoints only.
    pub fn public(env: BybitEnvironment) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: env.base_url().to_string(),
            credentials: None,
            http,
        })
    }

    /// Point the client at another host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::Config("Bybit credentials required for private endpoints".into()))
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        let url = format!("{}{path}?{query}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        parse_envelope(&body)
    }

    async fn signed_get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        let creds = self.credentials()?;
        let ts = Self::timestamp_ms();
        let signature = sign(&creds.secret, ts, &creds.api_key, RECV_WINDOW_MS, query);
        let url = format!("{}{path}?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .header("X-BAPI-API-KEY", &creds.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", signature)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        parse_envelope(&body)
    }

    async fn signed_post(&self, path: &str, payload: &Value) -> Result<String> {
        let creds = self.credentials()?;
        let ts = Self::timestamp_ms();
        let body = payload.to_string();
        let signature = sign(&creds.secret, ts, &creds.api_key, RECV_WINDOW_MS, &body);
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("X-BAPI-API-KEY", &creds.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let payload = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        let body = self.signed_post("/v5/position/set-leverage", &payload).await?;
        match parse_envelope::<Value>(&body) {
            Ok(_) => {
                info!(%symbol, leverage, "Leverage set");
                Ok(())
            }
            Err(Error::Exchange(msg)) if ret_code(&body) == Some(LEVERAGE_NOT_MODIFIED) => {
                debug!(%symbol, leverage, %msg, "Leverage already set");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_market(&self, payload: Value) -> Result<OrderResult> {
        let body = self.signed_post("/v5/order/create", &payload).await?;
        let resp: OrderCreateResult = parse_envelope(&body)?;
        Ok(OrderResult {
            order_id: resp.order_id,
            client_order_id: resp.order_link_id,
        })
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn fetch_candles(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        let query = format!("category={CATEGORY}&symbol={symbol}&interval={interval}&limit={limit}");
        let result: KlineResult = self
            .public_get("/v5/market/kline", &query)
            .await
            .map_err(|e| e.into_data_unavailable())?;
        result
            .list
            .iter()
            .map(|row| parse_kline_row(row))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.into_data_unavailable())
    }

    async fn fetch_reference_price(&self, symbol: &str) -> Result<f64> {
        let query = format!("category={CATEGORY}&symbol={symbol}");
        let result: TickerResult = self
            .public_get("/v5/market/tickers", &query)
            .await
            .map_err(|e| e.into_data_unavailable())?;
        let ticker = result
            .list
            .first()
            .ok_or_else(|| Error::DataUnavailable(format!("no ticker for {symbol}")))?;
        parse_num(&ticker.last_price, "lastPrice").map_err(|e| e.into_data_unavailable())
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Option<Position>> {
        let query = format!("category={CATEGORY}&symbol={symbol}");
        let result: PositionListResult = self
            .signed_get("/v5/position/list", &query)
            .await
            .map_err(|e| e.into_query_failed())?;

        let mut open = Vec::new();
        for row in &result.list {
            if let Some(p) = row.to_position().map_err(|e| e.into_query_failed())? {
                open.push(p);
            }
        }
        if open.len() > 1 {
            return Err(Error::QueryFailed(format!(
                "{} open positions on {symbol}; expected at most one",
                open.len()
            )));
        }
        Ok(open.pop())
    }

    async fn close_position(&self, position: &Position) -> Result<()> {
        let side = position.side.entry_order_side().opposite();
        debug!(symbol = %position.symbol, %side, size = position.size, "Submitting reduce-only close");
        let payload = json!({
            "category": CATEGORY,
            "symbol": position.symbol,
            "side": side.to_string(),
            "orderType": "Market",
            "qty": fmt_num(position.size),
            "reduceOnly": true,
        });
        self.submit_market(payload)
            .await
            .map(|_| ())
            .map_err(|e| e.into_execution_failed())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        self.set_leverage(&order.symbol, order.leverage)
            .await
            .map_err(|e| e.into_execution_failed())?;

        let mut payload = json!({
            "category": CATEGORY,
            "symbol": order.symbol,
            "side": order.side.to_string(),
            "orderType": "Market",
            "qty": fmt_num(order.quantity),
            "orderLinkId": order.client_order_id,
        });
        if let Some(tp) = order.take_profit {
            payload["takeProfit"] = Value::String(fmt_num(tp));
        }
        if let Some(sl) = order.stop_loss {
            payload["stopLoss"] = Value::String(fmt_num(sl));
        }

        debug!(symbol = %order.symbol, side = %order.side, "Submitting order to Bybit");
        self.submit_market(payload)
            .await
            .map_err(|e| e.into_execution_failed())
    }

    async fn get_last_closed_position(&self, symbol: &str) -> Result<Option<ClosedPosition>> {
        let query = format!("category={CATEGORY}&symbol={symbol}&limit=1");
        let result: ClosedPnlResult = self
            .signed_get("/v5/position/closed-pnl", &query)
            .await
            .map_err(|e| e.into_query_failed())?;
        match result.list.first() {
            Some(row) => Ok(Some(ClosedPosition {
                updated_at: parse_millis(&row.updated_time).map_err(|e| e.into_query_failed())?,
            })),
            None => Ok(None),
        }
    }
}

// ─── Signing and parsing ─────────────────────────────────────────────────────

/// v5 signature: hex HMAC-SHA256 over `timestamp + api_key + recv_window + payload`,
/// where payload is the query string (GET) or the JSON body (POST).
fn sign(secret: &str, timestamp_ms: u64, api_key: &str, recv_window: u64, payload: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{timestamp_ms}{api_key}{recv_window}{payload}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T> {
    let env: Envelope<Value> = serde_json::from_str(body)?;
    if env.ret_code != 0 {
        return Err(Error::Exchange(format!("retCode {}: {}", env.ret_code, env.ret_msg)));
    }
    let result = env
        .result
        .ok_or_else(|| Error::Exchange("response has no result".into()))?;
    Ok(serde_json::from_value(result)?)
}

fn ret_code(body: &str) -> Option<i64> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("retCode")?
        .as_i64()
}

fn parse_num(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| Error::Exchange(format!("{field} is not a number: '{raw}'")))
}

fn parse_millis(raw: &str) -> Result<DateTime<Utc>> {
    let ms: i64 = raw
        .parse()
        .map_err(|_| Error::Exchange(format!("bad timestamp '{raw}'")))?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Exchange(format!("timestamp out of range: {ms}")))
}

/// Kline rows are `[startTime, open, high, low, close, volume, turnover]`, all strings.
fn parse_kline_row(row: &[String]) -> Result<Candle> {
    if row.len() < 7 {
        return Err(Error::Exchange(format!("kline row has {} fields, expected 7", row.len())));
    }
    Ok(Candle {
        timestamp: parse_millis(&row[0])?,
        open: parse_num(&row[1], "open")?,
        high: parse_num(&row[2], "high")?,
        low: parse_num(&row[3], "low")?,
        close: parse_num(&row[4], "close")?,
        volume: parse_num(&row[5], "volume")?,
        turnover: parse_num(&row[6], "turnover")?,
    })
}

/// Decimal string without exponent or trailing zeros.
fn fmt_num(value: f64) -> String {
    let s = format!("{value:.8}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct KlineResult {
    list: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct TickerResult {
    list: Vec<Ticker>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    last_price: String,
}

#[derive(Deserialize)]
struct PositionListResult {
    list: Vec<PositionRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    symbol: String,
    side: String,
    size: String,
    #[serde(default)]
    avg_price: String,
    created_time: String,
    updated_time: String,
}

impl PositionRow {
    /// `None` for the empty placeholder row Bybit returns when flat.
    fn to_position(&self) -> Result<Option<Position>> {
        let size = parse_num(&self.size, "size")?;
        let side = match self.side.as_str() {
            "Buy" => PositionSide::Long,
            "Sell" => PositionSide::Short,
            _ => return Ok(None),
        };
        if size <= 0.0 {
            return Ok(None);
        }
        let entry_price = self.avg_price.parse::<f64>().ok().filter(|p| *p > 0.0);
        Ok(Some(Position {
            symbol: self.symbol.clone(),
            side,
            size,
            entry_price,
            opened_at: parse_millis(&self.created_time)?,
            updated_at: parse_millis(&self.updated_time)?,
        }))
    }
}

#[derive(Deserialize)]
struct ClosedPnlResult {
    list: Vec<ClosedPnlRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosedPnlRow {
    updated_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreateResult {
    order_id: String,
    order_link_id: String,
}
