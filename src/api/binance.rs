use super::retry::RetryPolicy;
use crate::config::BinanceCredentials;
use crate::execution::{ExecutionGateway, MarketData};
use crate::models::{Candle, Fill, FillResult, OrderSide};
use crate::{BotError, Result};
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const REQUESTS_PER_SECOND: u32 = 10;
const HTTP_TIMEOUT_SECS: u64 = 10;
const RECV_WINDOW_MS: u64 = 5000;
const RATE_LIMIT_CODE: i64 = -1003;
/// Quantity precision used when the exchange reports no LOT_SIZE step
const FALLBACK_QTY_DECIMALS: u32 = 3;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Trading rules for one symbol, from `exchangeInfo`
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRules {
    pub base_asset: String,
    pub quote_asset: String,
    /// LOT_SIZE step; `None` if the exchange did not report one
    pub step_size: Option<Decimal>,
}

/// Binance Spot REST client
///
/// Cloneable; all clones share the rate limiter and the symbol rules cache.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: BinanceCredentials,
    retry: RetryPolicy,
    rate_limiter: Arc<BinanceRateLimiter>,
    rules_cache: Arc<RwLock<HashMap<String, SymbolRules>>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    step_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    executed_qty: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    fills: Vec<OrderFill>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderFill {
    price: String,
    qty: String,
    commission: String,
    commission_asset: String,
}

/// Truncate a quantity to the exchange step size, never rounding up
pub fn sanitize_quantity(qty: Decimal, step_size: Option<Decimal>) -> Decimal {
    if qty <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    match step_size {
        Some(step) if step > Decimal::ZERO => match qty.checked_div(step) {
            Some(steps) => (steps.floor() * step).normalize(),
            None => Decimal::ZERO,
        },
        _ => qty
            .round_dp_with_strategy(FALLBACK_QTY_DECIMALS, RoundingStrategy::ToZero)
            .normalize(),
    }
}

/// Keep only candles closed at `now_ms`, then the most recent `count` of them
pub fn closed_window(candles: Vec<Candle>, now_ms: i64, count: usize) -> Vec<Candle> {
    let mut closed: Vec<Candle> = candles
        .into_iter()
        .filter(|c| c.is_closed_at(now_ms))
        .collect();

    if closed.len() > count {
        closed.drain(..closed.len() - count);
    }
    closed
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| BotError::Exchange(format!("Invalid {} '{}': {}", field, raw, e)))
}

fn parse_f64(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| BotError::Exchange(format!("Invalid {} '{}': {}", field, raw, e)))
}

fn kline_i64(row: &[Value], idx: usize) -> Result<i64> {
    row.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| BotError::Exchange(format!("Kline field {} is not an integer", idx)))
}

fn kline_f64(row: &[Value], idx: usize) -> Result<f64> {
    match row.get(idx) {
        Some(Value::String(s)) => parse_f64(s, "kline field"),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| BotError::Exchange(format!("Kline field {} out of range", idx))),
        _ => Err(BotError::Exchange(format!("Kline field {} missing", idx))),
    }
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
fn parse_kline(row: &[Value]) -> Result<Candle> {
    Ok(Candle {
        open_time: kline_i64(row, 0)?,
        open: kline_f64(row, 1)?,
        high: kline_f64(row, 2)?,
        low: kline_f64(row, 3)?,
        close: kline_f64(row, 4)?,
        volume: kline_f64(row, 5)?,
        close_time: kline_i64(row, 6)?,
    })
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

impl BinanceClient {
    pub fn new(
        credentials: BinanceCredentials,
        base_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            retry,
            rate_limiter,
            rules_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Test connectivity
    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.get_public("/api/v3/ping", &[]).await?;
        tracing::info!("Connected to Binance Spot API at {}", self.base_url);
        Ok(())
    }

    /// Send a request through the rate limiter and classify failures
    async fn send(&self, request: RequestBuilder, is_order: bool) -> Result<Response> {
        self.rate_limiter.until_ready().await;

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(classify_error(status, &body, is_order))
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.send(self.client.get(&url).query(params), false).await?;
        Ok(response.json().await?)
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params)?);
        let request = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key);
        let response = self.send(request, false).await?;
        Ok(response.json().await?)
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params)?);
        let request = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key);
        let response = self.send(request, true).await?;
        Ok(response.json().await?)
    }

    /// HMAC-SHA256 of the payload with the API secret, hex encoded
    fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| BotError::Config(format!("Unusable API secret: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, params: &[(&str, String)]) -> Result<String> {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            Utc::now().timestamp_millis()
        ));

        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        let params = [("symbol", symbol.to_string())];
        let params = &params;
        let ticker: TickerPrice = self
            .retry
            .run("ticker price", move || self.get_public("/api/v3/ticker/price", params))
            .await?;

        let price = parse_decimal(&ticker.price, "price")?;
        if price <= Decimal::ZERO {
            return Err(BotError::Exchange(format!(
                "Non-positive price {} for {}",
                price, symbol
            )));
        }
        Ok(price)
    }

    async fn free_balance(&self, asset: &str) -> Result<Decimal> {
        let account: AccountResponse = self
            .retry
            .run("account", move || self.get_signed("/api/v3/account", &[]))
            .await?;

        match account.balances.iter().find(|b| b.asset == asset) {
            Some(entry) => parse_decimal(&entry.free, "balance"),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Symbol rules, fetched once and cached
    pub async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        if let Some(rules) = self.rules_cache.read().await.get(symbol) {
            return Ok(rules.clone());
        }

        let params = [("symbol", symbol.to_string())];
        let params = &params;
        let info: ExchangeInfoResponse = self
            .retry
            .run("exchange info", move || self.get_public("/api/v3/exchangeInfo", params))
            .await?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| BotError::Exchange(format!("Symbol {} not listed", symbol)))?;

        let step_size = symbol_info
            .filters
            .iter()
            .find(|f| f.filter_type == "LOT_SIZE")
            .and_then(|f| f.step_size.as_deref())
            .map(|s| parse_decimal(s, "stepSize"))
            .transpose()?
            .filter(|step| *step > Decimal::ZERO);

        let rules = SymbolRules {
            base_asset: symbol_info.base_asset,
            quote_asset: symbol_info.quote_asset,
            step_size,
        };

        tracing::info!(
            "{} rules: base={}, quote={}, step={:?}",
            symbol,
            rules.base_asset,
            rules.quote_asset,
            rules.step_size
        );

        self.rules_cache
            .write()
            .await
            .insert(symbol.to_string(), rules.clone());
        Ok(rules)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<FillResult> {
        // Same client id on every retry so the exchange can drop duplicates
        let client_order_id = format!("ss-{}", uuid::Uuid::new_v4().simple());
        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("newOrderRespType", "FULL".to_string()),
            ("newClientOrderId", client_order_id),
        ];
        let params = &params;

        let response: OrderResponse = self
            .retry
            .run("market order", move || self.post_signed("/api/v3/order", params))
            .await?;

        tracing::info!(
            "Market {} executed: order={}, status={}, executedQty={}, fills={}",
            side.as_str(),
            response.order_id,
            response.status,
            response.executed_qty,
            response.fills.len()
        );

        let fills = response
            .fills
            .iter()
            .map(|f| {
                Ok(Fill {
                    price: parse_f64(&f.price, "fill price")?,
                    qty: parse_f64(&f.qty, "fill qty")?,
                    commission: parse_f64(&f.commission, "commission")?,
                    commission_asset: f.commission_asset.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FillResult {
            order_id: response.order_id,
            side,
            executed_qty: parse_f64(&response.executed_qty, "executedQty")?,
            fills,
        })
    }
}

fn classify_error(status: StatusCode, body: &str, is_order: bool) -> BotError {
    let api_error: Option<ApiErrorBody> = serde_json::from_str(body).ok();

    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 418
        || api_error.as_ref().map(|e| e.code) == Some(RATE_LIMIT_CODE);
    if throttled {
        return BotError::RateLimited(format!("{}: {}", status, body));
    }

    match api_error {
        Some(err) if is_order && status.is_client_error() => BotError::OrderRejected {
            code: err.code,
            msg: err.msg,
        },
        Some(err) => BotError::Exchange(format!("{} (code {}): {}", status, err.code, err.msg)),
        None => BotError::Exchange(format!("{}: {}", status, body)),
    }
}

fn unavailable(what: &str, symbol: &str, err: BotError) -> BotError {
    match err {
        BotError::DataUnavailable(_) => err,
        other => BotError::DataUnavailable(format!("{} for {}: {}", what, symbol, other)),
    }
}

impl MarketData for BinanceClient {
    async fn get_candles(&self, symbol: &str, interval: &str, count: usize) -> Result<Vec<Candle>> {
        // One extra row: the newest kline is usually still forming
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", (count + 1).to_string()),
        ];
        let params = &params;

        let rows: Vec<Vec<Value>> = self
            .retry
            .run("klines", move || self.get_public("/api/v3/klines", params))
            .await
            .map_err(|e| unavailable("klines", symbol, e))?;

        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| unavailable("klines", symbol, e))?;

        Ok(closed_window(candles, Utc::now().timestamp_millis(), count))
    }

    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let price = self
            .ticker_price(symbol)
            .await
            .map_err(|e| unavailable("price", symbol, e))?;
        Ok(to_f64(price))
    }
}

impl ExecutionGateway for BinanceClient {
    async fn get_balance(&self, asset: &str) -> Result<f64> {
        Ok(to_f64(self.free_balance(asset).await?))
    }

    async fn market_buy_using_available_quote(&self, symbol: &str) -> Result<Option<FillResult>> {
        let rules = self.symbol_rules(symbol).await?;
        let quote_balance = self.free_balance(&rules.quote_asset).await?;

        if quote_balance <= Decimal::ZERO {
            tracing::warn!("No {} balance available for buy", rules.quote_asset);
            return Ok(None);
        }

        let price = self.ticker_price(symbol).await?;
        let raw_qty = quote_balance
            .checked_div(price)
            .ok_or_else(|| BotError::Exchange(format!("Cannot size buy at price {}", price)))?;
        let quantity = sanitize_quantity(raw_qty, rules.step_size);

        if quantity <= Decimal::ZERO {
            tracing::warn!(
                "Insufficient balance: {} {}",
                quote_balance,
                rules.quote_asset
            );
            return Ok(None);
        }

        tracing::info!(
            "Buying {} {} with {} {} (100% of balance) @ {}",
            quantity,
            rules.base_asset,
            quote_balance,
            rules.quote_asset,
            price
        );

        self.place_market_order(symbol, OrderSide::Buy, quantity)
            .await
            .map(Some)
    }

    async fn market_sell_all_base(&self, symbol: &str) -> Result<Option<FillResult>> {
        let rules = self.symbol_rules(symbol).await?;
        let base_balance = self.free_balance(&rules.base_asset).await?;

        if base_balance <= Decimal::ZERO {
            tracing::warn!("No {} balance available for sell", rules.base_asset);
            return Ok(None);
        }

        let quantity = sanitize_quantity(base_balance, rules.step_size);
        if quantity <= Decimal::ZERO {
            tracing::warn!(
                "Insufficient balance: {} {} is below the lot step",
                base_balance,
                rules.base_asset
            );
            return Ok(None);
        }

        tracing::info!(
            "Selling {} {} of {} balance",
            quantity,
            rules.base_asset,
            base_balance
        );

        self.place_market_order(symbol, OrderSide::Sell, quantity)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn client(secret: &str) -> BinanceClient {
        BinanceClient::new(
            BinanceCredentials {
                api_key: "key".to_string(),
                api_secret: secret.to_string(),
            },
            BINANCE_API_BASE,
            RetryPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_sanitize_truncates_to_step() {
        assert_eq!(sanitize_quantity(dec("3.2009"), Some(dec("0.001"))), dec("3.2"));
        assert_eq!(sanitize_quantity(dec("4.99999"), Some(dec("0.01"))), dec("4.99"));
        assert_eq!(sanitize_quantity(dec("12.7"), Some(dec("1"))), dec("12"));
    }

    #[test]
    fn test_sanitize_never_rounds_up() {
        let qty = sanitize_quantity(dec("0.0019999"), Some(dec("0.001")));
        assert_eq!(qty, dec("0.001"));
        assert_eq!(sanitize_quantity(dec("0.0009"), Some(dec("0.001"))), Decimal::ZERO);
    }

    #[test]
    fn test_sanitize_fallback_precision() {
        assert_eq!(sanitize_quantity(dec("1.23456"), None), dec("1.234"));
        assert_eq!(sanitize_quantity(dec("-1"), None), Decimal::ZERO);
    }

    #[test]
    fn test_closed_window_drops_forming_candle() {
        let candles: Vec<Candle> = (0..4)
            .map(|i| Candle {
                open_time: i * 180_000,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
                close_time: i * 180_000 + 179_999,
            })
            .collect();

        // now is inside the last candle
        let window = closed_window(candles, 3 * 180_000 + 5_000, 2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].open_time, 180_000);
        assert_eq!(window[1].open_time, 360_000);
    }

    #[test]
    fn test_parse_kline() {
        let row: Vec<Value> = serde_json::from_str(
            r#"[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]"#,
        )
        .unwrap();
        let candle = parse_kline(&row).unwrap();

        assert_eq!(candle.open_time, 1499040000000);
        assert_eq!(candle.close_time, 1499644799999);
        assert!((candle.open - 0.0163479).abs() < 1e-12);
        assert!((candle.close - 0.015771).abs() < 1e-12);
    }

    #[test]
    fn test_parse_kline_rejects_short_rows() {
        let row: Vec<Value> = serde_json::from_str(r#"[1499040000000,"1.0"]"#).unwrap();
        assert!(parse_kline(&row).is_err());
    }

    #[test]
    fn test_signature_matches_reference_example() {
        let client = client("NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j");
        let payload = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(
            client.sign(payload).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_signed_query_layout() {
        let query = client("secret")
            .signed_query(&[("symbol", "SOLUSDC".to_string())])
            .unwrap();

        assert!(query.starts_with("symbol=SOLUSDC&recvWindow=5000&timestamp="));
        let signature = query.rsplit("&signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_classify_errors() {
        let err = classify_error(StatusCode::TOO_MANY_REQUESTS, "", false);
        assert!(matches!(err, BotError::RateLimited(_)));

        let body = r#"{"code":-1003,"msg":"Too many requests"}"#;
        let err = classify_error(StatusCode::BAD_REQUEST, body, false);
        assert!(matches!(err, BotError::RateLimited(_)));

        let body = r#"{"code":-1013,"msg":"Filter failure: NOTIONAL"}"#;
        let err = classify_error(StatusCode::BAD_REQUEST, body, true);
        assert!(matches!(err, BotError::OrderRejected { code: -1013, .. }));

        let err = classify_error(StatusCode::BAD_REQUEST, body, false);
        assert!(matches!(err, BotError::Exchange(_)));

        let err = classify_error(StatusCode::BAD_GATEWAY, "<html>", true);
        assert!(matches!(err, BotError::Exchange(_)));
    }
}
