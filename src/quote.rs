use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FetchError;

const DEFAULT_CURRENCY: &str = "PLN";
const REQUEST_TIMEOUT_SECS: u64 = 5;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// Latest known state of one symbol. Replaced wholesale on every fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Option<f64>,
    pub currency: String,
    pub company_name: String,
    pub fetched_at: DateTime<Local>,
    pub fetch_error: Option<String>,
}

impl Quote {
    pub fn failed(symbol: &str, reason: String) -> Self {
        Quote {
            symbol: symbol.to_string(),
            price: None,
            currency: DEFAULT_CURRENCY.to_string(),
            company_name: String::new(),
            fetched_at: Local::now(),
            fetch_error: Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.fetch_error.is_none() && self.price.is_some()
    }
}

/// Append the exchange suffix unless the symbol already carries it.
pub fn normalize_symbol(symbol: &str, suffix: &str) -> String {
    if suffix.is_empty() || symbol.ends_with(suffix) {
        symbol.to_string()
    } else {
        format!("{}{}", symbol, suffix)
    }
}

/// Strip the exchange suffix for display.
pub fn bare_symbol<'a>(symbol: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        symbol
    } else {
        symbol.strip_suffix(suffix).unwrap_or(symbol)
    }
}

pub type PriceStrategy = fn(&Value) -> Option<f64>;

/// Extraction strategies in priority order; the first usable value wins.
pub const PRICE_STRATEGIES: &[(&str, PriceStrategy)] = &[
    ("regular market price", regular_market_price),
    ("current price", current_price),
    ("last trade", last_trade),
    ("previous close", previous_close),
    ("chart previous close", chart_previous_close),
];

fn chart_result(raw: &Value) -> &Value {
    &raw["chart"]["result"][0]
}

fn meta(raw: &Value) -> &Value {
    &chart_result(raw)["meta"]
}

fn usable(value: &Value) -> Option<f64> {
    value.as_f64().filter(|p| p.is_finite() && *p > 0.0)
}

pub fn regular_market_price(raw: &Value) -> Option<f64> {
    usable(&meta(raw)["regularMarketPrice"])
}

pub fn current_price(raw: &Value) -> Option<f64> {
    usable(&meta(raw)["currentPrice"])
}

/// Last non-null close of the intraday series.
pub fn last_trade(raw: &Value) -> Option<f64> {
    chart_result(raw)["indicators"]["quote"][0]["close"]
        .as_array()?
        .iter()
        .rev()
        .find_map(usable)
}

pub fn previous_close(raw: &Value) -> Option<f64> {
    usable(&meta(raw)["previousClose"])
}

pub fn chart_previous_close(raw: &Value) -> Option<f64> {
    usable(&meta(raw)["chartPreviousClose"])
}

pub fn extract_price(raw: &Value) -> Option<(&'static str, f64)> {
    PRICE_STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(raw).map(|price| (*name, price)))
}

/// Descriptive fields of `chart.result[0].meta`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
}

/// Source of raw quote documents for provider-facing symbols.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_raw(&self, symbol: &str) -> Result<Value, FetchError>;
}

/// Yahoo Finance v8 chart endpoint.
pub struct YahooProvider {
    client: reqwest::Client,
}

impl YahooProvider {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(YahooProvider { client })
    }

    async fn fetch_from(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let data = response.json::<Value>().await?;

        let error = &data["chart"]["error"];
        if !error.is_null() {
            let description = error["description"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(FetchError::Provider(description));
        }
        Ok(data)
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    async fn fetch_raw(&self, symbol: &str) -> Result<Value, FetchError> {
        // v7 quote API is restricted by Yahoo, so use the chart API on both hosts
        let urls = [
            format!("https://query2.finance.yahoo.com/v8/finance/chart/{}", symbol),
            format!("https://query1.finance.yahoo.com/v8/finance/chart/{}", symbol),
        ];

        let mut last_error = FetchError::Transport("no endpoint tried".to_string());
        for url in &urls {
            match self.fetch_from(url).await {
                Ok(data) => return Ok(data),
                // The symbol itself is unknown; the other host will say the same.
                Err(err @ FetchError::Provider(_)) => return Err(err),
                Err(err) => {
                    debug!(%url, error = %err, "quote endpoint failed");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

/// Turns provider documents into normalized quotes. Cheap to clone.
#[derive(Clone)]
pub struct QuoteFetcher {
    provider: Arc<dyn QuoteProvider>,
    suffix: String,
}

impl QuoteFetcher {
    pub fn new(provider: Arc<dyn QuoteProvider>, suffix: &str) -> Self {
        QuoteFetcher {
            provider,
            suffix: suffix.to_string(),
        }
    }

    /// Fetch one symbol. Never fails: errors become a quote in error state.
    pub async fn fetch(&self, symbol: &str) -> Quote {
        let symbol = normalize_symbol(symbol, &self.suffix);

        let raw = match self.provider.fetch_raw(&symbol).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%symbol, error = %err, "quote fetch failed");
                return Quote::failed(&symbol, format!("fetch failed: {}", err));
            }
        };

        let Some((strategy, price)) = extract_price(&raw) else {
            warn!(%symbol, "quote has no usable price field");
            return Quote::failed(&symbol, "no price field".to_string());
        };
        debug!(%symbol, strategy, price, "quote fetched");

        let info = ChartMeta::deserialize(meta(&raw)).unwrap_or_default();
        let currency = info
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let company_name = info
            .long_name
            .or(info.short_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| bare_symbol(&symbol, &self.suffix).to_string());

        Quote {
            symbol,
            price: Some(price),
            currency,
            company_name,
            fetched_at: Local::now(),
            fetch_error: None,
        }
    }
}
