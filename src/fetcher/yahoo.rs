//! Yahoo Finance v8 chart API.

use super::PriceSource;
use super::http_client::HttpClient;
use crate::config::FetcherConfig;
use crate::models::PriceRecord;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

fn to_cents(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
        .map(|d| {
            let mut cents = d.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
            cents.rescale(2);
            cents
        })
        .filter(|d| *d > Decimal::ZERO)
}

pub struct YahooChartSource {
    client: HttpClient,
    base_url: String,
    ticker: String,
}

impl YahooChartSource {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ticker: config.ticker.clone(),
        })
    }

    fn chart_url(&self, start: NaiveDate, end: NaiveDate) -> Result<Url> {
        let period1 = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let period2 = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();

        Url::parse_with_params(
            &format!("{}/{}", self.base_url, self.ticker),
            &[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ],
        )
        .with_context(|| format!("Invalid chart URL base {:?}", self.base_url))
    }
}

/// Turn a chart payload into one record per UTC day. When a day appears
/// twice (intraday bar for today), the later bar wins.
fn parse_chart(ticker: &str, body: ChartResponse) -> Result<Vec<PriceRecord>> {
    let data = match (body.chart.result, body.chart.error) {
        (_, Some(err)) => bail!("{ticker}: {}: {}", err.code, err.description),
        (Some(result), None) => result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("{ticker}: empty result array"))?,
        (None, None) => bail!("{ticker}: response has neither result nor error"),
    };

    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{ticker}: no quote data"))?;
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let mut by_day = BTreeMap::new();
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| anyhow!("{ticker}: invalid timestamp {ts}"))?;

        // null close = no trade data for that bar
        let Some(price) = quote.close.get(i).copied().flatten().and_then(to_cents) else {
            debug!("{}: no close for {}, skipping", ticker, date);
            continue;
        };

        let adjusted_close = adj_closes
            .as_ref()
            .and_then(|v| v.get(i).copied().flatten())
            .and_then(to_cents);
        let bar = |series: &[Option<f64>]| series.get(i).copied().flatten().and_then(to_cents);

        by_day.insert(
            date,
            PriceRecord {
                date,
                open: bar(&quote.open),
                high: bar(&quote.high),
                low: bar(&quote.low),
                price,
                adjusted_close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
                filled: false,
            },
        );
    }

    Ok(by_day.into_values().collect())
}

#[async_trait]
impl PriceSource for YahooChartSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    async fn fetch_daily(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceRecord>> {
        let url = self.chart_url(start, end)?;
        info!("Fetching {} daily bars {} → {}", self.ticker, start, end);

        let body: ChartResponse = self.client.get_json(&url).await?;
        let records = parse_chart(&self.ticker, body)?;
        info!("{}: {} daily bars received", self.ticker, records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(json: &str) -> Result<Vec<PriceRecord>> {
        parse_chart("BTC-USD", serde_json::from_str(json).unwrap())
    }

    #[test]
    fn parses_bars_and_keeps_last_bar_per_day() {
        // 2024-03-01 00:00, 2024-03-02 00:00, 2024-03-02 13:37 UTC
        let json = r#"{"chart":{"result":[{
            "timestamp":[1709251200,1709337600,1709386620],
            "indicators":{
                "quote":[{"open":[1,2,3],"close":[61234.567,62000.004,62500.5],"volume":[100,null,300]}],
                "adjclose":[{"adjclose":[61234.567,62000.004,62500.5]}]
            }}],"error":null}}"#;
        let records = parse(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(records[0].price, dec!(61234.57));
        assert_eq!(records[0].volume, 100);
        assert_eq!(records[1].price, dec!(62500.50));
        assert_eq!(records[1].adjusted_close, Some(dec!(62500.50)));
        assert_eq!(records[0].open, Some(dec!(1.00)));
        assert_eq!(records[1].open, Some(dec!(3.00)));
        assert_eq!(records[1].high, None);
    }

    #[test]
    fn null_close_is_skipped() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1709251200],
            "indicators":{"quote":[{"close":[null],"volume":[null]}]}
            }],"error":null}}"#;
        assert!(parse(json).unwrap().is_empty());
    }

    #[test]
    fn api_error_is_surfaced() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse(json).unwrap_err().to_string();
        assert!(err.contains("Not Found"), "{err}");
    }

    #[test]
    fn chart_url_carries_period_bounds() {
        let source = YahooChartSource::new(&FetcherConfig::default()).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let url = source.chart_url(start, start).unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/BTC-USD");
        let query = url.query().unwrap();
        assert!(query.contains("period1=1709251200"), "{query}");
        assert!(query.contains("period2=1709337600"), "{query}");
        assert!(query.contains("interval=1d"), "{query}");
    }
}
