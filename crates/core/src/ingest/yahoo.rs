use crate::config::Settings;
use crate::domain::catalog;
use crate::domain::entity::{
    round2, EntityKind, EntityRecord, EntitySpec, METRIC_CHANGE_PERCENT, METRIC_MARKET_CAP,
    METRIC_PE_RATIO, METRIC_PRICE,
};
use crate::ingest::{build_http_client, EntityProvider};
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct YahooQuoteClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<Quote>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default, rename = "trailingPE")]
    pub trailing_pe: Option<f64>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub regular_market_change_percent: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

impl YahooQuoteClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            http: build_http_client(settings, "Yahoo Finance")?,
            base_url: settings.yahoo_quote_base_url.clone(),
        })
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[("symbols", symbol)])
            .send()
            .await
            .context("Yahoo Finance quote request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Yahoo Finance quote response")?;
        if !status.is_success() {
            anyhow::bail!("Yahoo Finance HTTP {status}: {text}");
        }

        let envelope = serde_json::from_str::<QuoteEnvelope>(&text)
            .context("failed to parse Yahoo Finance quote response")?;
        envelope
            .quote_response
            .result
            .into_iter()
            .find(|q| q.symbol.eq_ignore_ascii_case(symbol))
            .with_context(|| format!("no quote returned for {symbol}"))
    }
}

#[async_trait::async_trait]
impl EntityProvider for YahooQuoteClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch_entity(&self, entity: &EntitySpec) -> Result<EntityRecord> {
        let quote = self.fetch_quote(entity.identifier).await?;
        let mut record = quote_record(entity, &quote);
        record.as_of_date = Some(chrono::Utc::now().to_rfc3339());
        Ok(record)
    }

    fn default_record(&self, entity: &EntitySpec) -> EntityRecord {
        quote_record(entity, &Quote::default())
    }
}

/// Builds the record for one quote. Missing fields become 0; indices take their P/E from the
/// static table.
pub fn quote_record(entity: &EntitySpec, quote: &Quote) -> EntityRecord {
    let mut record = EntityRecord::from_spec(entity);

    let pe = match entity.kind {
        EntityKind::Index => catalog::index_pe(entity.identifier),
        _ => quote.trailing_pe,
    };

    let m = &mut record.metrics;
    m.set_or_zero(METRIC_PE_RATIO, pe.map(round2));
    m.set_or_zero(METRIC_PRICE, quote.regular_market_price.map(round2));
    m.set_or_zero(
        METRIC_CHANGE_PERCENT,
        quote.regular_market_change_percent.map(round2),
    );
    m.set_or_zero(METRIC_MARKET_CAP, quote.market_cap);
    record
}
